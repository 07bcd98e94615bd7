pub(crate) fn format_bytes(b: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * 1024 * 1024;

    if b >= GIB {
        return format!("{:.2}GiB", (b as f64) / (GIB as f64));
    }
    if b >= MIB {
        return format!("{:.2}MiB", (b as f64) / (MIB as f64));
    }
    if b >= KIB {
        return format!("{:.2}KiB", (b as f64) / (KIB as f64));
    }

    format!("{b}B")
}

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.1}")
    } else {
        "0".to_string()
    }
}

/// Milliseconds with a unit that keeps 3-4 significant digits.
pub(crate) fn format_ms(ms: f64) -> String {
    if !ms.is_finite() || ms <= 0.0 {
        return "0ms".to_string();
    }
    if ms < 1.0 {
        return format!("{:.0}us", ms * 1000.0);
    }
    if ms < 1000.0 {
        return format!("{ms:.2}ms");
    }
    format!("{:.2}s", ms / 1000.0)
}

pub(crate) fn format_percent(v: f64) -> String {
    format!("{v:.2}%")
}
