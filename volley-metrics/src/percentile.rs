use hdrhistogram::Histogram;

/// How elapsed-time samples are kept for percentile queries.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum PercentileMode {
    /// Keep every sample. Exact nearest-rank percentiles, memory grows with the run.
    #[default]
    Exact,
    /// HDR histogram with 3 significant digits. Bounded memory, approximate values.
    Histogram,
}

/// Percentile storage over microsecond samples.
#[derive(Debug, Clone)]
pub enum Percentiles {
    Exact(ExactSamples),
    Histogram(Box<Histogram<u64>>),
}

impl Percentiles {
    #[must_use]
    pub fn new(mode: PercentileMode) -> Self {
        match mode {
            PercentileMode::Exact => Self::Exact(ExactSamples::default()),
            PercentileMode::Histogram => Self::Histogram(Box::new(new_histogram())),
        }
    }

    pub fn record(&mut self, value_us: u64) {
        match self {
            Self::Exact(s) => s.record(value_us),
            Self::Histogram(h) => {
                // Values beyond the upper bound are clamped rather than dropped.
                h.saturating_record(value_us.max(1));
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        match self {
            Self::Exact(s) => s.values.len() as u64,
            Self::Histogram(h) => h.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Percentile `p` in `[0, 100]`. Zero when nothing was recorded.
    pub fn percentile(&mut self, p: f64) -> u64 {
        match self {
            Self::Exact(s) => s.percentile(p),
            Self::Histogram(h) => {
                if h.len() == 0 {
                    return 0;
                }
                h.value_at_quantile((p / 100.0).clamp(0.0, 1.0))
            }
        }
    }
}

fn new_histogram() -> Histogram<u64> {
    // Up to 1 hour in microseconds.
    match Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

/// Every recorded sample, sorted lazily on read.
#[derive(Debug, Clone, Default)]
pub struct ExactSamples {
    values: Vec<u64>,
    sorted: bool,
}

impl ExactSamples {
    pub fn record(&mut self, value: u64) {
        if self.sorted && self.values.last().is_some_and(|last| *last > value) {
            self.sorted = false;
        }
        if self.values.is_empty() {
            self.sorted = true;
        }
        self.values.push(value);
    }

    /// Nearest-rank percentile: index `ceil(p/100 * n) - 1`, clamped to `[0, n-1]`.
    pub fn percentile(&mut self, p: f64) -> u64 {
        let n = self.values.len();
        if n == 0 {
            return 0;
        }
        if !self.sorted {
            self.values.sort_unstable();
            self.sorted = true;
        }

        let idx = nearest_rank_index(p, n);
        self.values[idx]
    }
}

pub(crate) fn nearest_rank_index(p: f64, n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let p = if p.is_finite() { p.clamp(0.0, 100.0) } else { 100.0 };
    // `p * n / 100` rather than `p / 100 * n` keeps whole-number ranks exact.
    let rank = (p * n as f64 / 100.0).ceil() as usize;
    rank.saturating_sub(1).min(n - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_rank_matches_formula() {
        assert_eq!(nearest_rank_index(90.0, 5), 4);
        assert_eq!(nearest_rank_index(50.0, 5), 2);
        assert_eq!(nearest_rank_index(95.0, 20), 18);
        assert_eq!(nearest_rank_index(0.0, 5), 0);
        assert_eq!(nearest_rank_index(100.0, 5), 4);
        assert_eq!(nearest_rank_index(1.0, 1), 0);
    }

    #[test]
    fn exact_percentiles_sort_out_of_order_samples() {
        let mut p = Percentiles::new(PercentileMode::Exact);
        for v in [50, 10, 40, 20, 30] {
            p.record(v);
        }
        assert_eq!(p.percentile(90.0), 50);
        assert_eq!(p.percentile(50.0), 30);
        assert_eq!(p.percentile(0.0), 10);
        assert_eq!(p.len(), 5);
    }

    #[test]
    fn empty_store_yields_zero() {
        let mut exact = Percentiles::new(PercentileMode::Exact);
        let mut hist = Percentiles::new(PercentileMode::Histogram);
        assert!(exact.is_empty());
        assert_eq!(exact.percentile(95.0), 0);
        assert_eq!(hist.percentile(95.0), 0);
    }

    #[test]
    fn histogram_percentiles_are_close_and_monotonic() {
        let mut p = Percentiles::new(PercentileMode::Histogram);
        for v in 1..=1000u64 {
            p.record(v * 1000);
        }
        let p50 = p.percentile(50.0);
        let p90 = p.percentile(90.0);
        let p99 = p.percentile(99.0);
        assert!(p50 <= p90 && p90 <= p99);
        assert!((p90 as f64 - 900_000.0).abs() / 900_000.0 < 0.01);
    }

    #[test]
    fn mode_parses_from_config_strings() {
        assert_eq!("exact".parse::<PercentileMode>().ok(), Some(PercentileMode::Exact));
        assert_eq!(
            "Histogram".parse::<PercentileMode>().ok(),
            Some(PercentileMode::Histogram)
        );
        assert!("median".parse::<PercentileMode>().is_err());
    }
}
