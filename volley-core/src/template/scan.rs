use super::TemplateSyntax;

/// A piece of a template as seen by a single left-to-right scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    Literal(&'a str),
    /// A balanced token. `raw` includes the delimiters, `inner` is trimmed.
    Token { raw: &'a str, inner: &'a str },
    /// An opening delimiter with no matching close before the next opening
    /// delimiter (or the end of input). Emitted literally.
    Unbalanced(&'a str),
}

impl TemplateSyntax {
    pub(crate) fn delimiters(self) -> (&'static str, &'static str) {
        match self {
            Self::Dollar => ("${", "}"),
            Self::Mustache => ("{{", "}}"),
        }
    }
}

/// Split `template` into literal text and tokens. Never fails.
pub(crate) fn scan(template: &str, syntax: TemplateSyntax) -> Vec<Segment<'_>> {
    let (open, close) = syntax.delimiters();
    let mut out = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find(open) {
        if start > 0 {
            out.push(Segment::Literal(&rest[..start]));
        }

        let after_open = &rest[start + open.len()..];
        let close_at = after_open.find(close);
        let next_open = after_open.find(open);

        match close_at {
            Some(end) if next_open.is_none_or(|n| end < n) => {
                let raw_len = open.len() + end + close.len();
                out.push(Segment::Token {
                    raw: &rest[start..start + raw_len],
                    inner: after_open[..end].trim(),
                });
                rest = &rest[start + raw_len..];
            }
            _ => {
                // Everything up to the next opening delimiter stays literal.
                let stop = next_open.map_or(rest.len(), |n| start + open.len() + n);
                out.push(Segment::Unbalanced(&rest[start..stop]));
                rest = &rest[stop..];
            }
        }
    }

    if !rest.is_empty() {
        out.push(Segment::Literal(rest));
    }
    out
}
