use std::sync::Arc;

use crate::response::{Found, Inspector, PathError, ResponsePath};
use volley_value::Value;

/// Expected values that only require the path to be present.
const EXISTS_MARKERS: [&str; 2] = ["exists", "*"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expected {
    Exists,
    /// Compared after template resolution. For `body` this is a substring test.
    Equals(String),
}

impl Expected {
    pub fn parse(s: &str) -> Self {
        if EXISTS_MARKERS.contains(&s.trim()) {
            Self::Exists
        } else {
            Self::Equals(s.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    pub path: ResponsePath,
    pub expected: Expected,
}

impl Assertion {
    pub fn parse(path: &str, expected: &str) -> Result<Self, PathError> {
        Ok(Self {
            path: path.parse()?,
            expected: Expected::parse(expected),
        })
    }

    /// Check the response. `expected` is the already-resolved comparison value
    /// for `Expected::Equals`. Returns a message describing the mismatch.
    pub fn evaluate(&self, inspect: &Inspector<'_>, expected: Option<&str>) -> Result<(), String> {
        let found = inspect.find(&self.path);

        let Some(want) = expected.filter(|_| matches!(self.expected, Expected::Equals(_))) else {
            return match found {
                Some(_) => Ok(()),
                None => Err(format!("assertion failed: `{}` does not exist", self.path)),
            };
        };

        let Some(found) = found else {
            return Err(format!(
                "assertion failed: `{}` does not exist (expected `{want}`)",
                self.path
            ));
        };

        let ok = match (&self.path, &found) {
            (ResponsePath::Body, Found::Text(body)) => body.contains(want),
            _ => found.to_text() == want,
        };
        if ok {
            return Ok(());
        }

        let mut got = found.to_text();
        if got.len() > 120 {
            let cut = (0..=120).rev().find(|&i| got.is_char_boundary(i)).unwrap_or(0);
            got.truncate(cut);
            got.push('…');
        }
        Err(format!(
            "assertion failed: `{}` expected `{want}`, got `{got}`",
            self.path
        ))
    }
}

/// Capture a response value into the current pass's scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub variable: Arc<str>,
    pub path: ResponsePath,
}

impl Extraction {
    pub fn parse(variable: &str, path: &str) -> Result<Self, PathError> {
        Ok(Self {
            variable: Arc::from(variable),
            path: path.parse()?,
        })
    }

    pub fn extract(&self, inspect: &Inspector<'_>) -> Option<Value> {
        inspect.find(&self.path).map(|found| found.to_value())
    }
}
