use std::cell::OnceCell;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use volley_value::{ObjectMap, Value};

/// What an executor saw come back, kept for assertions and extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseContent {
    pub status: Option<u16>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl ResponseContent {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Where in a response an assertion or extraction looks.
///
/// `status`, `header.<name>` and `body` address the envelope; anything else is
/// a JSON path into the body such as `data.items[0].id` (a leading `$.` is
/// accepted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePath {
    Status,
    Header(String),
    Body,
    Json(Vec<Segment>),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid response path `{path}`: {reason}")]
pub struct PathError {
    pub path: String,
    pub reason: &'static str,
}

impl FromStr for ResponsePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| PathError {
            path: s.to_string(),
            reason,
        };

        let trimmed = s.trim();
        match trimmed {
            "" => return Err(err("empty path")),
            "status" => return Ok(Self::Status),
            "body" => return Ok(Self::Body),
            _ => {}
        }

        if let Some(name) = trimmed.strip_prefix("header.") {
            if name.is_empty() {
                return Err(err("missing header name"));
            }
            return Ok(Self::Header(name.to_ascii_lowercase()));
        }

        let json = trimmed
            .strip_prefix("$.")
            .or_else(|| trimmed.strip_prefix('$'))
            .unwrap_or(trimmed);

        let mut segments = Vec::new();
        for part in json.split('.') {
            let (key, mut rest) = match part.find('[') {
                Some(i) => (&part[..i], &part[i..]),
                None => (part, ""),
            };
            if !key.is_empty() {
                segments.push(Segment::Key(key.to_string()));
            } else if rest.is_empty() {
                return Err(err("empty segment"));
            }
            while !rest.is_empty() {
                let close = rest.find(']').ok_or_else(|| err("unclosed `[`"))?;
                let idx = rest
                    .get(1..close)
                    .and_then(|n| n.trim().parse::<usize>().ok())
                    .ok_or_else(|| err("index must be a non-negative integer"))?;
                segments.push(Segment::Index(idx));
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return Err(err("unexpected text after `]`"));
                }
            }
        }

        if segments.is_empty() {
            return Err(err("empty path"));
        }
        Ok(Self::Json(segments))
    }
}

impl fmt::Display for ResponsePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status => f.write_str("status"),
            Self::Header(name) => write!(f, "header.{name}"),
            Self::Body => f.write_str("body"),
            Self::Json(segments) => {
                for (i, seg) in segments.iter().enumerate() {
                    match seg {
                        Segment::Key(k) if i == 0 => f.write_str(k)?,
                        Segment::Key(k) => write!(f, ".{k}")?,
                        Segment::Index(n) => write!(f, "[{n}]")?,
                    }
                }
                Ok(())
            }
        }
    }
}

/// A value found at a path.
#[derive(Debug, Clone, PartialEq)]
pub enum Found<'a> {
    Text(std::borrow::Cow<'a, str>),
    Json(&'a serde_json::Value),
}

impl Found<'_> {
    /// Scalars render bare (`"abc"` → `abc`); objects and arrays as compact JSON.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(s) => s.to_string(),
            Self::Json(serde_json::Value::String(s)) => s.clone(),
            Self::Json(v) => v.to_string(),
        }
    }

    /// Structured JSON becomes a map so dotted template lookups can reach into
    /// it; arrays are keyed by index.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Text(s) => Value::from(s.to_string()),
            Self::Json(v) => json_to_value(v),
        }
    }
}

pub fn json_to_value(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Object(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (Arc::<str>::from(k.as_str()), json_to_value(v)))
                .collect::<ObjectMap>(),
        ),
        serde_json::Value::Array(items) => Value::Map(
            items
                .iter()
                .enumerate()
                .map(|(i, v)| (Arc::<str>::from(i.to_string()), json_to_value(v)))
                .collect::<ObjectMap>(),
        ),
        serde_json::Value::String(s) => Value::from(s.as_str()),
        other => Value::from(other.to_string()),
    }
}

/// Lazily parses the body as JSON the first time a JSON path asks for it.
#[derive(Debug)]
pub struct Inspector<'a> {
    content: &'a ResponseContent,
    json: OnceCell<Option<serde_json::Value>>,
}

impl<'a> Inspector<'a> {
    pub fn new(content: &'a ResponseContent) -> Self {
        Self {
            content,
            json: OnceCell::new(),
        }
    }

    pub fn content(&self) -> &'a ResponseContent {
        self.content
    }

    pub fn json(&self) -> Option<&serde_json::Value> {
        self.json
            .get_or_init(|| serde_json::from_slice(&self.content.body).ok())
            .as_ref()
    }

    pub fn find(&self, path: &ResponsePath) -> Option<Found<'_>> {
        match path {
            ResponsePath::Status => self
                .content
                .status
                .map(|s| Found::Text(s.to_string().into())),
            ResponsePath::Header(name) => self
                .content
                .header(name)
                .map(|v| Found::Text(v.into())),
            ResponsePath::Body => Some(Found::Text(self.content.body_text())),
            ResponsePath::Json(segments) => {
                let mut cur = self.json()?;
                for seg in segments {
                    cur = match seg {
                        Segment::Key(k) => cur.get(k.as_str())?,
                        Segment::Index(i) => cur.get(*i)?,
                    };
                }
                Some(Found::Json(cur))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn json_response(body: &str) -> ResponseContent {
        ResponseContent {
            status: Some(200),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Bytes::from(body.to_string()),
        }
    }

    #[test]
    fn parses_envelope_and_json_paths() {
        assert_eq!("status".parse::<ResponsePath>().unwrap(), ResponsePath::Status);
        assert_eq!(
            "header.Content-Type".parse::<ResponsePath>().unwrap(),
            ResponsePath::Header("content-type".to_string())
        );
        assert_eq!(
            "$.data.items[0].id".parse::<ResponsePath>().unwrap(),
            ResponsePath::Json(vec![
                Segment::Key("data".to_string()),
                Segment::Key("items".to_string()),
                Segment::Index(0),
                Segment::Key("id".to_string()),
            ])
        );
        assert_eq!(
            "[1][2]".parse::<ResponsePath>().unwrap(),
            ResponsePath::Json(vec![Segment::Index(1), Segment::Index(2)])
        );
        assert_eq!(
            "$.data.items[0].id".parse::<ResponsePath>().unwrap().to_string(),
            "data.items[0].id"
        );
    }

    #[test]
    fn rejects_malformed_paths() {
        for bad in ["", "a..b", "items[x]", "items[0", "items[0]x", "header.", "$"] {
            assert!(bad.parse::<ResponsePath>().is_err(), "accepted `{bad}`");
        }
    }

    #[test]
    fn finds_values_in_json_bodies() {
        let content = json_response(r#"{"token":"abc","user":{"id":7,"roles":["a","b"]}}"#);
        let inspect = Inspector::new(&content);

        let find = |p: &str| inspect.find(&p.parse().unwrap()).map(|f| f.to_text());
        assert_eq!(find("token").as_deref(), Some("abc"));
        assert_eq!(find("user.id").as_deref(), Some("7"));
        assert_eq!(find("user.roles[1]").as_deref(), Some("b"));
        assert_eq!(find("user.roles").as_deref(), Some(r#"["a","b"]"#));
        assert_eq!(find("status").as_deref(), Some("200"));
        assert_eq!(find("header.content-type").as_deref(), Some("application/json"));
        assert_eq!(find("user.missing"), None);
    }

    #[test]
    fn structured_values_become_maps() {
        let content = json_response(r#"{"user":{"id":7,"tags":["x"]}}"#);
        let inspect = Inspector::new(&content);
        let value = inspect
            .find(&"user".parse().unwrap())
            .unwrap()
            .to_value();
        assert_eq!(
            value.navigate(["id"]).and_then(Value::as_text),
            Some("7")
        );
        assert_eq!(
            value.navigate(["tags", "0"]).and_then(Value::as_text),
            Some("x")
        );
    }

    #[test]
    fn json_paths_on_non_json_bodies_find_nothing() {
        let content = ResponseContent {
            status: Some(200),
            headers: Vec::new(),
            body: Bytes::from_static(b"<xml/>"),
        };
        let inspect = Inspector::new(&content);
        assert!(inspect.find(&"a.b".parse().unwrap()).is_none());
        assert_eq!(
            inspect.find(&ResponsePath::Body).map(|f| f.to_text()).as_deref(),
            Some("<xml/>")
        );
    }
}
