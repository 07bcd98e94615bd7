use std::fmt;
use std::sync::Arc;

pub type ObjectMap = ahash::AHashMap<Arc<str>, Value>;

/// A variable value as seen by templates.
///
/// Scalars are kept as text; anything structured is a map that dotted lookups
/// (`user.id`) can walk into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(Arc<str>),
    Map(ObjectMap),
}

impl Value {
    #[must_use]
    pub fn text(s: impl Into<Arc<str>>) -> Self {
        Self::Text(s.into())
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Map(_) => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&ObjectMap> {
        match self {
            Self::Map(m) => Some(m),
            Self::Text(_) => None,
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Walk nested maps one segment at a time.
    pub fn navigate<'a, I>(&self, segments: I) -> Option<&Value>
    where
        I: IntoIterator<Item = &'a str>,
    {
        segments
            .into_iter()
            .try_fold(self, |cur, segment| cur.get(segment))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(Arc::from(value))
    }
}

impl From<ObjectMap> for Value {
    fn from(value: ObjectMap) -> Self {
        Self::Map(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Map(m) => {
                let mut keys: Vec<&Arc<str>> = m.keys().collect();
                keys.sort_unstable();
                f.write_str("{")?;
                for (idx, k) in keys.into_iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: ")?;
                    if let Some(v) = m.get(k) {
                        write!(f, "{v}")?;
                    }
                }
                f.write_str("}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Value {
        let mut inner = ObjectMap::new();
        inner.insert(Arc::from("id"), Value::from("42"));
        let mut outer = ObjectMap::new();
        outer.insert(Arc::from("user"), Value::Map(inner));
        Value::Map(outer)
    }

    #[test]
    fn navigate_walks_nested_maps() {
        let v = user();
        assert_eq!(
            v.navigate(["user", "id"]).and_then(Value::as_text),
            Some("42")
        );
        assert!(v.navigate(["user", "name"]).is_none());
        assert!(v.navigate(["user", "id", "deeper"]).is_none());
    }

    #[test]
    fn display_sorts_map_keys() {
        let mut m = ObjectMap::new();
        m.insert(Arc::from("b"), Value::from("2"));
        m.insert(Arc::from("a"), Value::from("1"));
        assert_eq!(Value::Map(m).to_string(), "{a: 1, b: 2}");
    }
}
