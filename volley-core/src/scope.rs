use std::sync::Arc;

use smallvec::SmallVec;
use volley_value::{ObjectMap, Value};

/// One layer of named variables.
pub type Variables = ObjectMap;

/// Build a variables layer from string pairs.
pub fn variables<I, K, V>(pairs: I) -> Variables
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<Arc<str>>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Immutable stack of variable layers, lowest priority first.
///
/// Layers are shared behind `Arc` so every worker of a scenario reads the same
/// global and scenario variables without copying them.
#[derive(Debug, Clone, Default)]
pub struct VariableScope {
    layers: Vec<Arc<Variables>>,
}

impl VariableScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a layer that overrides everything below it.
    #[must_use]
    pub fn with_layer(mut self, layer: Arc<Variables>) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.layers.iter().rev().find_map(|l| l.get(name))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Borrowed view that more layers can be stacked onto for a single call.
    pub fn view(&self) -> ScopeView<'_> {
        ScopeView {
            layers: self.layers.iter().map(|l| &**l).collect(),
        }
    }
}

/// Borrowed, read-only stack of layers used for one resolution or dispatch.
#[derive(Debug, Clone, Default)]
pub struct ScopeView<'a> {
    layers: SmallVec<[&'a Variables; 8]>,
}

impl<'a> ScopeView<'a> {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, layer: &'a Variables) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn push(&mut self, layer: &'a Variables) {
        self.layers.push(layer);
    }

    /// Highest layer wins.
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.layers.iter().rev().find_map(|&l| l.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }
}

/// Variables captured while one worker runs one pass over a scenario's
/// requests, such as a token extracted from a login response.
///
/// This is the only mutable scope in the pipeline. It belongs to a single
/// worker's current pass: it is created empty when the pass starts, written
/// only between two requests of that pass and dropped when the pass ends, so
/// nothing captured leaks to another worker, another pass or another scenario.
#[derive(Debug, Default)]
pub struct PassScope {
    captured: Variables,
}

impl PassScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<Arc<str>>, value: Value) {
        self.captured.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.captured.get(name)
    }

    pub fn captured(&self) -> &Variables {
        &self.captured
    }

    pub fn is_empty(&self) -> bool {
        self.captured.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_layers_override_earlier_ones() {
        let global = Arc::new(variables([("host", "global"), ("only_global", "g")]));
        let scenario = Arc::new(variables([("host", "scenario")]));
        let scope = VariableScope::new().with_layer(global).with_layer(scenario);

        assert_eq!(scope.get("host").and_then(Value::as_text), Some("scenario"));
        assert_eq!(scope.get("only_global").and_then(Value::as_text), Some("g"));
        assert!(scope.get("missing").is_none());
    }

    #[test]
    fn view_stacks_call_local_layers_on_top() {
        let base = VariableScope::new().with_layer(Arc::new(variables([("token", "old")])));
        let mut pass = PassScope::new();
        pass.set("token", Value::from("fresh"));
        let request = variables([("extra", "1")]);

        let view = base.view().with(pass.captured()).with(&request);
        assert_eq!(view.depth(), 3);
        assert_eq!(view.get("token").and_then(Value::as_text), Some("fresh"));
        assert!(view.contains("extra"));

        // The shared scope never sees pass-local writes.
        assert_eq!(base.get("token").and_then(Value::as_text), Some("old"));
    }

    #[test]
    fn empty_view_finds_nothing() {
        assert!(ScopeView::empty().get("anything").is_none());
        assert!(PassScope::new().is_empty());
    }
}
