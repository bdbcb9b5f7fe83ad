//! Explicit node registry (spec §9 "Registry singletons / global node
//! registry"): a value constructed once at process start and passed to the
//! loader by reference. No hidden global state.

use std::collections::HashMap;

use flow_core::Node;

pub type Factory = Box<dyn Fn() -> Box<dyn Node> + Send + Sync>;

/// Maps a node `type_name` to a factory that constructs a fresh instance.
/// The concrete node library lives outside this crate (spec §1); this
/// registry only needs the `Node` trait object.
#[derive(Default)]
pub struct NodeRegistry {
    factories: HashMap<String, Factory>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, type_name: impl Into<String>, factory: Factory) {
        self.factories.insert(type_name.into(), factory);
    }

    pub fn create(&self, type_name: &str) -> Option<Box<dyn Node>> {
        self.factories.get(type_name).map(|f| f())
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_core::{NodeData, NodeSpec};
    use std::collections::HashMap as Map;
    use serde_json::Value;

    struct Noop(NodeSpec);
    impl Node for Noop {
        fn spec(&self) -> &NodeSpec {
            &self.0
        }
        fn process(&self, _: &Map<String, Value>, _: &Map<String, Value>) -> flow_core::Result<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn unregistered_type_returns_none() {
        let registry = NodeRegistry::new();
        assert!(registry.create("nope").is_none());
    }

    #[test]
    fn registered_type_constructs_a_fresh_node() {
        let mut registry = NodeRegistry::new();
        registry.register(
            "noop",
            Box::new(|| Box::new(Noop(NodeSpec::new("noop", "", vec![], vec![], vec![]).unwrap()))),
        );
        assert!(registry.contains("noop"));
        let node = registry.create("noop").unwrap();
        let mut data = NodeData::new();
        node.execute(&mut data).unwrap();
    }
}
