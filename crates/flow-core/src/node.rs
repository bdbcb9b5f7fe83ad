//! The node contract (spec §4.1, component C1).
//!
//! A node declares a fixed `NodeSpec` (inputs/outputs/parameters) and exposes
//! a pure `process`. Everything else — extracting inputs, applying defaults,
//! packaging the result back into named outputs — is handled once here so
//! concrete node implementations stay small.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{NodeError, Result};
use crate::handle::{HandleKind, HandleSpec};

/// A declared parameter slot with a default value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub description: String,
    pub default: Value,
}

/// A declared input slot. Carries the full [`HandleSpec`] so the loader can
/// enforce connection rules (`allow_incoming_edges`, …) without a second
/// lookup (spec §3 "Handle").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInput {
    pub name: String,
    pub handle: HandleSpec,
    pub description: String,
    pub default: Option<Value>,
    pub required: bool,
}

/// A declared output slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeOutput {
    pub name: String,
    pub handle: HandleKind,
    pub description: String,
}

/// The immutable specification of a node: what it's called, what it takes,
/// what it produces. Constructed once and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    pub description: String,
    pub inputs: Vec<NodeInput>,
    pub outputs: Vec<NodeOutput>,
    pub parameters: Vec<ParamSpec>,
    pub can_be_tool: bool,
    pub group: Option<String>,
    pub tags: Vec<String>,
}

impl NodeSpec {
    /// Builds a spec, rejecting duplicate names within any one of the three
    /// declared lists (spec §3 invariant).
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        inputs: Vec<NodeInput>,
        outputs: Vec<NodeOutput>,
        parameters: Vec<ParamSpec>,
    ) -> Result<Self> {
        Self::assert_unique("input", inputs.iter().map(|i| i.name.as_str()))?;
        Self::assert_unique("output", outputs.iter().map(|o| o.name.as_str()))?;
        Self::assert_unique("parameter", parameters.iter().map(|p| p.name.as_str()))?;

        Ok(Self {
            name: name.into(),
            description: description.into(),
            inputs,
            outputs,
            parameters,
            can_be_tool: false,
            group: None,
            tags: Vec::new(),
        })
    }

    pub fn with_can_be_tool(mut self, can_be_tool: bool) -> Self {
        self.can_be_tool = can_be_tool;
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    fn assert_unique<'a>(kind: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for name in names {
            if !seen.insert(name) {
                return Err(NodeError::Execution(format!(
                    "duplicate {kind} name '{name}' in node spec"
                )));
            }
        }
        Ok(())
    }

    pub fn input(&self, name: &str) -> Option<&NodeInput> {
        self.inputs.iter().find(|i| i.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&NodeOutput> {
        self.outputs.iter().find(|o| o.name == name)
    }
}

/// Per-run execution status of a node (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "PENDING",
            ExecutionStatus::Queued => "QUEUED",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Completed => "COMPLETED",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Skipped => "SKIPPED",
        };
        write!(f, "{s}")
    }
}

/// Mutable per-run state carried alongside a node's immutable spec.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeData {
    pub input_values: HashMap<String, Value>,
    pub parameters: HashMap<String, Value>,
    pub output_values: HashMap<String, Value>,
    #[serde(default = "default_status")]
    pub execution_status: ExecutionStatus,
}

fn default_status() -> ExecutionStatus {
    ExecutionStatus::Pending
}

impl NodeData {
    pub fn new() -> Self {
        Self {
            execution_status: ExecutionStatus::Pending,
            ..Default::default()
        }
    }
}

/// Descriptor returned by a tool-capable node so an agent node elsewhere can
/// compose it as a callable tool. The executor never calls `build_tool` or
/// `process_tool` itself (spec §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters_schema: Value,
}

/// The node contract (C1). Implementors provide `spec()` and `process()`;
/// extraction and output packaging are handled by the default `execute`.
pub trait Node: Send + Sync {
    fn spec(&self) -> &NodeSpec;

    /// Pure processing step: declared inputs/parameters in, a result out.
    /// For a single-output node the result may be any JSON value; for a
    /// multi-output node it must be a JSON object keyed by output name.
    fn process(&self, inputs: &HashMap<String, Value>, parameters: &HashMap<String, Value>) -> Result<Value>;

    /// Build a tool descriptor for this node. Only meaningful when
    /// `spec().can_be_tool` is true.
    fn build_tool(&self, _inputs: &HashMap<String, Value>, _config: &Value) -> Result<ToolDescriptor> {
        Err(NodeError::NotATool(self.spec().name.clone()))
    }

    /// Process this node when invoked as a tool by a sibling agent node.
    fn process_tool(
        &self,
        _inputs: &HashMap<String, Value>,
        _parameters: &HashMap<String, Value>,
        _tool_inputs: &Value,
    ) -> Result<Value> {
        Err(NodeError::NotATool(self.spec().name.clone()))
    }

    /// Extracts declared inputs from `data`, falling back to declared
    /// defaults, failing on a missing required input.
    fn extract_inputs(&self, data: &NodeData) -> Result<HashMap<String, Value>> {
        let mut out = HashMap::with_capacity(self.spec().inputs.len());
        for input in &self.spec().inputs {
            let value = data
                .input_values
                .get(&input.name)
                .cloned()
                .or_else(|| input.default.clone());

            match value {
                Some(v) => {
                    out.insert(input.name.clone(), v);
                }
                None if input.required => {
                    return Err(NodeError::MissingRequiredInput(input.name.clone()));
                }
                None => {}
            }
        }
        Ok(out)
    }

    /// Extracts declared parameters from `data`, falling back to declared
    /// defaults.
    fn extract_parameters(&self, data: &NodeData) -> HashMap<String, Value> {
        self.spec()
            .parameters
            .iter()
            .map(|p| {
                let value = data.parameters.get(&p.name).cloned().unwrap_or_else(|| p.default.clone());
                (p.name.clone(), value)
            })
            .collect()
    }

    /// Packages a `process` result into the declared output names.
    fn package_outputs(&self, result: Value) -> Result<HashMap<String, Value>> {
        let outputs = &self.spec().outputs;

        if outputs.len() == 1 {
            let name = outputs[0].name.clone();
            let value = match result {
                Value::Object(mut map) if map.contains_key(&name) => map.remove(&name).unwrap(),
                other => other,
            };
            return Ok(HashMap::from([(name, value)]));
        }

        let mut map = match result {
            Value::Object(map) => map,
            _ => {
                return Err(NodeError::OutputShapeMismatch {
                    missing: outputs.iter().map(|o| o.name.clone()).collect(),
                    unexpected: Vec::new(),
                })
            }
        };

        let declared: std::collections::HashSet<&str> = outputs.iter().map(|o| o.name.as_str()).collect();
        let actual: std::collections::HashSet<&str> = map.keys().map(|k| k.as_str()).collect();

        let missing: Vec<String> = declared.difference(&actual).map(|s| s.to_string()).collect();
        let unexpected: Vec<String> = actual.difference(&declared).map(|s| s.to_string()).collect();

        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(NodeError::OutputShapeMismatch { missing, unexpected });
        }

        Ok(outputs
            .iter()
            .map(|o| (o.name.clone(), map.remove(&o.name).expect("checked above")))
            .collect())
    }

    /// Runs the full input-extraction → process → output-packaging pipeline
    /// and writes the resulting outputs back onto `data`.
    fn execute(&self, data: &mut NodeData) -> Result<()> {
        let inputs = self.extract_inputs(data)?;
        let parameters = self.extract_parameters(data);
        let result = self.process(&inputs, &parameters)?;
        data.output_values = self.package_outputs(result)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo(NodeSpec);

    impl Node for Echo {
        fn spec(&self) -> &NodeSpec {
            &self.0
        }

        fn process(&self, inputs: &HashMap<String, Value>, _parameters: &HashMap<String, Value>) -> Result<Value> {
            Ok(inputs.get("text").cloned().unwrap_or(Value::Null))
        }
    }

    fn echo_spec() -> NodeSpec {
        NodeSpec::new(
            "echo",
            "passes its text input through",
            vec![NodeInput {
                name: "text".into(),
                handle: HandleSpec::new(HandleKind::Text),
                description: String::new(),
                default: None,
                required: true,
            }],
            vec![NodeOutput {
                name: "text".into(),
                handle: HandleKind::Text,
                description: String::new(),
            }],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn duplicate_input_names_rejected() {
        let dup = vec![
            NodeInput { name: "a".into(), handle: HandleSpec::new(HandleKind::Text), description: String::new(), default: None, required: false },
            NodeInput { name: "a".into(), handle: HandleSpec::new(HandleKind::Text), description: String::new(), default: None, required: false },
        ];
        assert!(NodeSpec::new("x", "x", dup, vec![], vec![]).is_err());
    }

    #[test]
    fn missing_required_input_fails() {
        let node = Echo(echo_spec());
        let mut data = NodeData::new();
        assert!(matches!(node.execute(&mut data), Err(NodeError::MissingRequiredInput(ref n)) if n == "text"));
    }

    #[test]
    fn single_output_wraps_bare_value() {
        let node = Echo(echo_spec());
        let mut data = NodeData::new();
        data.input_values.insert("text".into(), Value::String("hi".into()));
        node.execute(&mut data).unwrap();
        assert_eq!(data.output_values.get("text"), Some(&Value::String("hi".into())));
    }

    struct Splitter(NodeSpec);
    impl Node for Splitter {
        fn spec(&self) -> &NodeSpec {
            &self.0
        }
        fn process(&self, inputs: &HashMap<String, Value>, _parameters: &HashMap<String, Value>) -> Result<Value> {
            let text = inputs.get("text").and_then(|v| v.as_str()).unwrap_or_default();
            Ok(serde_json::json!({ "first": text.chars().next().map(|c| c.to_string()), "rest": &text[1.min(text.len())..] }))
        }
    }

    fn splitter_spec() -> NodeSpec {
        NodeSpec::new(
            "splitter",
            "splits text",
            vec![NodeInput { name: "text".into(), handle: HandleSpec::new(HandleKind::Text), description: String::new(), default: None, required: true }],
            vec![
                NodeOutput { name: "first".into(), handle: HandleKind::Text, description: String::new() },
                NodeOutput { name: "rest".into(), handle: HandleKind::Text, description: String::new() },
            ],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn multi_output_requires_exact_keys() {
        let node = Splitter(splitter_spec());
        let mut data = NodeData::new();
        data.input_values.insert("text".into(), Value::String("hi".into()));
        node.execute(&mut data).unwrap();
        assert_eq!(data.output_values.len(), 2);
    }

    #[test]
    fn multi_output_shape_mismatch_is_an_error() {
        struct Bad(NodeSpec);
        impl Node for Bad {
            fn spec(&self) -> &NodeSpec {
                &self.0
            }
            fn process(&self, _: &HashMap<String, Value>, _: &HashMap<String, Value>) -> Result<Value> {
                Ok(serde_json::json!({ "first": "a" }))
            }
        }
        let node = Bad(splitter_spec());
        let mut data = NodeData::new();
        data.input_values.insert("text".into(), Value::String("hi".into()));
        assert!(matches!(node.execute(&mut data), Err(NodeError::OutputShapeMismatch { .. })));
    }
}
