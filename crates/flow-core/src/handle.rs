//! Handle & adapter registry (spec §4.2, component C2).
//!
//! A [`HandleKind`] is the semantic type carried by a port. The
//! [`AdapterRegistry`] answers "can these two handles connect?" and, if they
//! can but their kinds differ, "what transforms the value in transit?".

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of semantic types a handle can carry (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleKind {
    Text,
    Number,
    Boolean,
    Dropdown,
    Secret,
    File,
    /// A handle whose concrete type is resolved at runtime.
    DynamicType,
    Table,
    KeyValue,
    /// JSON payload shaped for tool-call arguments/results.
    ToolableJson,
    LlmProvider,
    EmbeddingProvider,
    /// Carries a router node's routing decision (spec §4.6.4).
    RouterOutput,
    AgentTool,
}

/// Where the UI should source option values for a dropdown-like input.
/// The engine never invokes these; they're surfaced as-is for the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientResolver {
    Static { options: Vec<String> },
    Http { url: String },
    Conditional { depends_on: String, options_by_value: HashMap<String, Vec<String>> },
}

/// UI hints and connection rules for an input handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleSpec {
    pub kind: HandleKind,
    pub placeholder: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub options: Vec<String>,
    pub allow_incoming_edges: bool,
    pub allow_multiple_incoming_edges: bool,
    pub hide_input_field: bool,
    pub resolver: Option<ClientResolver>,
}

impl HandleSpec {
    pub fn new(kind: HandleKind) -> Self {
        Self {
            kind,
            placeholder: None,
            min: None,
            max: None,
            options: Vec::new(),
            allow_incoming_edges: true,
            allow_multiple_incoming_edges: false,
            hide_input_field: false,
            resolver: None,
        }
    }
}

type AdapterFn = fn(&Value) -> Value;

/// Converts a number value to its string representation (spec §4.2 minimum
/// required adapter).
fn number_to_text(value: &Value) -> Value {
    match value {
        Value::Number(n) => Value::String(n.to_string()),
        other => other.clone(),
    }
}

/// Registry of (source, target) handle-kind compatibility and adapters.
pub struct AdapterRegistry {
    adapters: HashMap<(HandleKind, HandleKind), AdapterFn>,
}

impl AdapterRegistry {
    /// Builds the registry with the baseline adapter set (spec §4.2).
    pub fn new() -> Self {
        let mut adapters: HashMap<(HandleKind, HandleKind), AdapterFn> = HashMap::new();
        adapters.insert((HandleKind::Number, HandleKind::Text), number_to_text);
        Self { adapters }
    }

    /// Registers an additional `(source, target)` adapter, implicitly making
    /// that pair connection-compatible.
    pub fn register(&mut self, source: HandleKind, target: HandleKind, adapter: AdapterFn) {
        self.adapters.insert((source, target), adapter);
    }

    /// Are these two handle kinds allowed to connect?
    pub fn compatible(&self, source: HandleKind, target: HandleKind) -> bool {
        source == target || self.adapters.contains_key(&(source, target))
    }

    /// Converts a value produced for `source` into one suitable for `target`.
    /// Passes the value through unchanged if no adapter is registered (the
    /// connection must then have been accepted because `source == target`).
    pub fn adapt(&self, source: HandleKind, target: HandleKind, value: &Value) -> Value {
        match self.adapters.get(&(source, target)) {
            Some(f) => f(value),
            None => value.clone(),
        }
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Strips a trailing `-index<N>` disambiguator from a handle name (spec
/// §3, §4.3; grounded in the original `split("-index")[0]` behavior).
pub fn strip_index_suffix(handle_name: &str) -> &str {
    match handle_name.find("-index") {
        Some(pos) => &handle_name[..pos],
        None => handle_name,
    }
}
