use thiserror::Error;

/// Errors raised while extracting inputs/parameters or packaging outputs for a
/// single node invocation (spec §4.1, §7).
#[derive(Debug, Error)]
pub enum NodeError {
    /// A declared input is `required` and has no value and no default.
    #[error("missing required input '{0}'")]
    MissingRequiredInput(String),

    /// `process` returned a mapping whose keys don't exactly match the
    /// declared output names.
    #[error("output shape mismatch: missing {missing:?}, unexpected {unexpected:?}")]
    OutputShapeMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    /// `process` itself failed (the node's own logic raised an error).
    #[error("node execution error: {0}")]
    Execution(String),

    /// `build_tool`/`process_tool` called on a node that isn't `can_be_tool`.
    #[error("node '{0}' is not a tool")]
    NotATool(String),
}

pub type Result<T> = std::result::Result<T, NodeError>;
