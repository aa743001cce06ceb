// SPDX-License-Identifier: MIT

//! Typed error handling for packflow
//!
//! Every failure the store, the engine or a collaborator can report has its
//! own variant, so callers can match on what went wrong instead of parsing
//! messages.

use thiserror::Error;

use crate::flow::node::Phase;
use crate::pack::namespace::Operation;

/// Top-level error type for packflow
#[derive(Debug, Error)]
pub enum PackflowError {
    /// Flow construction or execution errors
    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),

    /// State store errors
    #[error("Pack error: {0}")]
    Pack(#[from] PackError),

    /// Configuration errors (invalid env vars, invalid config file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl PackflowError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Errors raised by the versioned state store
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PackError {
    /// No pattern of the caller's access set covers the namespace
    #[error("{operation} access denied for namespace '{namespace}'")]
    AccessDenied {
        operation: Operation,
        namespace: String,
    },

    /// A required read found nothing live for the key
    #[error("Missing required key '{key}' in namespace '{namespace}'")]
    MissingRequiredKey { key: String, namespace: String },

    /// Keys must be non-empty and free of whitespace
    #[error("Invalid key: '{0}'")]
    InvalidKey(String),

    /// Namespace with an empty or wildcard segment
    #[error("Invalid namespace: '{0}'")]
    InvalidNamespace(String),

    /// Namespace pattern that cannot be parsed
    #[error("Invalid namespace pattern: '{0}'")]
    InvalidPattern(String),

    /// Snapshot requested past the end of the log
    #[error("Sequence {requested} is past the latest commit ({latest})")]
    SequenceOutOfRange { requested: u64, latest: u64 },

    /// A commit log handed to `restore` breaks ordering invariants
    #[error("Corrupt commit log: {0}")]
    CorruptLog(String),
}

/// A value did not satisfy a data contract
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Contract '{contract}' violated{}: {message}", .key.as_ref().map(|k| format!(" by key '{}'", k)).unwrap_or_default())]
pub struct ValidationError {
    pub contract: String,
    pub key: Option<String>,
    pub message: String,
}

impl ValidationError {
    pub fn new(contract: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            key: None,
            message: message.into(),
        }
    }

    /// Attach the store key whose payload failed validation
    pub fn for_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// Errors surfaced by a credential resolver
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// The reference points to nothing
    #[error("Credential '{0}' not found")]
    NotFound(String),

    /// The resolved value does not have the expected type
    #[error("Credential '{reference}' is not a {expected}")]
    TypeMismatch { reference: String, expected: String },

    /// The resolver does not understand the reference scheme
    #[error("Unsupported credential reference: '{0}'")]
    UnsupportedScheme(String),

    /// No resolver was configured for the flow
    #[error("No credential resolver configured")]
    NoResolver,
}

/// Errors a node phase can fail with
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Pack(#[from] PackError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// A nested flow owned by the node failed
    #[error("Nested flow failed: {0}")]
    Flow(#[from] Box<FlowError>),

    /// Generic failure raised by node logic
    #[error("{0}")]
    Other(String),
}

impl NodeError {
    /// Create from a generic message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<&str> for NodeError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for NodeError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

impl From<FlowError> for NodeError {
    fn from(err: FlowError) -> Self {
        Self::Flow(Box::new(err))
    }
}

/// Engine-level errors
#[derive(Debug, Error)]
pub enum FlowError {
    /// Two nodes in one flow share an id
    #[error("Duplicate node id '{0}'")]
    DuplicateNode(String),

    /// An edge or entry refers to a node the flow does not own
    #[error("Unknown node '{0}'")]
    UnknownNode(String),

    /// Routing cannot be resolved (no entry, dangling target)
    #[error("Routing error: {0}")]
    Routing(String),

    /// The registry has no factory for a node kind
    #[error("Unknown node kind '{0}'")]
    UnknownNodeKind(String),

    /// A node failed and no "error" edge handled it
    #[error("Node '{node_id}' in '{namespace}' failed during {phase}: {source}")]
    Node {
        namespace: String,
        node_id: String,
        phase: Phase,
        #[source]
        source: NodeError,
    },

    /// The routing loop ran past the configured limit
    #[error("Max steps reached: {0}")]
    StepLimitExceeded(usize),

    /// A graph description could not be turned into a flow
    #[error("Invalid graph description: {0}")]
    Description(String),

    #[error(transparent)]
    Pack(#[from] PackError),
}

impl FlowError {
    /// The node-level error at the root of a (possibly nested) failure
    pub fn root_node_error(&self) -> Option<&NodeError> {
        match self {
            FlowError::Node { source, .. } => match source {
                NodeError::Flow(inner) => inner.root_node_error().or(Some(source)),
                other => Some(other),
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("Greeting", "expected string").for_key("greeting");
        assert_eq!(
            err.to_string(),
            "Contract 'Greeting' violated by key 'greeting': expected string"
        );

        let err = ValidationError::new("Greeting", "expected string");
        assert_eq!(err.to_string(), "Contract 'Greeting' violated: expected string");
    }

    #[test]
    fn test_node_error_annotation() {
        let err = FlowError::Node {
            namespace: "demo.greet".to_string(),
            node_id: "greet".to_string(),
            phase: Phase::Prepare,
            source: NodeError::Pack(PackError::MissingRequiredKey {
                key: "name".to_string(),
                namespace: "demo".to_string(),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("demo.greet"));
        assert!(msg.contains("prepare"));
        assert!(msg.contains("Missing required key 'name'"));
    }

    #[test]
    fn test_root_node_error_unwraps_nesting() {
        let inner = FlowError::Node {
            namespace: "root.outer.inner".to_string(),
            node_id: "inner".to_string(),
            phase: Phase::Compute,
            source: NodeError::other("boom"),
        };
        let outer = FlowError::Node {
            namespace: "root.outer".to_string(),
            node_id: "outer".to_string(),
            phase: Phase::Compute,
            source: NodeError::from(inner),
        };

        match outer.root_node_error() {
            Some(NodeError::Other(msg)) => assert_eq!(msg, "boom"),
            other => panic!("unexpected root error: {:?}", other),
        }
    }

    #[test]
    fn test_string_conversions() {
        let err: NodeError = "failed".into();
        assert!(matches!(err, NodeError::Other(ref s) if s == "failed"));
        let err: NodeError = String::from("failed again").into();
        assert_eq!(err.to_string(), "failed again");
    }
}
