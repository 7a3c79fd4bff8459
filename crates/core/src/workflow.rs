//! ComfyUI workflow templates: classification and prompt injection.
//!
//! Template files come in two shapes. The design-tool export carries a
//! top-level `nodes` array describing the visual graph and cannot be
//! executed. The executable ("API prompt") export is an object keyed by
//! node id where each value has a `class_type` and an `inputs` map:
//!
//! ```json
//! {
//!   "6": {
//!     "class_type": "CLIPTextEncode",
//!     "inputs": { "text": "a beautiful landscape", "clip": ["1", 1] }
//!   }
//! }
//! ```
//!
//! [`WorkflowTemplate::classify`] turns raw JSON into one of the two
//! variants up front so nothing downstream has to probe the structure.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

/// Case-insensitive marker for text-encoding nodes that receive the prompt.
const TEXT_ENCODE_MARKER: &str = "cliptextencode";

/// Input field overwritten on text-encoding nodes.
const TEXT_INPUT: &str = "text";

/// Top-level key that marks a design-tool document.
const DESIGN_NODES_KEY: &str = "nodes";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures while locating, reading, or classifying a workflow template.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Neither a name nor a path was supplied. This is a caller error.
    #[error("A workflow name or path is required")]
    MissingReference,

    /// No candidate location exists on disk.
    #[error("Workflow template not found: {reference}")]
    NotFound {
        reference: String,
        candidates: Vec<PathBuf>,
    },

    #[error("Failed to read workflow template {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Workflow template {} is not valid JSON: {source}", .path.display())]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Valid JSON, but a design-tool export rather than an executable prompt.
    #[error(
        "Workflow template is a design-tool export; export it in API prompt format \
         (nodes with class_type/inputs) before submitting"
    )]
    DesignDocument,

    /// Valid JSON that matches neither known shape.
    #[error("Workflow template has an unrecognized shape: {0}")]
    UnrecognizedShape(String),
}

impl WorkflowError {
    /// Whether this error is about the document's shape (as opposed to
    /// locating or reading it).
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            WorkflowError::DesignDocument | WorkflowError::UnrecognizedShape(_)
        )
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// A classified workflow document.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowTemplate {
    Executable(ExecutableTemplate),
    Design(DesignTemplate),
}

/// Design-tool export. Kept only so callers can report what they received.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignTemplate {
    pub node_count: usize,
}

/// Executable ("API prompt") workflow: node id -> node descriptor.
///
/// Every entry has been checked to carry a string `class_type`; a missing
/// `inputs` map is filled in as empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutableTemplate {
    nodes: Map<String, Value>,
}

impl WorkflowTemplate {
    /// Classify a parsed JSON document.
    pub fn classify(json: Value) -> Result<Self, WorkflowError> {
        let Value::Object(mut obj) = json else {
            return Err(WorkflowError::UnrecognizedShape(
                "workflow JSON must be an object".to_string(),
            ));
        };

        if let Some(Value::Array(nodes)) = obj.get(DESIGN_NODES_KEY) {
            return Ok(WorkflowTemplate::Design(DesignTemplate {
                node_count: nodes.len(),
            }));
        }

        if obj.is_empty() {
            return Err(WorkflowError::UnrecognizedShape(
                "workflow JSON must contain at least one node".to_string(),
            ));
        }

        for (node_id, node) in obj.iter_mut() {
            let Value::Object(descriptor) = node else {
                return Err(WorkflowError::UnrecognizedShape(format!(
                    "entry '{node_id}' is not a node object"
                )));
            };
            if !descriptor.get("class_type").is_some_and(Value::is_string) {
                return Err(WorkflowError::UnrecognizedShape(format!(
                    "node '{node_id}' is missing required 'class_type' field"
                )));
            }
            if !descriptor.get("inputs").is_some_and(Value::is_object) {
                descriptor.insert("inputs".to_string(), Value::Object(Map::new()));
            }
        }

        Ok(WorkflowTemplate::Executable(ExecutableTemplate { nodes: obj }))
    }

    /// Read a template from disk and classify it.
    pub fn load(path: &Path) -> Result<Self, WorkflowError> {
        let raw = std::fs::read_to_string(path).map_err(|source| WorkflowError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let json: Value =
            serde_json::from_str(&raw).map_err(|source| WorkflowError::InvalidJson {
                path: path.to_path_buf(),
                source,
            })?;
        Self::classify(json)
    }

    /// Unwrap the executable variant, rejecting design-tool documents.
    pub fn into_executable(self) -> Result<ExecutableTemplate, WorkflowError> {
        match self {
            WorkflowTemplate::Executable(template) => Ok(template),
            WorkflowTemplate::Design(_) => Err(WorkflowError::DesignDocument),
        }
    }
}

impl ExecutableTemplate {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Look up a node descriptor by id.
    pub fn node(&self, node_id: &str) -> Option<&Value> {
        self.nodes.get(node_id)
    }

    /// Overwrite the `text` input of every text-encoding node with the
    /// trimmed prompt. Returns how many nodes were updated.
    ///
    /// An empty prompt is a no-op, and a template with no matching node is
    /// left untouched; neither is an error.
    pub fn inject_prompt(&mut self, prompt: &str) -> usize {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return 0;
        }

        let mut injected = 0;
        for (node_id, node) in self.nodes.iter_mut() {
            let is_text_encoder = node
                .get("class_type")
                .and_then(Value::as_str)
                .is_some_and(|ct| ct.to_lowercase().contains(TEXT_ENCODE_MARKER));
            if !is_text_encoder {
                continue;
            }
            if let Some(inputs) = node.get_mut("inputs").and_then(Value::as_object_mut) {
                inputs.insert(TEXT_INPUT.to_string(), Value::String(prompt.to_string()));
                injected += 1;
                tracing::debug!(node_id = %node_id, "Prompt injected into text-encoding node");
            }
        }
        injected
    }

    /// The JSON body expected by the engine's `prompt` field.
    pub fn to_json(&self) -> Value {
        Value::Object(self.nodes.clone())
    }
}
