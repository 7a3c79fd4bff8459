//! Typed view of the ComfyUI `/history/{prompt_id}` response.
//!
//! The endpoint returns `{ "<prompt_id>": { "outputs": { "<node_id>": {
//! "images": [...] } } } }`, or `{}` while the prompt has not run yet.

use std::collections::{BTreeMap, HashMap};

use archviz_core::job::Artifact;
use serde::Deserialize;

/// Local path clients use to fetch artifact bytes through this service.
pub const IMAGE_PROXY_PATH: &str = "/comfyui/image-proxy";

/// Default artifact kind when the engine omits `type`.
pub const DEFAULT_ARTIFACT_KIND: &str = "output";

/// Whole `/history/{id}` body, keyed by prompt id.
pub type HistoryResponse = HashMap<String, HistoryEntry>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryEntry {
    /// Node id to that node's outputs. Use [`artifacts`](Self::artifacts)
    /// for node order.
    #[serde(default)]
    pub outputs: BTreeMap<String, NodeOutput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

/// One image reference as reported by the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    DEFAULT_ARTIFACT_KIND.to_string()
}

impl ImageRef {
    /// Convert into an [`Artifact`] whose retrieval ref points at the local
    /// proxy rather than the engine.
    pub fn to_artifact(&self) -> Artifact {
        Artifact {
            filename: self.filename.clone(),
            subfolder: self.subfolder.clone(),
            kind: self.kind.clone(),
            retrieval_ref: proxy_ref(&self.filename, &self.subfolder, &self.kind),
        }
    }
}

impl HistoryEntry {
    /// All images across every output node.
    ///
    /// Numeric node ids come first in ascending numeric order, then any
    /// other ids in string order.
    pub fn artifacts(&self) -> Vec<Artifact> {
        let mut nodes: Vec<(&String, &NodeOutput)> = self.outputs.iter().collect();
        nodes.sort_by(|(a, _), (b, _)| node_order(a).cmp(&node_order(b)));

        nodes
            .into_iter()
            .flat_map(|(_, output)| output.images.iter())
            .map(ImageRef::to_artifact)
            .collect()
    }
}

fn node_order(id: &str) -> (bool, u64, &str) {
    match id.parse::<u64>() {
        Ok(n) => (false, n, ""),
        Err(_) => (true, 0, id),
    }
}

/// Build `/comfyui/image-proxy?filename=..&subfolder=..&type=..`.
pub fn proxy_ref(filename: &str, subfolder: &str, kind: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("filename", filename)
        .append_pair("subfolder", subfolder)
        .append_pair("type", kind)
        .finish();
    format!("{IMAGE_PROXY_PATH}?{query}")
}
