//! Advisory hints from an external collaborator.
//!
//! Hints are free-text suggestions attached to nodes. They are requested on
//! a spawned task against a snapshot of the normalized graph and merged only
//! if the answer is already there when emission starts. "No hints" is a
//! normal outcome and never fails an invocation.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use terrane_model::ResourceGraph;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};

/// One suggestion for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHint {
    pub node_id: String,
    pub text: String,
}

impl NodeHint {
    pub fn new(node_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            text: text.into(),
        }
    }
}

/// What a provider answered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HintOutcome {
    #[default]
    NoHints,
    Hints(Vec<NodeHint>),
}

impl HintOutcome {
    pub fn from_hints(hints: Vec<NodeHint>) -> Self {
        if hints.is_empty() {
            HintOutcome::NoHints
        } else {
            HintOutcome::Hints(hints)
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HintOutcome::NoHints => 0,
            HintOutcome::Hints(hints) => hints.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(node id, text)` pairs for `ResourceGraph::merge_hints`.
    pub fn into_pairs(self) -> Vec<(String, String)> {
        match self {
            HintOutcome::NoHints => Vec::new(),
            HintOutcome::Hints(hints) => hints.into_iter().map(|h| (h.node_id, h.text)).collect(),
        }
    }
}

/// Source of advisory hints. Implementations may be slow or fail; the
/// engine never waits for them.
#[async_trait]
pub trait HintProvider: Send + Sync {
    /// Name recorded as the source of merged hints.
    fn name(&self) -> &str;

    async fn request_hints(&self, graph: &ResourceGraph) -> HintOutcome;
}

/// Hints read from a YAML file mapping node ids to suggestions.
///
/// ```yaml
/// aws_s3_bucket.logs:
///   - enable access logging
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticHints {
    hints: BTreeMap<String, Vec<String>>,
}

impl StaticHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let hints: BTreeMap<String, Vec<String>> = serde_yaml::from_str(&content)
            .map_err(|e| CoreError::InvalidConfiguration(format!("{}: {}", path.display(), e)))?;
        Ok(Self { hints })
    }

    pub fn with_hint(mut self, node_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.hints.entry(node_id.into()).or_default().push(text.into());
        self
    }
}

#[async_trait]
impl HintProvider for StaticHints {
    fn name(&self) -> &str {
        "static"
    }

    async fn request_hints(&self, graph: &ResourceGraph) -> HintOutcome {
        let hints = self
            .hints
            .iter()
            .filter(|(id, _)| graph.contains(graph.resolve_alias(id)))
            .flat_map(|(id, texts)| texts.iter().map(move |text| NodeHint::new(id.clone(), text.clone())))
            .collect();
        HintOutcome::from_hints(hints)
    }
}

/// An outstanding hint request.
///
/// Dropping it aborts the request.
pub struct PendingHints {
    provider: String,
    receiver: oneshot::Receiver<HintOutcome>,
    handle: JoinHandle<()>,
}

impl PendingHints {
    /// Start `provider` on its own task against `snapshot`.
    pub fn spawn(provider: Arc<dyn HintProvider>, snapshot: ResourceGraph) -> Self {
        let (sender, receiver) = oneshot::channel();
        let name = provider.name().to_string();
        debug!("Requesting hints from {}", name);
        let handle = tokio::spawn(async move {
            let outcome = provider.request_hints(&snapshot).await;
            if sender.send(outcome).is_err() {
                debug!("Hint answer arrived after the request was dropped");
            }
        });
        Self {
            provider: name,
            receiver,
            handle,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// The answer if it has already arrived, else `NoHints`. Never waits.
    pub fn take_ready(mut self) -> HintOutcome {
        match self.receiver.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => {
                debug!("Hints from {} not ready at emission; discarded", self.provider);
                HintOutcome::NoHints
            }
            Err(TryRecvError::Closed) => {
                warn!("Hint provider {} ended without an answer", self.provider);
                HintOutcome::NoHints
            }
        }
    }
}

impl Drop for PendingHints {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl std::fmt::Debug for PendingHints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingHints")
            .field("provider", &self.provider)
            .finish()
    }
}
