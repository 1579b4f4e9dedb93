use std::{fmt, sync::Arc};

use serde_json::Value;

use crate::error::OrchestratorError;

pub type Middleware = Arc<dyn Fn(Value) -> anyhow::Result<Value> + Send + Sync>;

/// Ordered transforms applied to inbound push-channel and request-client payloads.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    stages: Vec<Middleware>,
}

impl MiddlewareChain {
    pub fn push(&mut self, stage: Middleware) {
        self.stages.push(stage);
    }

    pub fn clear(&mut self) {
        self.stages.clear();
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Folds the chain over `data`, feeding each stage the previous stage's output.
    pub fn apply(&self, data: Value) -> Result<Value, OrchestratorError> {
        self.stages
            .iter()
            .try_fold(data, |acc, stage| stage(acc))
            .map_err(OrchestratorError::Middleware)
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("stages", &self.stages.len())
            .finish()
    }
}
