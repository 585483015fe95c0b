//! Local backend client: direct in-process dispatch.

use std::sync::Arc;

use serde_json::Value as Json;

use crate::error::{EngineError, Result};

use super::{BackendClient, InferenceBackend};

/// Backend client that dispatches into a loaded backend instance.
pub struct LocalClient {
    backend: Arc<dyn InferenceBackend>,
}

impl LocalClient {
    /// Wrap an in-process backend instance.
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self { backend }
    }
}

impl BackendClient for LocalClient {
    fn invoke(&self, operation: &str, params: Json) -> Result<Json> {
        self.backend
            .execute(operation, params)
            .map_err(EngineError::Backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingBackend;

    impl InferenceBackend for FailingBackend {
        fn execute(&self, operation: &str, _params: Json) -> std::result::Result<Json, String> {
            Err(format!("no such operation: {}", operation))
        }
    }

    #[test]
    fn test_backend_failure_maps_to_backend_error() {
        let client = LocalClient::new(Arc::new(FailingBackend));
        let err = client.invoke("analyze", Json::Null).unwrap_err();
        assert!(matches!(err, EngineError::Backend(_)));
    }
}
