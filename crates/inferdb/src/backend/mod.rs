//! Backend dispatch: uniform access to the inference backend, local or remote.
//!
//! Callers see one contract — `invoke(operation, params)` — regardless of
//! whether the operation runs in-process or over the network. Backend-side
//! failures of either kind surface as `EngineError::Backend`.

mod local;
mod mock;
pub mod ops;
mod remote;

pub use local::LocalClient;
pub use mock::MockBackend;
pub use remote::RemoteClient;

use serde_json::Value as Json;

use crate::error::Result;

/// Uniform call interface to the inference backend.
///
/// Implementations must be behaviorally indistinguishable: same operation
/// names, same parameter and result shapes, same error mapping. The core
/// never retries; retry policy belongs to callers.
pub trait BackendClient: Send + Sync {
    /// Invoke one backend operation.
    fn invoke(&self, operation: &str, params: Json) -> Result<Json>;
}

/// An in-process inference backend instance.
///
/// This is the seam behind `LocalClient`: the statistical algorithms live
/// entirely behind it. Errors are plain strings; the client maps them to
/// `EngineError::Backend`.
pub trait InferenceBackend: Send + Sync {
    /// Execute one operation against this backend instance.
    fn execute(&self, operation: &str, params: Json) -> std::result::Result<Json, String>;
}
