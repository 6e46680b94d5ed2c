//! Direct instance healthcheck probe

use crate::error::CloudResult;
use async_trait::async_trait;

/// Probes `http://<host>:<port><path>` and reports whether it answered 200.
#[async_trait]
pub trait InstanceHealthClient: Send + Sync {
    async fn healthy(&self, host: &str, port: u16, path: &str) -> CloudResult<bool>;
}
