//! Application metadata registry

use crate::error::CloudResult;
use async_trait::async_trait;
use maestro_types::OnixMetadata;
use serde::{Deserialize, Serialize};

/// An application as registered in Onix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnixApplication {
    pub name: String,
    #[serde(default)]
    pub metadata: OnixMetadata,
}

/// The application metadata service.
#[async_trait]
pub trait OnixClient: Send + Sync {
    /// Fetch an application's registration, if present.
    async fn application(&self, name: &str) -> CloudResult<Option<OnixApplication>>;

    /// All registered application names.
    async fn applications(&self) -> CloudResult<Vec<String>>;

    /// Create or update an application registration. Upserting identical
    /// input yields an identical registration.
    async fn upsert_application(
        &self,
        name: &str,
        metadata: OnixMetadata,
    ) -> CloudResult<OnixApplication>;

    /// The known environment names.
    async fn environments(&self) -> CloudResult<Vec<String>>;
}
