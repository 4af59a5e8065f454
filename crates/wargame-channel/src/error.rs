//! Error types for shared channels

use wargame_store::StoreError;

/// Errors publishing to a channel
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The record could not be persisted
    #[error("publish to {key} failed: {source}")]
    Publish {
        /// Channel key
        key: String,
        /// Store failure
        #[source]
        source: StoreError,
    },
}

impl ChannelError {
    /// Create publish error
    pub fn publish(key: impl Into<String>, source: StoreError) -> Self {
        Self::Publish {
            key: key.into(),
            source,
        }
    }
}
