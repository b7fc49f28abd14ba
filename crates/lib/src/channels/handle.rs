//! Reply connector seam between the pipeline and a messaging platform.

use async_trait::async_trait;

use crate::channels::LineError;

/// Sends one text reply addressed by a reply token.
#[async_trait]
pub trait ReplyChannel: Send + Sync {
    /// Channel id (e.g. "line").
    fn id(&self) -> &str;
    /// Deliver `text` as a single text message to the conversation behind `reply_token`.
    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), LineError>;
}
