//! Inbound text message extracted from a webhook event: what the pipeline answers.

/// A text message from a channel together with the token that addresses its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub reply_token: String,
    pub text: String,
}
