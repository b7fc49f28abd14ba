//! Messaging channels (LINE).
//!
//! Webhook payload types and signature verification for inbound callbacks, plus the
//! reply connector the pipeline uses to answer an event.

mod handle;
mod inbound;
mod line;

pub use handle::ReplyChannel;
pub use inbound::InboundMessage;
pub use line::{
    sign_body, verify_signature, EventMessage, LineChannel, LineError, WebhookEvent,
    WebhookPayload, SIGNATURE_HEADER,
};
