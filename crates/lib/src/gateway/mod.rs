//! Gateway: HTTP server hosting the LINE webhook.
//!
//! One request is handled inline: signature check, JSON parse, then each text message
//! event runs through the answer pipeline before the response is sent.

mod server;

pub use server::{router, run_gateway, GatewayState};
