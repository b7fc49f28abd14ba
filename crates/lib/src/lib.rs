//! ragbridge core library: LINE webhook gateway, retrieval and completion clients,
//! and the answer pipeline, used by the CLI.

pub mod channels;
pub mod config;
pub mod gateway;
pub mod init;
pub mod llm;
pub mod pipeline;
pub mod retrieval;
