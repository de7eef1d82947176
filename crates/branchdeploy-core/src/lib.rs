pub mod branch;
pub mod config;
pub mod credential;
pub mod deploy_request;
pub mod error;
pub mod event;
pub mod handoff;
pub mod io;
pub mod lifecycle;
pub mod poll;
pub mod push;
pub mod redact;
pub mod remote;
pub mod status;
pub mod types;

#[cfg(test)]
mod testing;

pub use error::{DeployError, Result};
