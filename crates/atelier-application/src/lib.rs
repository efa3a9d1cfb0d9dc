//! Application layer for Atelier.
//!
//! This crate wires the infrastructure stores and the engine manager into an
//! explicitly constructed application context, and provides the use cases
//! request handlers call.

pub mod agent_service;
pub mod context;

pub use agent_service::AgentChatService;
pub use context::{AppContext, init_tracing};
