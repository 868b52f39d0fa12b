//! Relay Core - Fundamental types and primitives
//!
//! This crate defines the core types shared by runners and the judge:
//! - Identifiers (RunnerId, Location, ConversationId)
//! - Roles and runner states
//! - Message envelopes and payload encoding
//! - Bootstrap configuration parsing
//! - Error taxonomy

pub mod id;
pub mod role;
pub mod message;
pub mod config;
pub mod error;

pub use id::*;
pub use role::*;
pub use message::*;
pub use config::*;
pub use error::*;
