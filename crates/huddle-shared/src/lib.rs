//! Types shared by the Huddle chat engine and its hosts: identifiers,
//! privilege levels, messages, transfer status and the transport event
//! protocol.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::{ChatError, Result, TransportError, ValidationError};
