//! X/Open XA resource manager interface
//!
//! This crate defines the outbound side of a transaction participant:
//! - The `ResourceManager` capability a branch is driven through
//! - The XA result/error code domain as a closed enumeration
//! - Errors a resource manager can fail with
//!
//! With the `test-utils` feature it also ships a scripted resource manager
//! for exercising participants without a real database.

pub mod code;
pub mod error;
pub mod resource;
#[cfg(feature = "test-utils")]
pub mod testing;

pub use code::{CodeClass, RollbackReason, XaCode};
pub use error::{ResourceError, XaError};
pub use resource::ResourceManager;
