//! Errors reported by resource managers

use crate::code::XaCode;
use thiserror::Error;

/// A failure the resource manager reported through the XA code domain
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct XaError {
    pub code: XaCode,
    pub message: String,
}

impl XaError {
    pub fn new(code: XaCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<XaCode> for XaError {
    fn from(code: XaCode) -> Self {
        Self::new(code, code.name())
    }
}

/// Errors a resource manager call can fail with
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("XA error {0}")]
    Xa(#[from] XaError),

    /// Failure outside the XA vocabulary (driver bug, panic, I/O error)
    #[error("Unexpected resource failure: {0}")]
    Unexpected(String),
}

impl ResourceError {
    /// The XA code, if the failure carried one
    pub fn code(&self) -> Option<XaCode> {
        match self {
            ResourceError::Xa(e) => Some(e.code),
            ResourceError::Unexpected(_) => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ResourceError::Xa(e) => &e.message,
            ResourceError::Unexpected(message) => message,
        }
    }
}

impl From<XaCode> for ResourceError {
    fn from(code: XaCode) -> Self {
        ResourceError::Xa(code.into())
    }
}
