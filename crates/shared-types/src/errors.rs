//! # Error Types

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Categories of module errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleErrorKind {
    /// `initialize` failed.
    InitializationFailed,
    /// `shutdown` failed.
    ShutdownFailed,
    /// No module with that name is registered.
    NotRegistered,
    /// The operation is not valid in the module's current lifecycle state.
    InvalidState,
    /// The module refused a domain operation.
    Rejected,
}

impl fmt::Display for ModuleErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitializationFailed => write!(f, "InitializationFailed"),
            Self::ShutdownFailed => write!(f, "ShutdownFailed"),
            Self::NotRegistered => write!(f, "NotRegistered"),
            Self::InvalidState => write!(f, "InvalidState"),
            Self::Rejected => write!(f, "Rejected"),
        }
    }
}

/// Error raised by a module or by the registry on its behalf.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("[{module}] {kind}: {message}")]
pub struct ModuleError {
    /// Name of the module involved.
    pub module: String,
    /// Error kind.
    pub kind: ModuleErrorKind,
    /// Human-readable error message.
    pub message: String,
}

impl ModuleError {
    /// Create a module error.
    pub fn new(module: impl Into<String>, kind: ModuleErrorKind, message: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            kind,
            message: message.into(),
        }
    }

    /// `InitializationFailed` error.
    pub fn initialization(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(module, ModuleErrorKind::InitializationFailed, message)
    }

    /// `ShutdownFailed` error.
    pub fn shutdown(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(module, ModuleErrorKind::ShutdownFailed, message)
    }

    /// `NotRegistered` error.
    pub fn not_registered(module: impl Into<String>) -> Self {
        let module = module.into();
        let message = format!("no module named {module:?}");
        Self::new(module, ModuleErrorKind::NotRegistered, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_error_display() {
        let err = ModuleError::initialization("ledger", "compliance rules missing");
        let display = err.to_string();
        assert!(display.contains("ledger"));
        assert!(display.contains("InitializationFailed"));
        assert!(display.contains("compliance rules missing"));
    }

    #[test]
    fn test_not_registered() {
        let err = ModuleError::not_registered("ghost");
        assert_eq!(err.kind, ModuleErrorKind::NotRegistered);
        assert!(err.message.contains("ghost"));
    }
}
