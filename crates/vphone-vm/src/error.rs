//! Error types for vphone-vm.

use crate::hardware::HardwareModel;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for vphone-vm operations.
pub type Result<T> = std::result::Result<T, VmError>;

/// Errors that abort configuration assembly or guest startup.
#[derive(Debug, Error)]
pub enum VmError {
    /// The host cannot run the modeled hardware
    #[error(
        "{model} hardware model not supported. Check:\n  \
         1. macOS >= 15.0 (Sequoia)\n  \
         2. Signed with com.apple.private.virtualization + \
         com.apple.private.virtualization.security-research\n  \
         3. SIP/AMFI disabled"
    )]
    HardwareModelNotSupported { model: HardwareModel },

    /// Boot ROM is missing
    #[error("ROM not found: {}", .0.display())]
    RomNotFound(PathBuf),

    /// Options rejected before any host work
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// Machine identity could not be written
    #[error("failed to persist machine identity to {}: {source}", .path.display())]
    IdentityPersist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// NVRAM storage could not be created
    #[error("failed to create auxiliary storage: {0}")]
    AuxiliaryStorage(String),

    /// Assembled configuration failed validation
    #[error("configuration validation failed: {0}")]
    ConfigValidationFailed(String),

    /// Host refused to create the guest
    #[error("failed to create VM: {0}")]
    Create(String),

    /// Boot initiation failed
    #[error("failed to start VM: {0}")]
    StartFailed(String),

    /// Stop request refused
    #[error("failed to stop VM: {0}")]
    Stop(String),

    /// Session is not in the expected state
    #[error("invalid session state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a persisted identity could not be loaded.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity file unreadable: {0}")]
    NotFound(#[from] std::io::Error),

    #[error("identity file corrupt: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure reported by the hypervisor host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HostError {
    message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
