//! Device descriptors attached to a guest configuration.
//!
//! Every optional feature is a tagged variant picked once, while the
//! configuration is assembled, from what the host reports it can do.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Boot loader with a custom ROM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootLoader {
    pub rom_path: PathBuf,
}

/// Block storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageDevice {
    VirtioBlock { path: PathBuf, read_only: bool },
}

/// Network interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkDevice {
    /// Virtio NIC behind the host's shared NAT.
    VirtioNat,
}

/// Where a serial port's bytes go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerialAttachment {
    /// Host standard input and output.
    StandardIo,
}

/// Serial console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerialPortDevice {
    /// PL011 UART.
    Pl011 { attachment: SerialAttachment },
    /// Virtio console, used when the host has no PL011 model.
    VirtioConsole { attachment: SerialAttachment },
}

/// Touch screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TouchScreenDevice {
    Usb,
    Apple,
}

/// Keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyboardDevice {
    Usb,
}

/// Debug stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebugStub {
    /// GDB remote stub. `None` lets the host assign the port.
    Gdb { port: Option<u16> },
}

impl DebugStub {
    pub fn system_assigned() -> Self {
        DebugStub::Gdb { port: None }
    }
}

/// Auxiliary processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Coprocessor {
    /// Secure Enclave Processor.
    SecureEnclave {
        storage_path: PathBuf,
        rom_path: Option<PathBuf>,
        debug_stub: DebugStub,
    },
}
