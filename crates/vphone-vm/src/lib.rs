//! # vphone-vm
//!
//! Device configuration and lifecycle for a virtual iPhone guest.
//! The hypervisor is reached through the [`Host`] and [`GuestMachine`] traits.
//!
//! ## Quick Start
//!
//! ```no_run
//! use vphone_vm::{DeviceConfigBuilder, GuestSession, Options, SimulatedHost};
//!
//! # async fn example() -> vphone_vm::Result<()> {
//! let host = SimulatedHost::new();
//! let options = Options::builder()
//!     .rom("AVPBooter.vresearch1.bin")
//!     .disk("Disk.img")
//!     .serial_log("serial.log")
//!     .build()?;
//!
//! // Assemble and validate the hardware description
//! let config = DeviceConfigBuilder::new(&host).build(&options)?;
//!
//! // Create the guest and boot it into DFU
//! let mut session = GuestSession::create(&host, config)?;
//! session.on_stop(|reason| println!("guest stopped: {reason:?}"));
//! session.start(true, false, false).await?;
//!
//! // Handle host events until the guest stops
//! let reason = session.run_until_stopped().await?;
//! assert!(reason.error().is_none());
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Stable Identity**: machine identifier persisted next to NVRAM so the ECID survives restarts
//! - **Capability Probing**: optional devices picked once from what the host offers
//! - **Lifecycle Management**: start (normal or DFU), stop notification, serial capture
//! - **Simulated Host**: in-process host for tests and dry runs

mod builder;
mod console;
mod devices;
mod error;
mod hardware;
mod host;
mod identity;
mod options;
mod session;
mod sim;

pub use builder::{
    DeviceConfigBuilder, PlatformConfiguration, VmConfiguration, BOOT_ARGS_VARIABLE,
    NVRAM_BOOT_ARGS,
};
pub use console::ConsoleSink;
pub use devices::{
    BootLoader, Coprocessor, DebugStub, KeyboardDevice, NetworkDevice, SerialAttachment,
    SerialPortDevice, StorageDevice, TouchScreenDevice,
};
pub use error::{HostError, IdentityError, Result, VmError};
pub use hardware::{GraphicsDevice, HardwareModel};
pub use host::{
    AuxiliaryStorage, GuestMachine, Host, HostCapabilities, HostEvent, MachineHandle, OsVersion,
    StartOptions,
};
pub use identity::{IdentitySource, IdentityStore, MachineIdentity, MACHINE_IDENTIFIER_FILE};
pub use options::{
    Options, OptionsBuilder, DEFAULT_CPU_COUNT, DEFAULT_MEMORY_SIZE, DEFAULT_NVRAM_PATH,
    DEFAULT_SEP_STORAGE_FILE,
};
pub use session::{GuestSession, SessionState, StopReason};
pub use sim::{read_nvram_variables, RecordingTouchDevice, SimulatedHost, SimulatedMachine};
