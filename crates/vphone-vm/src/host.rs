//! The hypervisor seam.
//!
//! [`Host`] is everything configuration assembly needs from the hypervisor:
//! capability probing, hardware-model support, NVRAM creation, validation
//! and machine construction. [`GuestMachine`] is the constructed guest.

use crate::builder::VmConfiguration;
use crate::error::HostError;
use crate::hardware::HardwareModel;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use vphone_touch::{TouchTarget, ViewStrategy};

/// Host operating system version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OsVersion {
    pub major: u32,
    pub minor: u32,
}

impl OsVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Optional features the host can provide, probed once per build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    pub os_version: OsVersion,
    pub pl011_serial: bool,
    pub usb_touch_screen: bool,
    pub apple_touch_screen: bool,
    pub gdb_debug_stub: bool,
    pub sep_coprocessor: bool,
    /// The host's own VM view forwards touches to the guest.
    pub native_touch_view: bool,
}

impl HostCapabilities {
    /// First host release whose VM view handles touch input natively.
    pub const NATIVE_TOUCH_VIEW_SINCE: OsVersion = OsVersion::new(16, 0);

    /// Capabilities of a host that offers every private device model.
    pub fn full(os_version: OsVersion) -> Self {
        Self {
            os_version,
            pl011_serial: true,
            usb_touch_screen: true,
            apple_touch_screen: true,
            gdb_debug_stub: true,
            sep_coprocessor: true,
            native_touch_view: os_version >= Self::NATIVE_TOUCH_VIEW_SINCE,
        }
    }

    /// How the window should route pointer input on this host.
    pub fn view_strategy(&self) -> ViewStrategy {
        ViewStrategy::select(self.native_touch_view)
    }
}

/// NVRAM storage bound to a hardware model.
pub trait AuxiliaryStorage: Send {
    fn path(&self) -> &Path;

    /// Set a named NVRAM variable.
    fn set_variable(&mut self, name: &str, value: &[u8]) -> Result<(), HostError>;
}

/// Flags passed when booting the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StartOptions {
    /// Boot into DFU instead of the normal boot chain.
    pub force_dfu: bool,
    pub stop_in_iboot_stage1: bool,
    pub stop_in_iboot_stage2: bool,
    pub stop_on_panic: bool,
    pub stop_on_fatal_error: bool,
}

/// Notification from the hypervisor's own execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// The guest shut itself down.
    GuestStopped,
    /// The guest was stopped by an error.
    StoppedWithError(HostError),
    /// A network attachment went away. The guest keeps running.
    NetworkDisconnected(HostError),
    /// Bytes written by the guest to its serial console.
    SerialOutput(Vec<u8>),
}

/// A constructed guest machine.
#[async_trait]
pub trait GuestMachine: TouchTarget + Send + Sync {
    /// Ask the hypervisor to boot. Resolves once boot initiation is
    /// acknowledged, not when the guest OS is up.
    async fn start(&self, options: StartOptions) -> Result<(), HostError>;

    /// Ask the hypervisor to stop the guest. The stop itself is reported
    /// through [`HostEvent::GuestStopped`].
    async fn request_stop(&self) -> Result<(), HostError>;
}

/// A new guest together with its event stream.
pub struct MachineHandle {
    pub machine: Arc<dyn GuestMachine>,
    pub events: mpsc::UnboundedReceiver<HostEvent>,
}

/// A hypervisor able to run the modeled device.
pub trait Host: Send + Sync {
    fn capabilities(&self) -> HostCapabilities;

    /// Whether the host can run `model`.
    fn is_supported(&self, model: &HardwareModel) -> bool;

    fn minimum_cpu_count(&self) -> usize;

    /// Minimum guest memory in bytes.
    fn minimum_memory_size(&self) -> u64;

    /// Create NVRAM storage at `path`, overwriting any existing file.
    fn create_auxiliary_storage(
        &self,
        path: &Path,
        model: &HardwareModel,
    ) -> Result<Box<dyn AuxiliaryStorage>, HostError>;

    /// Host-side validation of a fully assembled configuration.
    fn validate(&self, config: &VmConfiguration) -> Result<(), HostError>;

    /// Construct a guest from a validated configuration.
    fn create_machine(&self, config: &VmConfiguration) -> Result<MachineHandle, HostError>;
}
