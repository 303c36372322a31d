//! Assembly of a validated guest configuration.

use crate::devices::{
    BootLoader, Coprocessor, DebugStub, KeyboardDevice, NetworkDevice, SerialAttachment,
    SerialPortDevice, StorageDevice, TouchScreenDevice,
};
use crate::error::{Result, VmError};
use crate::hardware::{GraphicsDevice, HardwareModel};
use crate::host::{Host, HostCapabilities};
use crate::identity::{IdentityStore, MachineIdentity};
use crate::options::Options;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// NVRAM variable holding the kernel boot arguments.
pub const BOOT_ARGS_VARIABLE: &str = "boot-args";

/// Boot arguments written to NVRAM so the guest logs to its serial port.
pub const NVRAM_BOOT_ARGS: &str = "serial=3 debug=0x104c04";

/// Platform section of a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformConfiguration {
    pub hardware_model: HardwareModel,
    pub machine_identity: MachineIdentity,
    pub auxiliary_storage_path: PathBuf,
}

/// Fully assembled and validated hardware description of a guest.
///
/// Only [`DeviceConfigBuilder::build`] creates one; it is consumed by
/// [`GuestSession::create`](crate::GuestSession::create).
#[derive(Debug, Serialize)]
pub struct VmConfiguration {
    boot_loader: BootLoader,
    platform: PlatformConfiguration,
    cpu_count: usize,
    memory_size: u64,
    graphics: GraphicsDevice,
    storage_devices: Vec<StorageDevice>,
    network_devices: Vec<NetworkDevice>,
    serial_ports: Vec<SerialPortDevice>,
    touch_screens: Vec<TouchScreenDevice>,
    keyboards: Vec<KeyboardDevice>,
    debug_stub: Option<DebugStub>,
    coprocessors: Vec<Coprocessor>,
    serial_log_path: Option<PathBuf>,
}

impl VmConfiguration {
    pub fn boot_loader(&self) -> &BootLoader {
        &self.boot_loader
    }

    pub fn platform(&self) -> &PlatformConfiguration {
        &self.platform
    }

    pub fn cpu_count(&self) -> usize {
        self.cpu_count
    }

    /// Guest memory in bytes.
    pub fn memory_size(&self) -> u64 {
        self.memory_size
    }

    pub fn graphics(&self) -> &GraphicsDevice {
        &self.graphics
    }

    pub fn storage_devices(&self) -> &[StorageDevice] {
        &self.storage_devices
    }

    pub fn network_devices(&self) -> &[NetworkDevice] {
        &self.network_devices
    }

    pub fn serial_ports(&self) -> &[SerialPortDevice] {
        &self.serial_ports
    }

    pub fn touch_screens(&self) -> &[TouchScreenDevice] {
        &self.touch_screens
    }

    pub fn keyboards(&self) -> &[KeyboardDevice] {
        &self.keyboards
    }

    pub fn debug_stub(&self) -> Option<&DebugStub> {
        self.debug_stub.as_ref()
    }

    pub fn coprocessors(&self) -> &[Coprocessor] {
        &self.coprocessors
    }

    /// Serial-log file, opened when the session is created.
    pub fn serial_log_path(&self) -> Option<&Path> {
        self.serial_log_path.as_deref()
    }

    /// Pretty JSON description.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Builds a [`VmConfiguration`] for the modeled device on a given host.
///
/// # Example
///
/// ```no_run
/// use vphone_vm::{DeviceConfigBuilder, Options, SimulatedHost};
///
/// # fn example() -> vphone_vm::Result<()> {
/// let host = SimulatedHost::new();
/// let options = Options::builder()
///     .rom("AVPBooter.vresearch1.bin")
///     .disk("Disk.img")
///     .nvram("nvram.bin")
///     .build()?;
///
/// let config = DeviceConfigBuilder::new(&host).build(&options)?;
/// println!("{}", config.platform().machine_identity);
/// # Ok(())
/// # }
/// ```
pub struct DeviceConfigBuilder<'a> {
    host: &'a dyn Host,
}

impl<'a> DeviceConfigBuilder<'a> {
    pub fn new(host: &'a dyn Host) -> Self {
        Self { host }
    }

    /// Assemble and validate the configuration.
    ///
    /// Optional devices whose precondition fails are left out. A missing
    /// ROM, an unsupported hardware model, an unwritable identity file,
    /// NVRAM creation and final validation are fatal. The serial log is
    /// only recorded here; the session opens it.
    pub fn build(&self, options: &Options) -> Result<VmConfiguration> {
        options.validate()?;

        if !options.rom_path.exists() {
            return Err(VmError::RomNotFound(options.rom_path.clone()));
        }

        let caps = self.host.capabilities();
        tracing::debug!(os_version = %caps.os_version, ?caps, "Probed host capabilities");

        // Hardware model
        let model = HardwareModel::VRESEARCH101;
        if !self.host.is_supported(&model) {
            return Err(VmError::HardwareModelNotSupported { model });
        }
        tracing::info!(%model, "Hardware model supported");

        // Platform: identity and NVRAM
        let (machine_identity, _) =
            IdentityStore::new(options.machine_identifier_path()).resolve()?;

        let mut nvram = self
            .host
            .create_auxiliary_storage(&options.nvram_path, &model)
            .map_err(|e| VmError::AuxiliaryStorage(e.to_string()))?;
        match nvram.set_variable(BOOT_ARGS_VARIABLE, NVRAM_BOOT_ARGS.as_bytes()) {
            Ok(()) => tracing::info!(boot_args = NVRAM_BOOT_ARGS, "NVRAM boot-args set"),
            Err(e) => tracing::warn!(error = %e, "Failed to set NVRAM boot-args"),
        }

        let platform = PlatformConfiguration {
            hardware_model: model,
            machine_identity,
            auxiliary_storage_path: nvram.path().to_path_buf(),
        };

        let boot_loader = BootLoader {
            rom_path: options.rom_path.clone(),
        };

        let cpu_count = options.cpu_count.max(self.host.minimum_cpu_count());
        let memory_size = options.memory_size.max(self.host.minimum_memory_size());
        tracing::debug!(cpu_count, memory_size, "Machine resources");

        // Storage
        let mut storage_devices = Vec::new();
        if options.disk_path.exists() {
            storage_devices.push(StorageDevice::VirtioBlock {
                path: options.disk_path.clone(),
                read_only: false,
            });
            tracing::info!(disk = %options.disk_path.display(), "Disk attached");
        } else {
            tracing::info!(disk = %options.disk_path.display(), "Disk image not found, no storage attached");
        }

        let network_devices = vec![NetworkDevice::VirtioNat];

        let serial_ports = vec![Self::serial_port(&caps)];

        let serial_log_path = options.serial_log_path.clone();
        if let Some(path) = &serial_log_path {
            tracing::info!(path = %path.display(), "Serial log");
        }

        let touch_screens: Vec<_> = Self::touch_screen(&caps).into_iter().collect();
        let keyboards = vec![KeyboardDevice::Usb];

        let debug_stub = if caps.gdb_debug_stub {
            Some(DebugStub::system_assigned())
        } else {
            tracing::warn!("Host has no GDB debug stub");
            None
        };

        let coprocessors: Vec<_> = self.coprocessor(options, &caps).into_iter().collect();

        let config = VmConfiguration {
            boot_loader,
            platform,
            cpu_count,
            memory_size,
            graphics: GraphicsDevice::VRESEARCH101_PANEL,
            storage_devices,
            network_devices,
            serial_ports,
            touch_screens,
            keyboards,
            debug_stub,
            coprocessors,
            serial_log_path,
        };

        self.host
            .validate(&config)
            .map_err(|e| VmError::ConfigValidationFailed(e.to_string()))?;
        tracing::info!("Configuration validated");

        Ok(config)
    }

    fn serial_port(caps: &HostCapabilities) -> SerialPortDevice {
        let attachment = SerialAttachment::StandardIo;
        if caps.pl011_serial {
            tracing::info!("PL011 serial port attached (interactive)");
            SerialPortDevice::Pl011 { attachment }
        } else {
            tracing::info!("Virtio console attached (interactive)");
            SerialPortDevice::VirtioConsole { attachment }
        }
    }

    fn touch_screen(caps: &HostCapabilities) -> Option<TouchScreenDevice> {
        if caps.usb_touch_screen {
            tracing::info!("USB touch screen configured");
            Some(TouchScreenDevice::Usb)
        } else if caps.apple_touch_screen {
            tracing::info!("Apple touch screen configured");
            Some(TouchScreenDevice::Apple)
        } else {
            tracing::warn!("Host offers no touch screen model, pointer input disabled");
            None
        }
    }

    fn coprocessor(&self, options: &Options, caps: &HostCapabilities) -> Option<Coprocessor> {
        if options.skip_sep {
            tracing::info!("SEP skipped, no coprocessor");
            return None;
        }
        if !caps.sep_coprocessor {
            tracing::warn!("Host has no SEP coprocessor model, no coprocessor");
            return None;
        }

        let storage_path = options.resolved_sep_storage_path();
        tracing::info!(storage = %storage_path.display(), "SEP coprocessor enabled");
        Some(Coprocessor::SecureEnclave {
            storage_path,
            rom_path: options.sep_rom_path.clone(),
            debug_stub: DebugStub::system_assigned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::OsVersion;
    use crate::sim::SimulatedHost;
    use uuid::Uuid;

    struct Scratch {
        dir: PathBuf,
    }

    impl Scratch {
        fn new() -> Self {
            let dir = std::env::temp_dir().join(format!("vphone-builder-{}", Uuid::new_v4()));
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("rom.bin"), b"rom").unwrap();
            Self { dir }
        }

        fn options(&self) -> crate::options::OptionsBuilder {
            Options::builder()
                .rom(self.dir.join("rom.bin"))
                .disk(self.dir.join("missing.img"))
                .nvram(self.dir.join("nvram.bin"))
        }
    }

    #[test]
    fn test_missing_rom() {
        let scratch = Scratch::new();
        let host = SimulatedHost::new();
        let options = scratch
            .options()
            .rom(scratch.dir.join("nope.bin"))
            .build()
            .unwrap();

        let result = DeviceConfigBuilder::new(&host).build(&options);
        assert!(matches!(result, Err(VmError::RomNotFound(_))));
        assert!(!scratch.dir.join("machineIdentifier.bin").exists());
    }

    #[test]
    fn test_unsupported_model_aborts_before_side_effects() {
        let scratch = Scratch::new();
        let host = SimulatedHost::new().unsupported();
        let options = scratch.options().build().unwrap();

        let result = DeviceConfigBuilder::new(&host).build(&options);
        assert!(matches!(
            result,
            Err(VmError::HardwareModelNotSupported { .. })
        ));
        assert!(!scratch.dir.join("machineIdentifier.bin").exists());
        assert!(!scratch.dir.join("nvram.bin").exists());
    }

    #[test]
    fn test_resources_clamped_to_minimum() {
        let scratch = Scratch::new();
        let host = SimulatedHost::new().with_minimums(2, 1024 * 1024 * 1024);
        let options = scratch
            .options()
            .cpu_count(1)
            .memory_mib(512)
            .build()
            .unwrap();

        let config = DeviceConfigBuilder::new(&host).build(&options).unwrap();
        assert_eq!(config.cpu_count(), 2);
        assert_eq!(config.memory_size(), 1024 * 1024 * 1024);
    }

    #[test]
    fn test_disk_attached_when_present() {
        let scratch = Scratch::new();
        let disk = scratch.dir.join("Disk.img");
        std::fs::write(&disk, b"").unwrap();
        let host = SimulatedHost::new();
        let options = scratch.options().disk(&disk).build().unwrap();

        let config = DeviceConfigBuilder::new(&host).build(&options).unwrap();
        assert_eq!(
            config.storage_devices(),
            &[StorageDevice::VirtioBlock {
                path: disk,
                read_only: false
            }]
        );
    }

    #[test]
    fn test_always_present_devices() {
        let scratch = Scratch::new();
        let host = SimulatedHost::new();
        let options = scratch.options().build().unwrap();

        let config = DeviceConfigBuilder::new(&host).build(&options).unwrap();
        assert_eq!(config.network_devices(), &[NetworkDevice::VirtioNat]);
        assert_eq!(
            config.serial_ports(),
            &[SerialPortDevice::Pl011 {
                attachment: SerialAttachment::StandardIo
            }]
        );
        assert_eq!(config.touch_screens(), &[TouchScreenDevice::Usb]);
        assert_eq!(config.keyboards(), &[KeyboardDevice::Usb]);
        assert_eq!(config.debug_stub(), Some(&DebugStub::Gdb { port: None }));
        assert_eq!(*config.graphics(), GraphicsDevice::VRESEARCH101_PANEL);
        assert_eq!(config.boot_loader().rom_path, scratch.dir.join("rom.bin"));
    }

    #[test]
    fn test_fallback_variants_on_older_host() {
        let scratch = Scratch::new();
        let mut caps = HostCapabilities::full(OsVersion::new(14, 6));
        caps.pl011_serial = false;
        caps.usb_touch_screen = false;
        caps.gdb_debug_stub = false;
        let host = SimulatedHost::new().with_capabilities(caps);
        let options = scratch.options().build().unwrap();

        let config = DeviceConfigBuilder::new(&host).build(&options).unwrap();
        assert!(matches!(
            config.serial_ports()[0],
            SerialPortDevice::VirtioConsole { .. }
        ));
        assert_eq!(config.touch_screens(), &[TouchScreenDevice::Apple]);
        assert!(config.debug_stub().is_none());
    }

    #[test]
    fn test_no_touch_model_is_not_fatal() {
        let scratch = Scratch::new();
        let mut caps = HostCapabilities::full(OsVersion::new(15, 0));
        caps.usb_touch_screen = false;
        caps.apple_touch_screen = false;
        let host = SimulatedHost::new().with_capabilities(caps);
        let options = scratch.options().build().unwrap();

        let config = DeviceConfigBuilder::new(&host).build(&options).unwrap();
        assert!(config.touch_screens().is_empty());
    }

    #[test]
    fn test_sep_attached_with_default_storage() {
        let scratch = Scratch::new();
        let host = SimulatedHost::new();
        let options = scratch.options().skip_sep(false).build().unwrap();

        let config = DeviceConfigBuilder::new(&host).build(&options).unwrap();
        assert_eq!(
            config.coprocessors(),
            &[Coprocessor::SecureEnclave {
                storage_path: scratch.dir.join("sep_storage.bin"),
                rom_path: None,
                debug_stub: DebugStub::Gdb { port: None },
            }]
        );
    }

    #[test]
    fn test_sep_skipped_on_host_without_model() {
        let scratch = Scratch::new();
        let mut caps = HostCapabilities::full(OsVersion::new(15, 0));
        caps.sep_coprocessor = false;
        let host = SimulatedHost::new().with_capabilities(caps);
        let options = scratch.options().skip_sep(false).build().unwrap();

        let config = DeviceConfigBuilder::new(&host).build(&options).unwrap();
        assert!(config.coprocessors().is_empty());
    }

    #[test]
    fn test_zero_resources_raised_to_minimum() {
        let scratch = Scratch::new();
        let host = SimulatedHost::new().with_minimums(2, 1 << 30);
        let options = scratch
            .options()
            .cpu_count(0)
            .memory_size(0)
            .build()
            .unwrap();

        let config = DeviceConfigBuilder::new(&host).build(&options).unwrap();
        assert_eq!(config.cpu_count(), 2);
        assert_eq!(config.memory_size(), 1 << 30);
    }

    #[test]
    fn test_build_leaves_serial_log_untouched() {
        let scratch = Scratch::new();
        let log = scratch.dir.join("serial.log");
        std::fs::write(&log, b"previous boot").unwrap();
        let host = SimulatedHost::new();
        let options = scratch.options().serial_log(&log).build().unwrap();

        let config = DeviceConfigBuilder::new(&host).build(&options).unwrap();
        assert_eq!(config.serial_log_path(), Some(log.as_path()));
        assert_eq!(std::fs::read(&log).unwrap(), b"previous boot");
    }

    #[test]
    fn test_failed_validation_leaves_serial_log_untouched() {
        let scratch = Scratch::new();
        let log = scratch.dir.join("serial.log");
        std::fs::write(&log, b"previous boot").unwrap();
        let host = SimulatedHost::new().with_validation_error("bad config");
        let options = scratch.options().serial_log(&log).build().unwrap();

        assert!(DeviceConfigBuilder::new(&host).build(&options).is_err());
        assert_eq!(std::fs::read(&log).unwrap(), b"previous boot");
    }

    #[test]
    fn test_host_validation_failure() {
        let scratch = Scratch::new();
        let host = SimulatedHost::new().with_validation_error("memory size not aligned");
        let options = scratch.options().build().unwrap();

        let err = DeviceConfigBuilder::new(&host).build(&options).unwrap_err();
        assert!(matches!(err, VmError::ConfigValidationFailed(_)));
        assert!(err.to_string().contains("memory size not aligned"));
    }

    #[test]
    fn test_nvram_write_failure_is_not_fatal() {
        let scratch = Scratch::new();
        let host = SimulatedHost::new().rejecting_nvram_writes();
        let options = scratch.options().build().unwrap();

        assert!(DeviceConfigBuilder::new(&host).build(&options).is_ok());
    }

    #[test]
    fn test_json_description() {
        let scratch = Scratch::new();
        let host = SimulatedHost::new();
        let options = scratch
            .options()
            .serial_log(scratch.dir.join("serial.log"))
            .build()
            .unwrap();

        let config = DeviceConfigBuilder::new(&host).build(&options).unwrap();
        let json = config.to_json().unwrap();
        assert!(json.contains("\"serial_log_path\""));
        assert!(json.contains("\"ECID\""));
    }
}
