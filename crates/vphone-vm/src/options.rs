//! Options for assembling a guest configuration.

use crate::error::{Result, VmError};
use crate::identity::MACHINE_IDENTIFIER_FILE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default number of virtual CPUs.
pub const DEFAULT_CPU_COUNT: usize = 4;

/// Default guest memory (4096 MiB), in bytes.
pub const DEFAULT_MEMORY_SIZE: u64 = 4096 * MIB;

/// Default NVRAM storage file.
pub const DEFAULT_NVRAM_PATH: &str = "nvram.bin";

/// SEP storage file placed next to NVRAM when no path is given.
pub const DEFAULT_SEP_STORAGE_FILE: &str = "sep_storage.bin";

const MIB: u64 = 1024 * 1024;

/// Inputs to [`DeviceConfigBuilder`](crate::DeviceConfigBuilder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    /// Boot ROM (AVPBooter).
    pub rom_path: PathBuf,
    /// Disk image, attached only if it exists.
    pub disk_path: PathBuf,
    /// NVRAM storage, recreated on every build.
    pub nvram_path: PathBuf,
    /// Requested vCPUs, raised to the host minimum.
    pub cpu_count: usize,
    /// Requested memory in bytes, raised to the host minimum.
    pub memory_size: u64,
    /// Skip the Secure Enclave coprocessor.
    pub skip_sep: bool,
    /// SEP storage (default: next to NVRAM).
    pub sep_storage_path: Option<PathBuf>,
    /// SEP ROM binary.
    pub sep_rom_path: Option<PathBuf>,
    /// File receiving a copy of the serial console.
    pub serial_log_path: Option<PathBuf>,
    /// Stop the guest when it panics.
    pub stop_on_panic: bool,
    /// Stop the guest on a fatal error.
    pub stop_on_fatal_error: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            rom_path: PathBuf::new(),
            disk_path: PathBuf::new(),
            nvram_path: PathBuf::from(DEFAULT_NVRAM_PATH),
            cpu_count: DEFAULT_CPU_COUNT,
            memory_size: DEFAULT_MEMORY_SIZE,
            skip_sep: true,
            sep_storage_path: None,
            sep_rom_path: None,
            serial_log_path: None,
            stop_on_panic: false,
            stop_on_fatal_error: false,
        }
    }
}

impl Options {
    /// Create a new options builder.
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        if self.rom_path.as_os_str().is_empty() {
            return Err(VmError::InvalidOptions("rom_path is required".into()));
        }
        if self.nvram_path.as_os_str().is_empty() {
            return Err(VmError::InvalidOptions("nvram_path is required".into()));
        }
        Ok(())
    }

    /// Directory holding NVRAM and its sidecar files.
    pub fn state_dir(&self) -> &Path {
        self.nvram_path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Sidecar file holding the persisted machine identity.
    pub fn machine_identifier_path(&self) -> PathBuf {
        self.state_dir().join(MACHINE_IDENTIFIER_FILE)
    }

    /// SEP storage path, explicit or defaulted next to NVRAM.
    pub fn resolved_sep_storage_path(&self) -> PathBuf {
        self.sep_storage_path
            .clone()
            .unwrap_or_else(|| self.state_dir().join(DEFAULT_SEP_STORAGE_FILE))
    }
}

/// Builder for [`Options`].
#[derive(Debug, Default)]
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    /// Set the boot ROM path.
    pub fn rom(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.rom_path = path.into();
        self
    }

    /// Set the disk image path.
    pub fn disk(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.disk_path = path.into();
        self
    }

    /// Set the NVRAM storage path.
    pub fn nvram(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.nvram_path = path.into();
        self
    }

    /// Set the vCPU count.
    pub fn cpu_count(mut self, count: usize) -> Self {
        self.options.cpu_count = count;
        self
    }

    /// Set memory in bytes.
    pub fn memory_size(mut self, bytes: u64) -> Self {
        self.options.memory_size = bytes;
        self
    }

    /// Set memory in MiB.
    pub fn memory_mib(mut self, mib: u64) -> Self {
        self.options.memory_size = mib.saturating_mul(MIB);
        self
    }

    /// Skip (or attach) the SEP coprocessor.
    pub fn skip_sep(mut self, skip: bool) -> Self {
        self.options.skip_sep = skip;
        self
    }

    /// Set the SEP storage path.
    pub fn sep_storage(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.sep_storage_path = Some(path.into());
        self
    }

    /// Set the SEP ROM path.
    pub fn sep_rom(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.sep_rom_path = Some(path.into());
        self
    }

    /// Copy the serial console to a file.
    pub fn serial_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.serial_log_path = Some(path.into());
        self
    }

    pub fn stop_on_panic(mut self, stop: bool) -> Self {
        self.options.stop_on_panic = stop;
        self
    }

    pub fn stop_on_fatal_error(mut self, stop: bool) -> Self {
        self.options.stop_on_fatal_error = stop;
        self
    }

    /// Build the options, validating required fields.
    pub fn build(self) -> Result<Options> {
        self.options.validate()?;
        Ok(self.options)
    }
}
