//! In-process host used for tests and simulated runs.
//!
//! [`SimulatedHost`] answers capability probes from a fixed table, writes
//! NVRAM as JSON, runs the same validation a real host would for missing
//! files, and hands out [`SimulatedMachine`]s whose lifecycle events are
//! injected by the caller.

use crate::builder::VmConfiguration;
use crate::devices::{Coprocessor, StorageDevice};
use crate::error::HostError;
use crate::hardware::HardwareModel;
use crate::host::{
    AuxiliaryStorage, GuestMachine, Host, HostCapabilities, HostEvent, MachineHandle, OsVersion,
    StartOptions,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use vphone_touch::{MultiTouchDevice, MultiTouchFrame, TouchTarget};

const MIB: u64 = 1024 * 1024;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Configurable stand-in for a hypervisor host.
pub struct SimulatedHost {
    capabilities: HostCapabilities,
    supported: bool,
    min_cpu_count: usize,
    min_memory_size: u64,
    validation_error: Option<String>,
    start_error: Option<String>,
    reject_nvram_writes: bool,
    machines: Mutex<Vec<Arc<SimulatedMachine>>>,
}

impl Default for SimulatedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedHost {
    /// A host on macOS 15 offering every device model.
    pub fn new() -> Self {
        Self {
            capabilities: HostCapabilities::full(OsVersion::new(15, 0)),
            supported: true,
            min_cpu_count: 1,
            min_memory_size: 128 * MIB,
            validation_error: None,
            start_error: None,
            reject_nvram_writes: false,
            machines: Mutex::new(Vec::new()),
        }
    }

    pub fn with_capabilities(mut self, capabilities: HostCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Report the hardware model as unsupported.
    pub fn unsupported(mut self) -> Self {
        self.supported = false;
        self
    }

    pub fn with_minimums(mut self, cpu_count: usize, memory_size: u64) -> Self {
        self.min_cpu_count = cpu_count;
        self.min_memory_size = memory_size;
        self
    }

    /// Fail host-side validation with `message`.
    pub fn with_validation_error(mut self, message: impl Into<String>) -> Self {
        self.validation_error = Some(message.into());
        self
    }

    /// Make every machine's `start` fail with `message`.
    pub fn with_start_error(mut self, message: impl Into<String>) -> Self {
        self.start_error = Some(message.into());
        self
    }

    /// Refuse NVRAM variable writes.
    pub fn rejecting_nvram_writes(mut self) -> Self {
        self.reject_nvram_writes = true;
        self
    }

    /// Most recently created machine.
    pub fn last_machine(&self) -> Option<Arc<SimulatedMachine>> {
        lock(&self.machines).last().cloned()
    }

    pub fn machine_count(&self) -> usize {
        lock(&self.machines).len()
    }
}

impl Host for SimulatedHost {
    fn capabilities(&self) -> HostCapabilities {
        self.capabilities
    }

    fn is_supported(&self, _model: &HardwareModel) -> bool {
        self.supported
    }

    fn minimum_cpu_count(&self) -> usize {
        self.min_cpu_count
    }

    fn minimum_memory_size(&self) -> u64 {
        self.min_memory_size
    }

    fn create_auxiliary_storage(
        &self,
        path: &Path,
        model: &HardwareModel,
    ) -> Result<Box<dyn AuxiliaryStorage>, HostError> {
        let nvram = SimulatedNvram::create(path, *model, self.reject_nvram_writes)?;
        Ok(Box::new(nvram))
    }

    fn validate(&self, config: &VmConfiguration) -> Result<(), HostError> {
        if let Some(message) = &self.validation_error {
            return Err(HostError::new(message.clone()));
        }

        let rom = &config.boot_loader().rom_path;
        if !rom.exists() {
            return Err(HostError::new(format!(
                "boot ROM {} does not exist",
                rom.display()
            )));
        }
        for device in config.storage_devices() {
            let StorageDevice::VirtioBlock { path, .. } = device;
            if !path.exists() {
                return Err(HostError::new(format!(
                    "disk image {} does not exist",
                    path.display()
                )));
            }
        }
        for coprocessor in config.coprocessors() {
            let Coprocessor::SecureEnclave { rom_path, .. } = coprocessor;
            if let Some(rom) = rom_path {
                if !rom.exists() {
                    return Err(HostError::new(format!(
                        "SEP ROM {} does not exist",
                        rom.display()
                    )));
                }
            }
        }
        Ok(())
    }

    fn create_machine(&self, config: &VmConfiguration) -> Result<MachineHandle, HostError> {
        let (tx, events) = mpsc::unbounded_channel();
        let touch_devices = config
            .touch_screens()
            .iter()
            .map(|_| Arc::new(RecordingTouchDevice::default()))
            .collect();

        let machine = Arc::new(SimulatedMachine {
            events: Mutex::new(Some(tx)),
            start_error: self.start_error.clone().map(HostError::new),
            start_options: Mutex::new(None),
            touch_devices,
            running: AtomicBool::new(false),
        });
        lock(&self.machines).push(machine.clone());

        Ok(MachineHandle { machine, events })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct NvramDocument {
    hardware_model: HardwareModel,
    variables: BTreeMap<String, String>,
}

/// NVRAM stored as a JSON document.
struct SimulatedNvram {
    path: PathBuf,
    document: NvramDocument,
    reject_writes: bool,
}

impl SimulatedNvram {
    fn create(path: &Path, model: HardwareModel, reject_writes: bool) -> Result<Self, HostError> {
        let nvram = Self {
            path: path.to_path_buf(),
            document: NvramDocument {
                hardware_model: model,
                variables: BTreeMap::new(),
            },
            reject_writes,
        };
        nvram.flush()?;
        Ok(nvram)
    }

    fn flush(&self) -> Result<(), HostError> {
        let data = serde_json::to_vec_pretty(&self.document)
            .map_err(|e| HostError::new(format!("failed to encode NVRAM: {e}")))?;
        std::fs::write(&self.path, data).map_err(|e| {
            HostError::new(format!(
                "failed to write NVRAM {}: {e}",
                self.path.display()
            ))
        })
    }
}

impl AuxiliaryStorage for SimulatedNvram {
    fn path(&self) -> &Path {
        &self.path
    }

    fn set_variable(&mut self, name: &str, value: &[u8]) -> Result<(), HostError> {
        if self.reject_writes {
            return Err(HostError::new(format!("NVRAM variable {name} is read-only")));
        }
        self.document
            .variables
            .insert(name.to_string(), String::from_utf8_lossy(value).into_owned());
        self.flush()
    }
}

/// Read back the variables of an NVRAM file written by [`SimulatedHost`].
pub fn read_nvram_variables(path: &Path) -> std::io::Result<BTreeMap<String, String>> {
    let data = std::fs::read(path)?;
    let document: NvramDocument = serde_json::from_slice(&data)?;
    Ok(document.variables)
}

/// Guest created by [`SimulatedHost`].
pub struct SimulatedMachine {
    events: Mutex<Option<mpsc::UnboundedSender<HostEvent>>>,
    start_error: Option<HostError>,
    start_options: Mutex<Option<StartOptions>>,
    touch_devices: Vec<Arc<RecordingTouchDevice>>,
    running: AtomicBool,
}

impl SimulatedMachine {
    /// Deliver an event as the hypervisor would, from outside the session.
    pub fn emit(&self, event: HostEvent) {
        if let Some(tx) = lock(&self.events).as_ref() {
            if tx.send(event).is_err() {
                tracing::debug!("Session gone, dropping host event");
            }
        }
    }

    /// The guest shuts down cleanly.
    pub fn stop_guest(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.emit(HostEvent::GuestStopped);
    }

    /// The guest is stopped by an error.
    pub fn fail_guest(&self, message: impl Into<String>) {
        self.running.store(false, Ordering::SeqCst);
        self.emit(HostEvent::StoppedWithError(HostError::new(message)));
    }

    pub fn disconnect_network(&self, message: impl Into<String>) {
        self.emit(HostEvent::NetworkDisconnected(HostError::new(message)));
    }

    pub fn serial_output(&self, bytes: impl Into<Vec<u8>>) {
        self.emit(HostEvent::SerialOutput(bytes.into()));
    }

    /// Close the event stream without reporting a stop.
    pub fn hang_up(&self) {
        lock(&self.events).take();
    }

    /// Options passed to the last `start` call.
    pub fn start_options(&self) -> Option<StartOptions> {
        *lock(&self.start_options)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Touch device backing the first configured touch screen.
    pub fn touch_device(&self) -> Option<Arc<RecordingTouchDevice>> {
        self.touch_devices.first().cloned()
    }
}

#[async_trait]
impl GuestMachine for SimulatedMachine {
    async fn start(&self, options: StartOptions) -> Result<(), HostError> {
        *lock(&self.start_options) = Some(options);
        if let Some(e) = &self.start_error {
            return Err(e.clone());
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn request_stop(&self) -> Result<(), HostError> {
        if !self.is_running() {
            return Err(HostError::new("guest is not running"));
        }
        self.stop_guest();
        Ok(())
    }
}

impl TouchTarget for SimulatedMachine {
    fn multi_touch_devices(&self) -> Vec<Arc<dyn MultiTouchDevice>> {
        if !self.is_running() {
            return Vec::new();
        }
        self.touch_devices
            .iter()
            .map(|d| d.clone() as Arc<dyn MultiTouchDevice>)
            .collect()
    }
}

/// Touch device that keeps every frame it receives.
#[derive(Debug, Default)]
pub struct RecordingTouchDevice {
    frames: Mutex<Vec<MultiTouchFrame>>,
}

impl RecordingTouchDevice {
    pub fn frames(&self) -> Vec<MultiTouchFrame> {
        lock(&self.frames).clone()
    }
}

impl MultiTouchDevice for RecordingTouchDevice {
    fn send_multi_touch_events(&self, frames: &[MultiTouchFrame]) {
        lock(&self.frames).extend_from_slice(frames);
    }
}
