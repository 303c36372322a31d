//! GuestSession - a constructed guest and its lifecycle.

use crate::builder::VmConfiguration;
use crate::console::ConsoleSink;
use crate::error::{HostError, Result, VmError};
use crate::host::{GuestMachine, Host, HostEvent, StartOptions};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;
use vphone_touch::{MultiTouchDevice, TouchTarget};

/// Lifecycle state of a session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Guest constructed, not started
    Created,
    /// Waiting for the hypervisor to acknowledge boot
    Starting,
    /// Guest is running
    Running,
    /// Guest stopped, cleanly or with an error
    Stopped,
    /// Boot initiation failed
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Created => write!(f, "created"),
            SessionState::Starting => write!(f, "starting"),
            SessionState::Running => write!(f, "running"),
            SessionState::Stopped => write!(f, "stopped"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// How a guest stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The guest shut itself down.
    Clean,
    /// The guest was stopped by an error.
    Error(HostError),
}

impl StopReason {
    pub fn error(&self) -> Option<&HostError> {
        match self {
            StopReason::Clean => None,
            StopReason::Error(e) => Some(e),
        }
    }
}

type StopCallback = Box<dyn FnOnce(&StopReason) + Send>;

/// A guest built from one [`VmConfiguration`].
///
/// Host events are queued by the hypervisor and only acted upon from
/// [`dispatch_next`](Self::dispatch_next) / [`run_until_stopped`](Self::run_until_stopped),
/// so the stop callback runs on whichever task drives the session and never
/// concurrently with itself or with pointer handling done on that task.
///
/// A stopped session cannot be restarted; build a new configuration and
/// session instead.
pub struct GuestSession {
    id: Uuid,
    machine: Arc<dyn GuestMachine>,
    events: mpsc::UnboundedReceiver<HostEvent>,
    state: SessionState,
    console: Option<ConsoleSink>,
    on_stop: Option<StopCallback>,
    stop_reason: Option<StopReason>,
}

impl GuestSession {
    /// Construct the guest. Consumes the configuration.
    ///
    /// The serial log, if configured, is created or truncated here. A log
    /// that cannot be opened only disables capture.
    pub fn create(host: &dyn Host, config: VmConfiguration) -> Result<Self> {
        let id = Uuid::new_v4();
        let handle = host
            .create_machine(&config)
            .map_err(|e| VmError::Create(e.to_string()))?;

        let console = config.serial_log_path().and_then(|path| {
            match ConsoleSink::create(path) {
                Ok(sink) => {
                    tracing::debug!(session_id = %id, path = %path.display(), "Serial log opened");
                    Some(sink)
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %id,
                        path = %path.display(),
                        error = %e,
                        "Cannot open serial log, capture disabled"
                    );
                    None
                }
            }
        });

        tracing::info!(
            session_id = %id,
            cpu_count = config.cpu_count(),
            memory_size = config.memory_size(),
            ecid = %config.platform().machine_identity,
            "Guest created"
        );

        Ok(Self {
            id,
            machine: handle.machine,
            events: handle.events,
            state: SessionState::Created,
            console,
            on_stop: None,
            stop_reason: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Underlying machine handle.
    pub fn machine(&self) -> Arc<dyn GuestMachine> {
        self.machine.clone()
    }

    /// Whether the serial-log file is still open.
    pub fn is_console_open(&self) -> bool {
        self.console.is_some()
    }

    /// Reason the guest stopped, once it has.
    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stop_reason.as_ref()
    }

    /// Register the stop callback, replacing any previous one.
    ///
    /// It runs exactly once, for either a clean or an error stop.
    pub fn on_stop<F>(&mut self, callback: F)
    where
        F: FnOnce(&StopReason) + Send + 'static,
    {
        self.on_stop = Some(Box::new(callback));
    }

    /// Boot the guest.
    ///
    /// Returns once the hypervisor has acknowledged boot initiation. The
    /// iBoot stage halts are always disabled.
    ///
    /// # Errors
    /// Returns [`VmError::InvalidState`] unless the session is freshly
    /// created, and [`VmError::StartFailed`] if the hypervisor refuses.
    pub async fn start(
        &mut self,
        force_dfu: bool,
        stop_on_panic: bool,
        stop_on_fatal_error: bool,
    ) -> Result<()> {
        if self.state != SessionState::Created {
            return Err(VmError::InvalidState {
                expected: SessionState::Created.to_string(),
                actual: self.state.to_string(),
            });
        }

        let options = StartOptions {
            force_dfu,
            stop_in_iboot_stage1: false,
            stop_in_iboot_stage2: false,
            stop_on_panic,
            stop_on_fatal_error,
        };

        self.state = SessionState::Starting;
        tracing::info!(session_id = %self.id, dfu = force_dfu, "Starting VM");

        if let Err(e) = self.machine.start(options).await {
            tracing::error!(session_id = %self.id, error = %e, "VM start failed");
            self.state = SessionState::Failed;
            self.close_console();
            return Err(VmError::StartFailed(e.to_string()));
        }

        self.state = SessionState::Running;
        if force_dfu {
            tracing::info!(session_id = %self.id, "VM started in DFU mode, connect with irecovery");
        } else {
            tracing::info!(session_id = %self.id, "VM started, booting normally");
        }
        Ok(())
    }

    /// Ask the hypervisor to stop the guest.
    pub async fn request_stop(&self) -> Result<()> {
        if self.state != SessionState::Running {
            return Err(VmError::InvalidState {
                expected: SessionState::Running.to_string(),
                actual: self.state.to_string(),
            });
        }
        tracing::info!(session_id = %self.id, "Requesting guest stop");
        self.machine
            .request_stop()
            .await
            .map_err(|e| VmError::Stop(e.to_string()))
    }

    /// Wait for and handle the next host event.
    ///
    /// Returns `Some` with the stop reason once the guest has stopped (on
    /// this call or an earlier one), `None` if the event did not stop it.
    ///
    /// # Errors
    /// Returns [`VmError::InvalidState`] if the guest was never started.
    pub async fn dispatch_next(&mut self) -> Result<Option<StopReason>> {
        match self.state {
            SessionState::Stopped => return Ok(self.stop_reason.clone()),
            SessionState::Created | SessionState::Failed => {
                return Err(VmError::InvalidState {
                    expected: SessionState::Running.to_string(),
                    actual: self.state.to_string(),
                });
            }
            SessionState::Starting | SessionState::Running => {}
        }

        let event = self.events.recv().await;
        Ok(self.handle_event(event))
    }

    /// Handle host events until the guest stops.
    pub async fn run_until_stopped(&mut self) -> Result<StopReason> {
        loop {
            if let Some(reason) = self.dispatch_next().await? {
                return Ok(reason);
            }
        }
    }

    fn handle_event(&mut self, event: Option<HostEvent>) -> Option<StopReason> {
        match event {
            Some(HostEvent::GuestStopped) => {
                tracing::info!(session_id = %self.id, "Guest stopped");
                Some(self.finish(StopReason::Clean))
            }
            Some(HostEvent::StoppedWithError(e)) => {
                tracing::error!(session_id = %self.id, error = %e, "Stopped with error");
                Some(self.finish(StopReason::Error(e)))
            }
            Some(HostEvent::NetworkDisconnected(e)) => {
                tracing::warn!(session_id = %self.id, error = %e, "Network error");
                None
            }
            Some(HostEvent::SerialOutput(bytes)) => {
                self.capture_console(&bytes);
                None
            }
            None => {
                let e = HostError::new("host event stream closed");
                tracing::error!(session_id = %self.id, error = %e, "Stopped with error");
                Some(self.finish(StopReason::Error(e)))
            }
        }
    }

    fn capture_console(&mut self, bytes: &[u8]) {
        let Some(console) = self.console.as_mut() else {
            return;
        };
        if let Err(e) = console.write(bytes) {
            tracing::warn!(
                path = %console.path().display(),
                error = %e,
                "Serial log write failed, capture stopped"
            );
            self.close_console();
        }
    }

    fn finish(&mut self, reason: StopReason) -> StopReason {
        self.state = SessionState::Stopped;
        self.close_console();
        self.stop_reason = Some(reason.clone());

        if let Some(callback) = self.on_stop.take() {
            callback(&reason);
        }
        reason
    }

    fn close_console(&mut self) {
        if let Some(console) = self.console.take() {
            let path = console.path().to_path_buf();
            let bytes = console.bytes_written();
            match console.close() {
                Ok(()) => tracing::debug!(path = %path.display(), bytes, "Serial log closed"),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Serial log close failed"),
            }
        }
    }
}

impl TouchTarget for GuestSession {
    fn multi_touch_devices(&self) -> Vec<Arc<dyn MultiTouchDevice>> {
        self.machine.multi_touch_devices()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DeviceConfigBuilder;
    use crate::options::Options;
    use crate::sim::SimulatedHost;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scratch() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vphone-session-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("rom.bin"), b"rom").unwrap();
        dir
    }

    fn session(host: &SimulatedHost) -> GuestSession {
        let dir = scratch();
        let options = Options::builder()
            .rom(dir.join("rom.bin"))
            .nvram(dir.join("nvram.bin"))
            .serial_log(dir.join("serial.log"))
            .build()
            .unwrap();
        let config = DeviceConfigBuilder::new(host).build(&options).unwrap();
        GuestSession::create(host, config).unwrap()
    }

    #[test]
    fn test_create_truncates_serial_log() {
        let dir = scratch();
        let log = dir.join("serial.log");
        std::fs::write(&log, b"previous boot").unwrap();
        let host = SimulatedHost::new();
        let options = Options::builder()
            .rom(dir.join("rom.bin"))
            .nvram(dir.join("nvram.bin"))
            .serial_log(&log)
            .build()
            .unwrap();
        let config = DeviceConfigBuilder::new(&host).build(&options).unwrap();
        assert_eq!(std::fs::read(&log).unwrap(), b"previous boot");

        let session = GuestSession::create(&host, config).unwrap();
        assert!(session.is_console_open());
        assert!(std::fs::read(&log).unwrap().is_empty());
    }

    #[test]
    fn test_unopenable_serial_log_is_not_fatal() {
        let dir = scratch();
        let host = SimulatedHost::new();
        let options = Options::builder()
            .rom(dir.join("rom.bin"))
            .nvram(dir.join("nvram.bin"))
            .serial_log(dir.join("no-such-dir").join("serial.log"))
            .build()
            .unwrap();
        let config = DeviceConfigBuilder::new(&host).build(&options).unwrap();

        let session = GuestSession::create(&host, config).unwrap();
        assert!(!session.is_console_open());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Created.to_string(), "created");
        assert_eq!(SessionState::Failed.to_string(), "failed");
    }

    #[test]
    fn test_start_passes_flags() {
        let host = SimulatedHost::new();
        let mut session = session(&host);

        tokio_test::block_on(session.start(true, true, false)).unwrap();

        let options = host.last_machine().unwrap().start_options().unwrap();
        assert!(options.force_dfu);
        assert!(!options.stop_in_iboot_stage1);
        assert!(!options.stop_in_iboot_stage2);
        assert!(options.stop_on_panic);
        assert!(!options.stop_on_fatal_error);
        assert_eq!(session.state(), SessionState::Running);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let host = SimulatedHost::new();
        let mut session = session(&host);

        session.start(false, false, false).await.unwrap();
        let result = session.start(false, false, false).await;
        assert!(matches!(result, Err(VmError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_start_failure() {
        let host = SimulatedHost::new().with_start_error("boot ROM rejected");
        let mut session = session(&host);

        assert!(session.is_console_open());
        let result = session.start(false, false, false).await;
        assert!(matches!(result, Err(VmError::StartFailed(_))));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(!session.is_console_open());
        assert!(matches!(
            session.dispatch_next().await,
            Err(VmError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_dispatch_before_start_is_rejected() {
        let host = SimulatedHost::new();
        let mut session = session(&host);
        assert!(session.dispatch_next().await.is_err());
    }

    #[tokio::test]
    async fn test_network_disconnect_is_not_terminal() {
        let host = SimulatedHost::new();
        let mut session = session(&host);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        session.on_stop(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        session.start(false, false, false).await.unwrap();
        host.last_machine()
            .unwrap()
            .disconnect_network("NAT attachment lost");

        assert_eq!(session.dispatch_next().await.unwrap(), None);
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_closed_event_stream_is_error_stop() {
        let host = SimulatedHost::new();
        let mut session = session(&host);
        session.start(false, false, false).await.unwrap();

        host.last_machine().unwrap().hang_up();
        let reason = session.run_until_stopped().await.unwrap();
        assert!(reason.error().is_some());
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_request_stop_reports_clean_stop() {
        let host = SimulatedHost::new();
        let mut session = session(&host);
        session.start(false, false, false).await.unwrap();

        session.request_stop().await.unwrap();
        assert_eq!(
            session.run_until_stopped().await.unwrap(),
            StopReason::Clean
        );
        assert!(session.request_stop().await.is_err());
    }
}
