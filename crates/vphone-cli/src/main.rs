//! vphone entry point.
//!
//! Parses options, assembles and validates the guest configuration, boots the
//! guest and handles host events until it stops. Logs go to stderr; stdout is
//! left for the guest console and `--dry-run` output.
//!
//! The guest runs on the in-process simulated host; Ctrl-C asks it to stop.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vphone_touch::{ViewStrategy, WINDOW_CONTENT_SIZE};
use vphone_vm::{
    DeviceConfigBuilder, GuestSession, Host, HostCapabilities, Options, SimulatedHost,
    StopReason, DEFAULT_CPU_COUNT, DEFAULT_NVRAM_PATH,
};

/// Boot a virtual iPhone research guest
#[derive(Parser, Debug)]
#[command(name = "vphone", version, about = "Boot a virtual iPhone research guest")]
struct Args {
    /// Path to the AVPBooter ROM
    #[arg(long, env = "VPHONE_ROM")]
    rom: PathBuf,

    /// Path to the disk image
    #[arg(long, env = "VPHONE_DISK")]
    disk: PathBuf,

    /// Path to the NVRAM storage, overwritten on every run
    #[arg(long, env = "VPHONE_NVRAM", default_value = DEFAULT_NVRAM_PATH)]
    nvram: PathBuf,

    /// Number of CPU cores
    #[arg(long, env = "VPHONE_CPU", default_value_t = DEFAULT_CPU_COUNT)]
    cpu: usize,

    /// Memory size in MB
    #[arg(long, env = "VPHONE_MEMORY", default_value_t = 4096)]
    memory: u64,

    /// Path to write the serial console log
    #[arg(long, env = "VPHONE_SERIAL_LOG")]
    serial_log: Option<PathBuf>,

    /// Stop the guest on a kernel panic
    #[arg(long, env = "VPHONE_STOP_ON_PANIC")]
    stop_on_panic: bool,

    /// Stop the guest on a fatal error
    #[arg(long, env = "VPHONE_STOP_ON_FATAL_ERROR")]
    stop_on_fatal_error: bool,

    /// Do not attach the SEP coprocessor
    #[arg(long, env = "VPHONE_SKIP_SEP")]
    skip_sep: bool,

    /// Path to the SEP storage file
    #[arg(long, env = "VPHONE_SEP_STORAGE")]
    sep_storage: Option<PathBuf>,

    /// Path to the SEP ROM
    #[arg(long, env = "VPHONE_SEP_ROM")]
    sep_rom: Option<PathBuf>,

    /// Boot into DFU mode
    #[arg(long, env = "VPHONE_DFU")]
    dfu: bool,

    /// Run without a display window
    #[arg(long, env = "VPHONE_NO_GRAPHICS")]
    no_graphics: bool,

    /// Print the validated configuration as JSON and exit
    #[arg(long, env = "VPHONE_DRY_RUN")]
    dry_run: bool,
}

impl Args {
    fn options(&self) -> vphone_vm::Result<Options> {
        let mut builder = Options::builder()
            .rom(&self.rom)
            .disk(&self.disk)
            .nvram(&self.nvram)
            .cpu_count(self.cpu)
            .memory_mib(self.memory)
            .skip_sep(self.skip_sep)
            .stop_on_panic(self.stop_on_panic)
            .stop_on_fatal_error(self.stop_on_fatal_error);

        if let Some(path) = &self.serial_log {
            builder = builder.serial_log(path);
        }
        if let Some(path) = &self.sep_storage {
            builder = builder.sep_storage(path);
        }
        if let Some(path) = &self.sep_rom {
            builder = builder.sep_rom(path);
        }
        builder.build()
    }

    /// How the display window would route pointer input, `None` when headless.
    fn view_strategy(&self, capabilities: &HostCapabilities) -> Option<ViewStrategy> {
        (!self.no_graphics).then(|| capabilities.view_strategy())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_tracing() {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let args = Args::parse();

    match run(args).await {
        Ok(StopReason::Clean) => ExitCode::SUCCESS,
        Ok(StopReason::Error(_)) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Fatal error");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("vphone=info".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<StopReason> {
    let options = args.options().context("invalid options")?;
    tracing::info!(
        rom = %options.rom_path.display(),
        disk = %options.disk_path.display(),
        cpu_count = options.cpu_count,
        memory_size = options.memory_size,
        skip_sep = options.skip_sep,
        "Options loaded"
    );

    let host = SimulatedHost::new();
    let config = DeviceConfigBuilder::new(&host)
        .build(&options)
        .context("failed to build guest configuration")?;

    if args.dry_run {
        println!("{}", config.to_json()?);
        return Ok(StopReason::Clean);
    }

    let mut session = GuestSession::create(&host, config)?;
    session.on_stop(|reason| match reason {
        StopReason::Clean => tracing::info!("Guest stopped"),
        StopReason::Error(e) => tracing::error!(error = %e, "Guest stopped with error"),
    });

    session
        .start(args.dfu, options.stop_on_panic, options.stop_on_fatal_error)
        .await?;

    match args.view_strategy(&host.capabilities()) {
        Some(strategy) => tracing::info!(
            width = WINDOW_CONTENT_SIZE.width,
            height = WINDOW_CONTENT_SIZE.height,
            %strategy,
            "Display"
        ),
        None => tracing::info!("Running headless"),
    }

    loop {
        tokio::select! {
            reason = session.dispatch_next() => {
                if let Some(reason) = reason? {
                    return Ok(reason);
                }
            }
            result = signal::ctrl_c() => {
                result.context("failed to listen for Ctrl-C")?;
                tracing::info!("Received Ctrl-C, stopping guest");
                if let Err(e) = session.request_stop().await {
                    tracing::warn!(error = %e, "Stop request failed");
                }
            }
        }
    }
}
