//! herakles-proc-monitor binary.
//!
//! Resolves configuration, then drives the refresh loop on the main task:
//! every tick runs one scheduler cycle, control commands from stdin are
//! applied between cycles, and frames are printed to stdout. With HTTP
//! enabled, the last frame is also served as Prometheus metrics.

mod cache;
mod cli;
mod commands;
mod config;
mod control;
mod handlers;
mod health_stats;
mod metrics;
mod render;
mod state;

use clap::Parser;
use herakles_proc_monitor::source::{ProcfsSource, TestDataSource};
use herakles_proc_monitor::{
    CycleOutcome, DisplayFrame, HangReporter, RefreshScheduler, SnapshotSource,
};
use std::io::{IsTerminal, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, warn};

use crate::cli::{Args, Commands, LogLevel, OutputFormat};
use crate::config::{
    resolve_config, show_config, validate_effective_config, Config, DEFAULT_BIND_ADDR,
    DEFAULT_PORT, DEFAULT_PROC_ROOT, DEFAULT_ROOT_PID,
};
use crate::control::ControlCommand;
use crate::state::{AppState, SharedState};

/// Initializes tracing logging subsystem with configured log level
fn setup_logging(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let level = config.log_level()?;
    let filter = match level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    // Frames go to stdout, logs to stderr.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Logging initialized with level: {:?}", level);
    Ok(())
}

/// Prints frames and publishes them to the HTTP cache.
struct Presenter {
    output: OutputFormat,
    clear_screen: bool,
    state: SharedState,
}

impl Presenter {
    async fn present(
        &self,
        frame: DisplayFrame,
        cycle_seconds: f64,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let text = render::render_frame(&frame, self.output)?;
        {
            let mut stdout = std::io::stdout().lock();
            if self.clear_screen {
                write!(stdout, "\x1b[2J\x1b[H")?;
            }
            writeln!(stdout, "{}", text)?;
            stdout.flush()?;
        }
        self.state.cache.write().await.publish(frame, cycle_seconds);
        Ok(())
    }

    async fn present_opt(
        &self,
        frame: Option<DisplayFrame>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match frame {
            Some(frame) => self.present(frame, 0.0).await,
            None => Ok(()),
        }
    }
}

/// Applies one control command. Returns false when the loop should stop.
async fn apply_control(
    cmd: ControlCommand,
    scheduler: &mut RefreshScheduler,
    hang_reporter: &HangReporter,
    presenter: &Presenter,
) -> Result<bool, Box<dyn std::error::Error>> {
    match cmd {
        ControlCommand::Sort(key) => presenter.present_opt(scheduler.select_sort(key)?).await?,
        ControlCommand::Open(pid) => {
            let open = scheduler.toggle_expanded(pid);
            debug!("pid {} {}", pid, if open { "expanded" } else { "collapsed" });
            presenter.present_opt(scheduler.display(true)?).await?;
        }
        ControlCommand::Hang(child_id) => {
            if !hang_reporter.report(child_id) {
                warn!("Hang report for child {} dropped", child_id);
            }
        }
        ControlCommand::Hide => {
            scheduler.set_visible(false)?;
        }
        ControlCommand::Show => presenter.present_opt(scheduler.set_visible(true)?).await?,
        ControlCommand::Touch => scheduler.note_interaction(),
        ControlCommand::Refresh => presenter.present_opt(scheduler.display(true)?).await?,
        ControlCommand::Quit => return Ok(false),
    }
    Ok(true)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

async fn start_http(
    state: SharedState,
    config: &Config,
) -> Result<tokio::task::JoinHandle<()>, Box<dyn std::error::Error>> {
    let bind_ip_str = config.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
    let port = config.port.unwrap_or(DEFAULT_PORT);
    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port).parse()?;

    let listener = TcpListener::bind(addr).await?;
    info!("Serving /metrics and /health on http://{}", addr);

    let app = handlers::router(state);
    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    }))
}

/// Runs the refresh loop until shutdown, quit or the iteration limit.
async fn run<S: SnapshotSource>(
    mut source: S,
    config: Config,
    iterations: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let monitor_config = config.to_monitor_config()?;
    let output = config.output_format()?;
    let enable_http = config.enable_http.unwrap_or(false);

    let state: SharedState = Arc::new(AppState::new(config.clone())?);
    let server = if enable_http {
        Some(start_http(state.clone(), &config).await?)
    } else {
        None
    };

    let presenter = Presenter {
        output,
        clear_screen: output == OutputFormat::Table && std::io::stdout().is_terminal(),
        state: state.clone(),
    };

    let mut scheduler = RefreshScheduler::new(&monitor_config);
    let hang_reporter = scheduler.hang_reporter();

    let (control_tx, mut control_rx) = mpsc::channel(32);
    let reader = control::spawn_stdin_reader(control_tx);

    let mut ticker = interval(scheduler.refresh_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(
        "Refresh loop started with {:?} interval",
        scheduler.refresh_interval()
    );

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut cycles: u64 = 0;
    let result: Result<(), Box<dyn std::error::Error>> = loop {
        tokio::select! {
            _ = &mut shutdown => break Ok(()),
            _ = ticker.tick() => {
                let start = Instant::now();
                let outcome = match scheduler.update(&mut source).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("Monitor cycle failed: {}", e);
                        break Err(e.into());
                    }
                };
                let cycle_seconds = start.elapsed().as_secs_f64();
                let history_len = scheduler.history().len();

                match outcome {
                    CycleOutcome::Displayed(frame) => {
                        state.health_stats.record_cycle(frame.rows.len(), cycle_seconds, history_len);
                        if let Err(e) = presenter.present(frame, cycle_seconds).await {
                            break Err(e);
                        }
                    }
                    CycleOutcome::Hidden | CycleOutcome::Deferred => {
                        state.health_stats.record_deferred(cycle_seconds, history_len);
                        state.cache.write().await.record_cycle(true, cycle_seconds);
                    }
                    CycleOutcome::SourceUnavailable(_) => {
                        state.health_stats.record_failure();
                        state.cache.write().await.record_cycle(false, cycle_seconds);
                    }
                }

                cycles += 1;
                if iterations > 0 && cycles >= iterations {
                    info!("Completed {} cycles", cycles);
                    break Ok(());
                }
            }
            Some(cmd) = control_rx.recv() => {
                match apply_control(cmd, &mut scheduler, &hang_reporter, &presenter).await {
                    Ok(true) => {}
                    Ok(false) => break Ok(()),
                    Err(e) => {
                        error!("Control command failed: {}", e);
                        break Err(e);
                    }
                }
            }
        }
    };

    reader.abort();
    if let Some(server) = server {
        server.abort();
        let _ = server.await;
    }

    info!("herakles-proc-monitor stopped");
    result
}

/// -------------------------------------------------------------------
/// MAIN APPLICATION ENTRY POINT
/// -------------------------------------------------------------------
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format.clone());
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        return match command {
            Commands::Check => commands::command_check(&resolve_config(&args)?),
            Commands::Config {
                output,
                format,
                commented,
            } => commands::command_config(output.clone(), format.clone(), *commented),
            Commands::Types { verbose } => commands::command_types(*verbose),
            Commands::GenerateTestdata {
                output,
                web_count,
                others_count,
                max_threads,
            } => commands::command_generate_testdata(
                output.clone(),
                *web_count,
                *others_count,
                *max_threads,
            ),
        };
    }

    let config = resolve_config(&args)?;

    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    setup_logging(&config)?;

    info!(
        "Starting herakles-proc-monitor {} ({})",
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown")
    );

    match config.test_data_file.clone() {
        Some(path) => {
            info!("Using synthetic test data from {}", path.display());
            let source = TestDataSource::from_file(&path)?;
            run(source, config, args.iterations).await
        }
        None => {
            let proc_root = config
                .proc_root
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PROC_ROOT));
            let root_pid = config.root_pid.unwrap_or(DEFAULT_ROOT_PID);
            info!(
                "Monitoring process tree of pid {} under {}",
                root_pid,
                proc_root.display()
            );
            run(ProcfsSource::new(proc_root, root_pid), config, args.iterations).await
        }
    }
}
