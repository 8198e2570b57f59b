//! LessProxy - switch between direct and PAC-driven smart proxying.
//!
//! `lessproxy serve` runs the background controller and the local message
//! bus. The other subcommands are the quick panel (mode, reload, status,
//! watch) and the settings panel (settings show/set); they talk to a running
//! `serve` over HTTP.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use lessproxy_app::{render, PanelClient};
use lessproxy_core::remote::DEFAULT_REQUEST_TIMEOUT;
use lessproxy_core::status::DEFAULT_STATUS_URL;
use lessproxy_core::{
    Controller, ControllerConfig, HttpRemote, Message, ProxyBackend, ProxyMode, SettingsPatch,
};
use lessproxy_proxy::{DryRunBackend, PacSlot, SystemProxyBackend};
use lessproxy_server::{AppState, Server, ServerConfig, DEFAULT_HOST, DEFAULT_PORT};
use lessproxy_storage::Database;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How long open event streams may delay shutdown.
const SERVER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// LessProxy - switch between direct and PAC-driven smart proxying
#[derive(Parser, Debug)]
#[command(name = "lessproxy", version, about)]
struct Args {
    /// Host of the local service
    #[arg(long, global = true, default_value = DEFAULT_HOST)]
    host: String,

    /// Port of the local service
    #[arg(long, global = true, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the background controller and local API
    Serve(ServeArgs),

    /// Switch proxy mode
    Mode {
        /// direct or smart
        mode: ProxyMode,
    },

    /// Re-fetch the PAC script and enter smart mode
    Reload,

    /// Show connectivity status
    Status {
        /// Run a fresh check instead of showing the last result
        #[arg(long)]
        check: bool,
    },

    /// Print broadcasts as they happen
    Watch,

    /// Show or change settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// Settings database path (default: platform data directory)
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Serve the PAC script without changing OS proxy settings
    #[arg(long)]
    dry_run: bool,

    /// Endpoint used for connectivity checks
    #[arg(long, default_value = DEFAULT_STATUS_URL)]
    status_url: String,

    /// Leave the OS proxy configured when exiting
    #[arg(long)]
    keep_proxy_on_exit: bool,
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Print the stored settings
    Show,

    /// Change settings
    Set {
        /// PAC script URL (empty for the default)
        #[arg(long)]
        url: Option<String>,

        /// Enable or disable automatic reconnect
        #[arg(long, action = clap::ArgAction::Set)]
        auto_reconnect: Option<bool>,

        /// Minutes between automatic reloads
        #[arg(long)]
        interval: Option<u32>,

        /// Reload the PAC script after saving
        #[arg(long)]
        reload: bool,
    },
}

/// Get the logs directory path.
fn logs_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "lessproxy", "lessproxy").map(|dirs| dirs.data_dir().join("logs"))
}

/// Initialize logging. `serve` also logs to daily-rotated files.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lessproxy={},warn", log_level)));

    let console = fmt::layer().with_writer(std::io::stderr);

    if matches!(args.command, Command::Serve(_)) {
        if let Some(log_dir) = logs_dir() {
            if std::fs::create_dir_all(&log_dir).is_ok() {
                let file_appender = RollingFileAppender::builder()
                    .rotation(Rotation::DAILY)
                    .max_log_files(5)
                    .filename_prefix("lessproxy")
                    .filename_suffix("log")
                    .build(&log_dir)
                    .ok();

                if let Some(appender) = file_appender {
                    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(console)
                        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                        .init();

                    info!("Logging to {:?}", log_dir);
                    return Some(guard);
                }
            }
        }

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console)
            .init();
        warn!("File logging unavailable, using console only");
        return None;
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .init();
    None
}

async fn serve(args: &Args, opts: &ServeArgs) -> anyhow::Result<()> {
    let db = match &opts.db_path {
        Some(path) => Database::with_path(path),
        None => Database::new(),
    }
    .context("Failed to open settings database")?;

    let remote = Arc::new(
        HttpRemote::with_options(&opts.status_url, DEFAULT_REQUEST_TIMEOUT)
            .context("Failed to create HTTP client")?,
    );

    let pac_slot = PacSlot::new();
    let backend: Arc<dyn ProxyBackend> = if opts.dry_run {
        info!("Dry run: OS proxy settings will not be changed");
        Arc::new(DryRunBackend::new(pac_slot.clone()))
    } else {
        Arc::new(SystemProxyBackend::new(
            pac_slot.clone(),
            SystemProxyBackend::local_pac_url(&args.host, args.port),
        ))
    };

    let (handle, controller_task) = Controller::new(Arc::new(db), backend, remote.clone(), remote)
        .with_config(ControllerConfig {
            restore_direct_on_shutdown: !opts.keep_proxy_on_exit,
            ..Default::default()
        })
        .spawn();

    let server_config = ServerConfig::default()
        .with_host(args.host.as_str())
        .with_port(args.port);
    let server = Server::new(server_config, AppState::new(handle.clone(), pac_slot))?;

    // The OS fetches the PAC script from the server, so it starts first
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server_task = tokio::spawn(server.run_until(async {
        let _ = stop_rx.await;
    }));

    let settings = handle.boot().await.context("Failed to start controller")?;
    info!(mode = %settings.proxy_mode, "LessProxy running");

    if let Err(e) = handle.send(Message::InitializeProxy).await {
        warn!(error = %e, "Initial proxy configuration load failed");
    }

    let server_result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!("Shutdown requested");
            None
        }
        result = &mut server_task => Some(result),
    };

    if let Err(e) = handle.shutdown().await {
        error!(error = %e, "Controller shutdown failed");
    }
    controller_task.await.context("Controller task panicked")?;

    match server_result {
        Some(result) => result.context("Server task panicked")??,
        None => {
            let _ = stop_tx.send(());
            match tokio::time::timeout(SERVER_DRAIN_TIMEOUT, server_task).await {
                Ok(result) => result.context("Server task panicked")??,
                Err(_) => warn!("Timed out waiting for open connections to close"),
            }
        }
    }

    info!("LessProxy stopped");
    Ok(())
}

async fn run_panel(client: &PanelClient, command: &Command) -> anyhow::Result<()> {
    match command {
        Command::Serve(_) => bail!("serve is not a panel command"),

        Command::Mode { mode } => {
            client
                .send(&Message::ModeChange { mode: *mode })
                .await?;
            println!("{}", render::mode_line(*mode));
        }

        Command::Reload => {
            client.send(&Message::ReloadProxyConfig).await?;
            println!("Proxy configuration reloaded");
            if let Some(status) = client.status().await? {
                println!("{}", render::status(&status));
            }
        }

        Command::Status { check } => {
            let status = if *check {
                client.send(&Message::CheckProxyStatus).await?.status
            } else {
                client.status().await?
            };

            match status {
                Some(status) => println!("{}", render::status(&status)),
                None => println!("No status yet. Run `lessproxy status --check`."),
            }
        }

        Command::Watch => {
            println!("Watching {} (Ctrl+C to stop)", client.base_url());
            client
                .watch(|broadcast| println!("{}", render::broadcast(&broadcast)))
                .await?;
        }

        Command::Settings(SettingsCommand::Show) => {
            println!("{}", render::settings(&client.settings().await?));
        }

        Command::Settings(SettingsCommand::Set {
            url,
            auto_reconnect,
            interval,
            reload,
        }) => {
            let patch = SettingsPatch {
                remote_config_url: url.clone(),
                auto_reconnect: *auto_reconnect,
                reconnect_interval_minutes: *interval,
            };

            if patch.is_empty() && !reload {
                bail!("Nothing to change. Pass --url, --auto-reconnect, --interval, or --reload.");
            }

            // Validate locally for a clearer message than the HTTP error
            patch.validate()?;

            let settings = client.update_settings(&patch).await?;
            println!("Settings saved");
            println!("{}", render::settings(&settings));

            if *reload {
                client.send(&Message::UpdateProxySettings).await?;
                println!("Proxy configuration reloaded");
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Keep the guard alive for the lifetime of the app
    let _log_guard = init_logging(&args);

    if let Command::Serve(opts) = &args.command {
        return serve(&args, opts).await;
    }

    let config = ServerConfig::default()
        .with_host(args.host.as_str())
        .with_port(args.port);
    let client = PanelClient::new(config.base_url())?;

    run_panel(&client, &args.command).await
}
