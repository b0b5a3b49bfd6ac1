//! runonce - run one command in an ephemeral container
//!
//! ## Usage
//!
//! ```sh
//! runonce info <endpoint-id> [--config settings.json]
//! runonce run --host tcp://edge:2375 --image alpine:3.19 -- uname -a
//! runonce pull --host local alpine:3.19
//! ```
//!
//! Results go to stdout, logs go to stderr. `RUNONCE_LOG` takes a `tracing`
//! filter directive and overrides `-v`.
//!
//! ## Exit Codes
//!
//! - `0`: success
//! - `1`: the task or pull failed. A task's captured output is still printed.
//! - `2`: bad input or settings

use clap::{Args, Parser, Subcommand};
use runonce::{
    EndpointId, Error, RuntimeConnection, Settings, TargetHost, TaskRequest, CONFIG_PATH_ENV,
    LOG_FILTER_ENV,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

// =============================================================================
// CLI Parsing
// =============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "runonce",
    version,
    about = "Run one command in an ephemeral container"
)]
struct Cli {
    /// Settings file (runner timeouts and endpoints).
    #[arg(long, global = true, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Override the image pull timeout, in seconds.
    #[arg(long, global = true)]
    pull_timeout: Option<u64>,

    /// Override the container wait timeout, in seconds.
    #[arg(long, global = true)]
    wait_timeout: Option<u64>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the AMT info diagnostic on a registered endpoint.
    Info {
        /// Endpoint identifier from the settings file.
        endpoint: u32,
    },
    /// Run an arbitrary command in an ephemeral container.
    Run(RunArgs),
    /// Pull an image and wait for the pull to finish.
    Pull {
        #[arg(long, default_value = "local")]
        host: TargetHost,
        image: String,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Engine address: local, unix:///path or tcp://host:port.
    #[arg(long, default_value = "local")]
    host: TargetHost,

    #[arg(long)]
    image: String,

    /// Container name (defaults to a unique runonce-* name).
    #[arg(long)]
    name: Option<String>,

    /// Extra environment entries, KEY=VALUE.
    #[arg(short, long = "env")]
    env: Vec<String>,

    /// Fail if the command exits nonzero.
    #[arg(long)]
    fail_on_nonzero_exit: bool,

    /// Skip the pull and use the image already on the host.
    #[arg(long)]
    no_pull: bool,

    /// Command and arguments passed to the image.
    #[arg(last = true)]
    command: Vec<String>,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    match run(cli, &cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(output) = err.task_output() {
                report_output(output, err.cleanup_warning());
            }
            error!(error = %err, "runonce failed");
            eprintln!("error: {}", err);
            if err.is_usage_error() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Writes task output to stdout and surfaces a cleanup failure on stderr.
fn report_output(output: &str, cleanup_warning: Option<&str>) {
    print!("{}", output);
    if let Some(warning) = cleanup_warning {
        warn!(warning = %warning, "Container cleanup failed");
    }
}

fn load_settings(cli: &Cli) -> Result<Settings, Error> {
    let mut settings = match &cli.config {
        Some(path) => {
            debug!(path = %path.display(), "Loading settings");
            Settings::load(path)?
        }
        None => Settings::default(),
    };

    if let Some(secs) = cli.pull_timeout {
        settings.runner.pull_timeout_secs = secs;
    }
    if let Some(secs) = cli.wait_timeout {
        settings.runner.wait_timeout_secs = secs;
    }
    settings.runner.validate()?;
    Ok(settings)
}

async fn run(cli: Cli, cancel: &CancellationToken) -> Result<(), Error> {
    let mut settings = load_settings(&cli)?;

    match cli.command {
        Command::Info { endpoint } => {
            let info = runonce::host_info(EndpointId(endpoint), &settings, cancel).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Run(args) => {
            if args.command.is_empty() {
                return Err(Error::Config("no command given after --".to_string()));
            }
            settings.runner.fail_on_nonzero_exit |= args.fail_on_nonzero_exit;

            let name = args.name.unwrap_or_else(|| {
                format!(
                    "runonce-{}-{}",
                    std::process::id(),
                    chrono::Utc::now().timestamp_millis()
                )
            });
            let request = TaskRequest::new(args.image, name, args.command).with_env(args.env);

            let result = if args.no_pull {
                let connection = RuntimeConnection::open(&args.host)?;
                runonce::run_task(connection.runtime(), &request, &settings.runner, cancel).await?
            } else {
                runonce::execute_on(&args.host, &request, &settings.runner, cancel).await?
            };

            report_output(&result.output, result.cleanup_warning.as_deref());
            debug!(
                exit_status = ?result.exit_status,
                duration_ms = result.duration().num_milliseconds(),
                "Task finished"
            );
        }
        Command::Pull { host, image } => {
            let connection = RuntimeConnection::open(&host)?;
            let summary = runonce::ensure_image(
                connection.runtime().as_ref(),
                &image,
                settings.runner.pull_timeout(),
                cancel,
            )
            .await?;
            println!(
                "{} {}",
                summary.reference,
                summary.last_status.as_deref().unwrap_or("pulled")
            );
        }
    }

    Ok(())
}
