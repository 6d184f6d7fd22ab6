use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use knmi_notify::{
    ConnectionState, CredentialError, DatasetName, KnownDataset, NotificationConfig,
    NotificationService, RetryPolicy,
};

pub mod printer;

use printer::{printer, OutputFormat};

const CONSUMER_ID: &str = "knmi-notify-cli";

/// KNMI notification listener
///
/// Streams file notifications for KNMI data platform datasets, or checks a
/// token against the notification broker.
#[derive(Parser, Debug)]
#[command(name = "knmi-notify")]
#[command(about = "Listen for KNMI data platform file notifications")]
#[command(version)]
pub struct Args {
    /// Notification service bearer token (or KNMI_MQTT_TOKEN)
    #[arg(long)]
    pub token: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Delay before the first reconnect attempt in seconds
    #[arg(long, default_value = "30")]
    pub retry_initial_secs: u64,

    /// Upper bound for the reconnect delay in seconds
    #[arg(long, default_value = "900")]
    pub retry_max_secs: u64,

    /// Wait the initial delay after every failure instead of backing off
    #[arg(long)]
    pub fixed_retry: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print notifications until interrupted
    Listen {
        /// Dataset to print (repeatable); defaults to every subscribed dataset
        #[arg(short, long)]
        dataset: Vec<String>,

        /// Print each notification as a JSON line
        #[arg(long)]
        json: bool,
    },
    /// Check the token and exit: 0 valid, 2 rejected, 1 undetermined
    Validate,
}

impl Args {
    /// Validate command line arguments
    pub fn validate(&self) -> Result<()> {
        match self.token.as_deref() {
            None | Some("") => {
                return Err(anyhow::anyhow!(
                    "No token given; pass --token or set KNMI_MQTT_TOKEN"
                ))
            }
            Some(_) => {}
        }

        match self.log_level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(anyhow::anyhow!(
                    "Invalid log level '{}'. Valid levels: error, warn, info, debug, trace",
                    self.log_level
                ));
            }
        }

        Ok(())
    }

    /// Retry policy selected by the arguments
    pub fn retry_policy(&self) -> RetryPolicy {
        let initial = Duration::from_secs(self.retry_initial_secs);
        if self.fixed_retry {
            RetryPolicy::fixed(initial)
        } else {
            RetryPolicy::exponential(initial, Duration::from_secs(self.retry_max_secs))
        }
    }
}

/// Resolved application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub log_level: String,
    pub json_logs: bool,
    pub notification: NotificationConfig,
    pub command: Command,
}

impl Config {
    /// Create configuration from command line arguments and environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    fn from_args(mut args: Args) -> Result<Self> {
        if args.token.is_none() {
            args.token = std::env::var("KNMI_MQTT_TOKEN").ok();
        }

        if let Ok(log_level) = std::env::var("KNMI_NOTIFY_LOG_LEVEL") {
            args.log_level = log_level;
        }

        if let Ok(initial) = std::env::var("KNMI_NOTIFY_RETRY_INITIAL_SECS") {
            args.retry_initial_secs = initial
                .parse()
                .context("Invalid KNMI_NOTIFY_RETRY_INITIAL_SECS environment variable")?;
        }

        if let Ok(max) = std::env::var("KNMI_NOTIFY_RETRY_MAX_SECS") {
            args.retry_max_secs = max
                .parse()
                .context("Invalid KNMI_NOTIFY_RETRY_MAX_SECS environment variable")?;
        }

        args.validate()?;

        let notification = NotificationConfig::default().with_retry(args.retry_policy());
        notification
            .validate()
            .context("Invalid retry configuration")?;

        Ok(Self {
            token: args.token.unwrap_or_default(),
            log_level: args.log_level,
            json_logs: args.json_logs,
            notification,
            command: args.command,
        })
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        info!("Configuration:");
        info!("  Retry policy: {:?}", self.notification.retry);
        info!("  Keep-alive: {}s", self.notification.keep_alive.as_secs());
        info!("  Log level: {}", self.log_level);
    }
}

/// Initialize tracing/logging with the specified log level
fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level.to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
}

/// Check the token and map the outcome to a process exit code
async fn run_validate(config: &Config) -> i32 {
    match knmi_notify::validate(&config.token, &config.notification).await {
        Ok(true) => {
            println!("Token accepted");
            0
        }
        Ok(false) => {
            println!("Could not validate token; see log for details");
            1
        }
        Err(CredentialError::Invalid) => {
            println!("Token rejected");
            2
        }
    }
}

/// Stream notifications until Ctrl+C
async fn run_listener(config: &Config, datasets: Vec<String>, json: bool) -> Result<()> {
    let service = NotificationService::new(&config.token, config.notification.clone())
        .context("Failed to create notification service")?;

    let datasets: Vec<DatasetName> = if datasets.is_empty() {
        KnownDataset::ALL.into_iter().map(DatasetName::from).collect()
    } else {
        datasets.into_iter().map(DatasetName::from).collect()
    };

    let format = if json {
        OutputFormat::Json
    } else {
        OutputFormat::Summary
    };
    let received = Arc::new(AtomicU64::new(0));
    let consumer = printer(format, Arc::clone(&received));

    for dataset in datasets {
        if KnownDataset::from_name(dataset.as_str()).is_none() {
            warn!("Dataset {} is not subscribed and will never be printed", dataset);
        }
        service.set_callback(dataset, CONSUMER_ID, Arc::clone(&consumer));
    }

    service.start().context("Failed to start notification service")?;
    info!("Listening for notifications, press Ctrl+C to stop");

    let mut state = service.watch_state();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("Failed to listen for Ctrl+C: {}", e);
                }
                break;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                match *state.borrow_and_update() {
                    ConnectionState::Connected => info!("Connected"),
                    ConnectionState::Reconnecting { attempt, delay } if attempt > 1 => {
                        info!("Reconnecting in {:?} (attempt {})", delay, attempt)
                    }
                    _ => {}
                }
            }
        }
    }

    info!("Stopping notification service");
    service
        .stop()
        .await
        .context("Failed to stop notification service")?;
    info!("Received {} notifications", received.load(Ordering::Relaxed));

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to parse configuration")?;

    init_tracing(&config.log_level, config.json_logs).context("Failed to initialize logging")?;

    config.print_summary();

    match config.command.clone() {
        Command::Validate => {
            let code = run_validate(&config).await;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Command::Listen { dataset, json } => {
            if let Err(e) = run_listener(&config, dataset, json).await {
                error!("Listener failed: {:#}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
