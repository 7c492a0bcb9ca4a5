use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

use storefront_watch::driver::WebSessionFactory;
use storefront_watch::report::{self, RunReport};
use storefront_watch::runner::{
    ConsoleEventListener, EventEmitter, Monitor, Observers, RunController, RunMode, RunRequest,
    RunResult, RunStatus, StopFlag,
};
use storefront_watch::server::{AppState, Server, ServerConfig};
use storefront_watch::store::LogStore;
use storefront_watch::utils::Config;

#[derive(Parser)]
#[command(name = "storefront-watch")]
#[command(version = "0.1.0")]
#[command(about = "Synthetic purchase-flow checks for e-commerce storefronts", long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Show the browser window instead of running headless
    #[arg(long, global = true, default_value = "false")]
    headed: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a single Run
    Run {
        /// Storefront start page
        #[arg(short, long)]
        url: Option<String>,

        /// Flow mode (fast, collection)
        #[arg(short, long)]
        mode: Option<RunMode>,

        /// Write a JSON report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Repeat Runs at a fixed interval until Ctrl+C
    Monitor {
        #[arg(short, long)]
        url: Option<String>,

        #[arg(short, long)]
        mode: Option<RunMode>,

        /// Hours between Runs
        #[arg(short, long)]
        interval: Option<f64>,
    },

    /// Start the HTTP service
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        /// Step log database (sqlite:… or mysql:…)
        #[arg(long)]
        database_url: Option<String>,
    },
}

fn console() -> (Arc<EventEmitter>, tokio::task::JoinHandle<()>) {
    let (emitter, receiver) = EventEmitter::new();
    let listener = tokio::spawn(ConsoleEventListener::listen(receiver));
    (Arc::new(emitter), listener)
}

fn controller(config: &Config) -> RunController {
    RunController::new(
        Arc::new(WebSessionFactory),
        config.flow.clone(),
        config.session_options(),
    )
}

fn required_url(url: Option<String>, config: &Config) -> anyhow::Result<String> {
    url.or_else(|| config.url.clone())
        .context("No storefront URL given; pass --url or set `url` in the config file")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if cli.headed {
        config.headless = false;
    }

    match cli.command {
        Commands::Run { url, mode, report } => {
            let url = required_url(url, &config)?;
            let mode = mode.unwrap_or(config.mode);
            config.validate()?;

            println!("{} Checking {}", "▶".green().bold(), url.cyan());
            let (emitter, listener) = console();
            let result = controller(&config)
                .execute(
                    &RunRequest::new("run-1", url, mode),
                    Arc::new(Observers::new().with(emitter)),
                )
                .await;
            // Every sender is gone once the Run returns
            listener.await.ok();

            if let Some(path) = report {
                report::json::write(&RunReport::from(&result), Some(&path))?;
            }
            if result.status == RunStatus::FailedToStart {
                anyhow::bail!("Run could not start a browser session");
            }
            warn_on_failures(&result);
        }

        Commands::Monitor {
            url,
            mode,
            interval,
        } => {
            let url = required_url(url, &config)?;
            if let Some(hours) = interval {
                config.interval_hours = hours;
            }
            config.validate()?;

            let stop = StopFlag::new();
            let handler_flag = stop.clone();
            ctrlc::set_handler(move || {
                println!("\n{} Stopping after the current Run...", "⏹".yellow());
                handler_flag.stop();
            })?;

            let (emitter, _listener) = console();
            let monitor = Monitor::new(
                controller(&config),
                url,
                mode.unwrap_or(config.mode),
                config.interval_hours,
                stop,
                emitter,
            );
            println!(
                "{} Monitoring every {:.2} hours. Press Ctrl+C to stop.",
                "⏱".cyan(),
                config.interval_hours
            );
            let runs = monitor.monitor(warn_on_failures).await;
            info!("Monitor executed {} runs", runs);
        }

        Commands::Serve { port, database_url } => {
            if let Some(port) = port {
                config.port = port;
            }
            if database_url.is_some() {
                config.database_url = database_url;
            }
            config.validate()?;

            let store = match config.database_url {
                Some(ref url) => Some(LogStore::connect(url).await?),
                None => None,
            };
            let (emitter, _listener) = console();
            let state = AppState::new(controller(&config), store, Observers::new().with(emitter))
                .await?;
            Server::new(
                ServerConfig {
                    port: config.port,
                    ..ServerConfig::default()
                },
                state,
            )
            .start()
            .await?;
        }
    }

    Ok(())
}

fn warn_on_failures(result: &RunResult) {
    if result.has_failures() {
        let failures = result.outcomes.iter().filter(|o| o.is_failure()).count();
        warn!("Run {} finished with {} failed steps", result.id, failures);
        for line in result.lines.iter().filter(|l| l.starts_with("[failure]")) {
            warn!("  {}", line);
        }
    }
}
