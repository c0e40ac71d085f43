use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod agent;
mod app;
mod composer;
mod config;
mod handler;
mod identity;
mod location;
mod transcript;
mod tui;
mod ui;

use agent::AgentClient;
use app::App;
use config::Config;
use identity::IdentityStore;
use location::{Coordinates, FixedSource, GeoIpSource, LocationProvider, LocationSource};

#[derive(Parser)]
#[command(name = "fuelagent")]
#[command(about = "Chat with the Fuel Agent assistant from your terminal")]
struct Cli {
    /// Backend base URL (overrides the config file)
    #[arg(long)]
    backend_url: Option<String>,

    /// Pin the latitude instead of looking it up
    #[arg(long, requires = "longitude")]
    latitude: Option<f64>,

    /// Pin the longitude instead of looking it up
    #[arg(long, requires = "latitude")]
    longitude: Option<f64>,

    /// Directory of recorded voice clips; enables the voice prompt
    #[arg(long)]
    audio_dir: Option<PathBuf>,

    /// Ask the agent to speak its replies
    #[arg(long)]
    speak: bool,

    /// Append debug logs to this file (the terminal belongs to the TUI)
    #[arg(long)]
    debug_log: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.debug_log {
        init_logging(path)?;
    }

    let config = Config::load().unwrap_or_else(|_| Config::new());
    if !Config::exists() {
        // First run: leave an editable config file behind
        let _ = config.save();
    }

    let backend_url = cli
        .backend_url
        .or(config.backend_url)
        .unwrap_or_else(|| config::DEFAULT_BACKEND_URL.to_string());
    let timeout = Duration::from_secs(
        config
            .request_timeout_secs
            .unwrap_or(config::DEFAULT_TIMEOUT_SECS),
    );
    let speak = cli.speak || config.speak_replies.unwrap_or(false);
    let audio_dir = cli.audio_dir.or(config.audio_dir);

    // CLI coordinates win over config; with neither, fall back to GeoIP
    let pinned = match (cli.latitude, cli.longitude) {
        (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude }),
        _ => match (config.latitude, config.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude }),
            _ => None,
        },
    };
    let source: Box<dyn LocationSource> = match pinned {
        Some(coords) => Box::new(FixedSource(coords)),
        None => Box::new(GeoIpSource::new()),
    };

    let agent = AgentClient::new(&backend_url, timeout);
    let identity = IdentityStore::new();
    let location = LocationProvider::new(source);

    let mut app = App::new(agent, identity, location, speak, audio_dir);
    app.startup().await;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;
        match events.next().await {
            Some(event) => handler::handle_event(&mut app, event).await?,
            None => break,
        }
    }

    tui::restore()?;
    Ok(())
}

fn init_logging(path: &Path) -> Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fuelagent=debug")),
        )
        .with_writer(std::sync::Arc::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}
