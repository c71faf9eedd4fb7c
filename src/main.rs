mod app;
mod cli;
mod config;
mod deadline;
mod git;
mod input;
mod limits;
mod paths;
mod period;
mod render;
mod report;
mod storage;
mod transcript;

use anyhow::Result;
use clap::Parser;
use std::{fs, fs::OpenOptions, path::Path, sync::Mutex};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let mut config = config::AppConfig::load(cli.config_path.as_deref())?;
    if cli.no_color {
        config.display.color = false;
    }
    init_tracing(&config.storage.log_path());
    let app = app::App::new(config);
    app.run(cli.command()).await
}

fn init_tracing(log_path: &Path) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // Stdout carries the status line: tracing goes to a file or nowhere.
    if let Some(parent) = log_path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let file = OpenOptions::new().create(true).append(true).open(log_path);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(false);
    let _ = match file {
        Ok(file) => builder.with_writer(Mutex::new(file)).try_init(),
        Err(_) => builder.with_writer(std::io::sink).try_init(),
    };
}
