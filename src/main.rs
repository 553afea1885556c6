//! Trackstate CLI
//!
//! Command-line interface for trackstate project documents.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trackstate::cli::{commands, Cli, Commands};
use trackstate::layers::NoteEvent;
use trackstate::Config;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    info!("Trackstate v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::from_env(),
    };

    match cli.command {
        Some(cmd) => handle_command(cmd, &config),
        None => {
            println!("Trackstate v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands, config: &Config) -> anyhow::Result<()> {
    match cmd {
        Commands::Create { path, title } => commands::create(&path, title.as_deref(), config),
        Commands::PrintState { path } => commands::print_state(&path, config),
        Commands::AddLayer { path, kind, name } => {
            commands::add_layer(&path, kind.into(), &name, config)
        }
        Commands::RemoveLayer { path, id } => commands::remove_layer(&path, &id, config),
        Commands::RenameLayer { path, id, name } => {
            commands::rename_layer(&path, &id, &name, config)
        }
        Commands::AddNote {
            path,
            layer,
            key,
            beat,
            length,
            velocity,
        } => commands::add_note(
            &path,
            &layer,
            NoteEvent::new(key, beat, length, velocity),
            config,
        ),
        Commands::TrackedItems { path } => commands::tracked_items(&path, config),
        Commands::Autosave { path, dir } => commands::autosave(&path, dir.as_deref(), config),
        Commands::Logout => commands::logout(config),
    }?;
    Ok(())
}
