//! CLI Command Implementations
//!
//! Each command loads the document, applies one change through the project,
//! and writes it back.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::control::ControlQueue;
use crate::error::{Result, TrackError};
use crate::layers::{LayerKind, NoteEvent};
use crate::network::{HttpTransport, LogoutListener, LogoutWorker};
use crate::state::{Autosaver, JsonDocumentStore, Project};
use crate::vcs::TrackedItemSource;

fn open(path: &Path, config: &Config) -> Result<Project> {
    Project::open(&JsonDocumentStore, path, config)
}

fn save(project: &mut Project) -> Result<()> {
    if !project.save(&JsonDocumentStore)? {
        warn!("store declined to write the document");
    }
    Ok(())
}

/// Create a new, empty project document.
pub fn create(path: &Path, title: Option<&str>, config: &Config) -> Result<()> {
    info!("Creating new project at: {}", path.display());

    if path.exists() {
        return Err(TrackError::Internal(format!(
            "{} already exists",
            path.display()
        )));
    }

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Untitled");
    let mut project = Project::new(name, config);
    if let Some(title) = title {
        project.update_info(|info| info.title = title.to_string())?;
    }
    project.save_to(&JsonDocumentStore, path)?;

    println!("Project created: {}", path.display());
    println!("Project id: {}", project.id());

    Ok(())
}

/// Print current project state.
pub fn print_state(path: &Path, config: &Config) -> Result<()> {
    let project = open(path, config)?;
    let info = project.info();

    println!("Project: {}", project.name());
    println!("{:-<60}", "");
    println!("Id:       {}", project.id());
    println!("Title:    {}", info.title);
    if !info.author.is_empty() {
        println!("Author:   {}", info.author);
    }
    println!("Created:  {}", info.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Modified: {}", info.modified_at.format("%Y-%m-%d %H:%M:%S"));

    let (start, end) = project.beat_range();
    println!("Range:    {:.2} - {:.2} beats", start, end);
    println!("Contents: {}", project.stats());

    println!();
    println!("Layers:");
    let layers = project.layers();
    if layers.is_empty() {
        println!("  (none)");
    }
    for (i, layer) in layers.iter().enumerate() {
        let layer = layer.read();
        println!(
            "  [{}] {} ({}) {}{}, {} events",
            i,
            layer.name(),
            layer.kind(),
            layer.id(),
            if layer.is_muted() { " [muted]" } else { "" },
            layer.events().len()
        );
    }
    println!("{:-<60}", "");

    Ok(())
}

/// Append a layer.
pub fn add_layer(path: &Path, kind: LayerKind, name: &str, config: &Config) -> Result<()> {
    let mut project = open(path, config)?;
    let id = project.add_layer(kind, name)?;
    save(&mut project)?;

    info!(%id, "added {} layer", kind);
    println!("Added layer: {} ({})", name, id);
    Ok(())
}

/// Remove a layer.
pub fn remove_layer(path: &Path, id: &Uuid, config: &Config) -> Result<()> {
    let mut project = open(path, config)?;
    project.remove_layer(id)?;
    save(&mut project)?;

    println!("Removed layer: {}", id);
    Ok(())
}

/// Rename a layer.
pub fn rename_layer(path: &Path, id: &Uuid, name: &str, config: &Config) -> Result<()> {
    let mut project = open(path, config)?;
    project.rename_layer(id, name)?;
    save(&mut project)?;

    println!("Renamed layer {} to {}", id, name);
    Ok(())
}

/// Add a note to a layer.
pub fn add_note(path: &Path, layer: &Uuid, note: NoteEvent, config: &Config) -> Result<()> {
    let mut project = open(path, config)?;
    let id = project.add_event(layer, note)?;
    save(&mut project)?;

    println!(
        "Added note {} (key {}, beat {:.2}, length {:.2})",
        id, note.key, note.beat, note.length
    );
    Ok(())
}

/// List the items exposed to version control.
pub fn tracked_items(path: &Path, config: &Config) -> Result<()> {
    let project = open(path, config)?;

    println!("Tracked items of {}:", project.vcs_name());
    for (i, item) in project.tracked_items()?.iter().enumerate() {
        println!("  [{}] {:<16} {} {}", i, item.type_tag, item.id, item.name);
    }
    Ok(())
}

/// Write a timestamped backup.
pub fn autosave(path: &Path, dir: Option<&Path>, config: &Config) -> Result<()> {
    let project = open(path, config)?;
    let backups_dir = dir.map(Path::to_path_buf).unwrap_or_else(|| {
        path.parent()
            .map(|p| p.join("backups"))
            .unwrap_or_else(|| PathBuf::from("backups"))
    });

    let mut autosaver = Autosaver::new(&config.autosave);
    match autosaver.autosave(&project, &JsonDocumentStore, &backups_dir)? {
        Some(written) => println!("Autosaved to: {}", written.display()),
        None => warn!("store declined to write the autosave"),
    }
    Ok(())
}

struct PrintingListener;

impl LogoutListener for PrintingListener {
    fn on_success(&mut self) {
        println!("Logged out.");
    }

    fn on_rejected(&mut self) {
        println!("The server rejected the logout request.");
    }

    fn on_connection_failed(&mut self) {
        println!("Could not reach the server.");
    }
}

/// Sign this machine out of the account server.
pub fn logout(config: &Config) -> Result<()> {
    info!(url = %config.network.logout_url, "logging out");

    let transport = Arc::new(HttpTransport::new(&config.network));
    let worker = LogoutWorker::new(config.network.clone(), transport);
    let queue: ControlQueue<()> = ControlQueue::new();

    let handle = worker.logout(Box::new(PrintingListener), queue.poster())?;
    handle
        .join()
        .map_err(|_| TrackError::Internal("logout thread panicked".to_string()))?;
    queue.pump(&mut ());

    Ok(())
}
