//! CLI Module
//!
//! Command-line interface for inspecting and editing project documents.

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use uuid::Uuid;

use crate::layers::LayerKind;

/// Trackstate - project state tool for a collaborative sequencer
#[derive(Parser, Debug)]
#[command(name = "trackstate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON configuration file (defaults plus TRACKSTATE_* variables otherwise)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Layer kinds accepted on the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerKindArg {
    Piano,
    Automation,
    Annotations,
}

impl From<LayerKindArg> for LayerKind {
    fn from(arg: LayerKindArg) -> Self {
        match arg {
            LayerKindArg::Piano => LayerKind::Piano,
            LayerKindArg::Automation => LayerKind::Automation,
            LayerKindArg::Annotations => LayerKind::Annotations,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new, empty project document
    #[command(name = "create")]
    Create {
        /// Path for the new document
        path: PathBuf,

        /// Project title (defaults to the file name)
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Print current project state
    #[command(name = "print-state")]
    PrintState {
        /// Path to the document
        path: PathBuf,
    },

    /// Append a layer
    #[command(name = "add-layer")]
    AddLayer {
        /// Path to the document
        path: PathBuf,

        /// Layer kind
        #[arg(short, long, value_enum, default_value = "piano")]
        kind: LayerKindArg,

        /// Layer name
        #[arg(short, long)]
        name: String,
    },

    /// Remove a layer
    #[command(name = "remove-layer")]
    RemoveLayer {
        /// Path to the document
        path: PathBuf,

        /// Layer id
        id: Uuid,
    },

    /// Rename a layer
    #[command(name = "rename-layer")]
    RenameLayer {
        /// Path to the document
        path: PathBuf,

        /// Layer id
        id: Uuid,

        /// New name
        name: String,
    },

    /// Add a note to a piano layer
    #[command(name = "add-note")]
    AddNote {
        /// Path to the document
        path: PathBuf,

        /// Layer id
        #[arg(short, long)]
        layer: Uuid,

        /// MIDI key
        #[arg(short, long)]
        key: i32,

        /// Start position in beats
        #[arg(short, long)]
        beat: f32,

        /// Length in beats
        #[arg(long, default_value = "1.0")]
        length: f32,

        /// Velocity (0.0 - 1.0)
        #[arg(long, default_value = "0.8")]
        velocity: f32,
    },

    /// List the items exposed to version control
    #[command(name = "tracked-items")]
    TrackedItems {
        /// Path to the document
        path: PathBuf,
    },

    /// Write a timestamped backup next to the document
    #[command(name = "autosave")]
    Autosave {
        /// Path to the document
        path: PathBuf,

        /// Backup directory (defaults to `backups/` beside the document)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Sign this machine out of the account server
    #[command(name = "logout")]
    Logout,
}
