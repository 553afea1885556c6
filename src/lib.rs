//! Trackstate - Project State Core for a Collaborative Sequencer
//!
//! Trackstate owns the in-memory model of a music project and everything that
//! mutates it:
//! 1. Layer registry - ordered layers with a lazily rebuilt identity index
//! 2. Undo history - invertible records grouped by checkpoints
//! 3. Change notification - ordered broadcast to registered listeners
//!
//! # Architecture
//!
//! [`state::Project`] is the composition root. It exposes the layers to an
//! external version-control engine through [`vcs::TrackedItemSource`], and
//! accepts results from worker threads through a [`control::ControlQueue`].
//! The [`network`] module runs the logout request off the control thread.

pub mod cli;
pub mod config;
pub mod control;
pub mod error;
pub mod layers;
pub mod network;
pub mod state;
pub mod vcs;

pub use config::Config;
pub use error::{Result, TrackError};
pub use state::Project;
