//! Prospector - an autonomous mining agent driven by screen observation
//!
//! This crate contains the full agent loop for a mine-smelt-forge-sell
//! production cycle: incremental tile classification from screen captures,
//! a belief map rebuilt around every step, A* travel that replans each cell,
//! and the task machine that turns ore into sold stock.
//!
//! ## Features
//!
//! - `png` - Load signature and UI templates from PNG files (requires the
//!   `image` crate)
//!
//! ## Modules
//!
//! - [`agent`] - Activation loop, vitals, and HUD readouts
//! - [`world`] - Belief map maintained from the visibility window
//! - [`classifier`] - Signature pools and incremental tile classification
//! - [`nav`] - Replanning travel and mining-target acquisition
//! - [`tasks`] - The mine/smelt/forge state machine
//! - [`sim`] - Scripted backend for tests and headless runs

pub mod agent;
pub mod classifier;
pub mod config;
pub mod error;
pub mod geom;
pub mod interface;
pub mod logging;
pub mod nav;
pub mod pathfind;
mod scenarios; // End-to-end runs against the scripted backend
pub mod signature;
pub mod sim;
pub mod tasks;
pub mod tile;
pub mod ui;
pub mod world;

// Core types
pub use agent::Agent;
pub use classifier::TileClassifier;
pub use config::AgentConfig;
pub use error::FatalError;
pub use geom::{Cell, Direction, Point, Rect};
pub use tile::Tile;
pub use world::WorldMap;

// Backend traits and the scripted implementation
pub use interface::{Actuator, Backend, Commerce, Frame, Inventory, Merchant, Perception};
pub use sim::{SimBackend, SimEvent};

// Navigation
pub use nav::Navigator;
pub use pathfind::find_path;

// Tasks
pub use tasks::{Task, TaskCounters};

// Signatures and UI templates
pub use signature::{SignatureLibrary, SignatureManifest, SignaturePool, TileSignature};
pub use ui::UiCatalog;
