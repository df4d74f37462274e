//! Unrecoverable agent failures.
//!
//! Every retry ladder in the crate bottoms out in one of these variants. They
//! bubble up through the scheduler to the binary, which logs once, asks the
//! backend to shut the application down, and exits.

use thiserror::Error;

use crate::geom::Cell;
use crate::interface::CommerceError;
use crate::tasks::Task;
use crate::tile::Tile;

/// Terminal condition that ends the agent's run.
#[derive(Debug, Error)]
pub enum FatalError {
    /// Path planning to a destination kept failing after map refreshes.
    #[error("no path from {from:?} to {to:?} after {attempts} planning attempts")]
    PathExhausted {
        from: Cell,
        to: Cell,
        attempts: u32,
    },

    /// Steps were dispatched but the agent's position never changed.
    #[error("stuck at {at:?}; {attempts} consecutive steps moved nowhere")]
    Stuck { at: Cell, attempts: u32 },

    /// The planner produced a step that is not a unit move.
    #[error("cannot step from {from:?} to non-adjacent {to:?}")]
    InvalidStep { from: Cell, to: Cell },

    /// The position fix could not be read off the screen.
    #[error("could not read agent coordinates after {attempts} attempts")]
    CoordinateRead { attempts: u32 },

    /// A vitals or capacity readout stayed unreadable.
    #[error("could not read the {what} readout after {attempts} attempts")]
    HudRead { what: &'static str, attempts: u32 },

    /// An actor squatted on the destination past the polling cap.
    #[error("{tile:?} at {cell:?} never moved after {polls} polls")]
    ObstacleNeverMoved {
        cell: Cell,
        tile: Tile,
        polls: u32,
    },

    /// No resource cells were visible even after returning to the range.
    #[error("no minable rock visible after {attempts} searches")]
    NoMiningTargets { attempts: u32 },

    /// A UI element required to continue never appeared.
    #[error("ui element {name:?} did not appear within {attempts} attempts")]
    UiElementMissing { name: String, attempts: u32 },

    /// A task kept failing its confirmation step.
    #[error("{task:?} failed {count} consecutive times")]
    TaskErrorCap { task: Task, count: u32 },

    /// Health is low and there is nothing left to recover with.
    #[error("health is low and no recovery items remain")]
    NoRecoveryItems,

    /// A merchant could not complete a required purchase.
    #[error(transparent)]
    Purchase(#[from] CommerceError),
}
