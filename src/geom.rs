//! Grid and screen geometry shared across the agent.

use serde::{Deserialize, Serialize};

/// Absolute grid coordinates of one map cell.
pub type Cell = (i32, i32);

/// Screen coordinates in pixels.
pub type Point = (i32, i32);

/// Axis-aligned pixel rectangle; `x`/`y` is the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.0 >= self.x
            && point.0 < self.x + self.width as i32
            && point.1 >= self.y
            && point.1 < self.y + self.height as i32
    }
}

/// One of the four movement commands the actuator can dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    /// Unit cell delta this direction applies.
    pub fn delta(&self) -> Cell {
        match self {
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
        }
    }

    /// Direction for a unit-magnitude single-axis delta, `None` for any other
    /// delta.
    pub fn from_delta(delta: Cell) -> Option<Direction> {
        match delta {
            (-1, 0) => Some(Direction::Left),
            (1, 0) => Some(Direction::Right),
            (0, -1) => Some(Direction::Up),
            (0, 1) => Some(Direction::Down),
            _ => None,
        }
    }
}

/// The 4-connected neighbors of a cell, in a fixed scan order.
pub fn neighbors(cell: Cell) -> [Cell; 4] {
    [
        (cell.0, cell.1 + 1),
        (cell.0, cell.1 - 1),
        (cell.0 + 1, cell.1),
        (cell.0 - 1, cell.1),
    ]
}
