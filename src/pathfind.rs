//! Shortest-path search over the belief map.
//!
//! Plain A* on the 4-connected grid with unit step costs. The heuristic is
//! the squared Euclidean distance, which overweights far-away goals and
//! makes the search greedier than an admissible heuristic would; routes can
//! be slightly longer than optimal, which is acceptable here since every
//! step triggers a replan anyway.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::geom::{neighbors, Cell};
use crate::world::WorldMap;

fn heuristic(from: Cell, to: Cell) -> i64 {
    let dx = (to.0 - from.0) as i64;
    let dy = (to.1 - from.1) as i64;
    dx * dx + dy * dy
}

#[derive(PartialEq, Eq)]
struct OpenEntry {
    priority: i64,
    cell: Cell,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then(self.cell.cmp(&other.cell))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Plan a route between two cells through believed-walkable terrain.
///
/// Returns the sequence of cells to step through, excluding `start`. An
/// empty path means the agent already stands on the goal. `None` means no
/// walkable route exists in the current beliefs; the goal itself being
/// blocked (an actor standing on it, say) counts as no route.
pub fn find_path(map: &WorldMap, start: Cell, goal: Cell) -> Option<Vec<Cell>> {
    if start == goal {
        return Some(Vec::new());
    }
    if !map.in_bounds(start) || !map.in_bounds(goal) {
        return None;
    }

    let mut open = BinaryHeap::new();
    let mut closed: HashSet<Cell> = HashSet::new();
    let mut came_from: HashMap<Cell, Cell> = HashMap::new();
    let mut g_score: HashMap<Cell, i64> = HashMap::new();
    g_score.insert(start, 0);
    open.push(Reverse(OpenEntry {
        priority: heuristic(start, goal),
        cell: start,
    }));

    while let Some(Reverse(entry)) = open.pop() {
        let current = entry.cell;
        if current == goal {
            return Some(build_path(&came_from, start, goal));
        }
        // Stale queue entries for already-expanded cells.
        if !closed.insert(current) {
            continue;
        }
        let current_g = g_score[&current];
        for neighbor in neighbors(current) {
            if closed.contains(&neighbor) {
                continue;
            }
            let tile = match map.get(neighbor) {
                Some(tile) => tile,
                None => continue,
            };
            if tile.is_blocking() {
                continue;
            }
            let tentative = current_g + 1;
            if g_score.get(&neighbor).is_some_and(|&g| tentative >= g) {
                continue;
            }
            g_score.insert(neighbor, tentative);
            came_from.insert(neighbor, current);
            open.push(Reverse(OpenEntry {
                priority: tentative + heuristic(neighbor, goal),
                cell: neighbor,
            }));
        }
    }
    None
}

fn build_path(came_from: &HashMap<Cell, Cell>, start: Cell, goal: Cell) -> Vec<Cell> {
    let mut path = vec![goal];
    let mut current = goal;
    while let Some(&previous) = came_from.get(&current) {
        if previous == start {
            break;
        }
        path.push(previous);
        current = previous;
    }
    path.reverse();
    path
}
