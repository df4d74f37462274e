//! The agent's belief map of the game world.
//!
//! The grid starts out unknown inside the open bounds and permanently sealed
//! outside them. Each update re-derives every cell inside the visibility
//! window from the current frame; everything outside the window keeps its
//! last believed value until the agent comes back around.

use std::io;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::classifier::TileClassifier;
use crate::config::{MapConfig, ScreenConfig};
use crate::error::FatalError;
use crate::geom::{Cell, Rect};
use crate::interface::{Backend, Charset, Perception};
use crate::tile::Tile;

/// Belief grid plus the agent's last fixed position.
#[derive(Clone, Debug)]
pub struct WorldMap {
    width: u32,
    height: u32,
    tiles: Vec<Tile>,
    player: Cell,
    map: MapConfig,
    screen: ScreenConfig,
}

impl WorldMap {
    /// Build the initial belief grid: unknown inside the open bounds, sealed
    /// everywhere else.
    pub fn new(map: MapConfig, screen: ScreenConfig) -> Self {
        let width = map.width;
        let height = map.height;
        let mut tiles = vec![Tile::Unknown; (width * height) as usize];
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                if !map.open_bounds.contains((x, y)) {
                    tiles[(y as u32 * width + x as u32) as usize] = Tile::Inaccessible;
                }
            }
        }
        Self {
            width,
            height,
            tiles,
            player: (0, 0),
            map,
            screen,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Last fixed agent position.
    pub fn player(&self) -> Cell {
        self.player
    }

    pub fn in_bounds(&self, cell: Cell) -> bool {
        cell.0 >= 0 && cell.0 < self.width as i32 && cell.1 >= 0 && cell.1 < self.height as i32
    }

    fn index(&self, cell: Cell) -> usize {
        (cell.1 as u32 * self.width + cell.0 as u32) as usize
    }

    pub fn get(&self, cell: Cell) -> Option<Tile> {
        if self.in_bounds(cell) {
            Some(self.tiles[self.index(cell)])
        } else {
            None
        }
    }

    pub fn set(&mut self, cell: Cell, tile: Tile) {
        if self.in_bounds(cell) {
            let index = self.index(cell);
            self.tiles[index] = tile;
        }
    }

    /// Move the player marker, reverting the vacated cell to accessible
    /// ground. The marker exists on exactly one cell at a time.
    pub fn place_player(&mut self, cell: Cell) {
        if !self.in_bounds(cell) {
            return;
        }
        if self.get(self.player) == Some(Tile::Player) {
            let vacated = self.index(self.player);
            self.tiles[vacated] = Tile::Accessible;
        }
        let index = self.index(cell);
        self.tiles[index] = Tile::Player;
        self.player = cell;
    }

    /// Clipped inclusive bounds of the visibility window around the player.
    fn window(&self) -> (Cell, Cell) {
        let radius = self.map.visibility_radius as i32;
        let min = ((self.player.0 - radius).max(0), (self.player.1 - radius).max(0));
        let max = (
            (self.player.0 + radius).min(self.width as i32 - 1),
            (self.player.1 + radius).min(self.height as i32 - 1),
        );
        (min, max)
    }

    /// Every cell in the visibility window currently believed to hold `tile`,
    /// in raster order.
    pub fn visible_matching(&self, tile: Tile) -> Vec<Cell> {
        let (min, max) = self.window();
        let mut cells = Vec::new();
        for y in min.1..=max.1 {
            for x in min.0..=max.0 {
                if self.tiles[self.index((x, y))] == tile {
                    cells.push((x, y));
                }
            }
        }
        cells
    }

    /// Re-derive every open cell in the visibility window from the current
    /// frame, then reconcile resources and re-rank the signature pools.
    ///
    /// The player's own cell is relabeled [`Tile::Player`] without
    /// classification. Cells with no accepted signature become
    /// [`Tile::Inaccessible`]. Sealed cells stay sealed no matter what the
    /// frame shows.
    pub fn update<P: Perception>(&mut self, classifier: &mut TileClassifier, perception: &mut P) {
        let frame = perception.capture();
        let play = frame.region(self.screen.play_region);
        let radius = self.map.visibility_radius as i32;
        let tile_dim = self.map.tile_dim;
        let window_origin = (self.player.0 - radius, self.player.1 - radius);
        let (min, max) = self.window();
        // Forget the window before re-deriving it; sealed cells stay sealed.
        for y in min.1..=max.1 {
            for x in min.0..=max.0 {
                if self.map.open_bounds.contains((x, y)) {
                    self.set((x, y), Tile::Unknown);
                }
            }
        }
        for y in min.1..=max.1 {
            for x in min.0..=max.0 {
                let cell = (x, y);
                if cell == self.player {
                    self.set(cell, Tile::Player);
                    continue;
                }
                if !self.map.open_bounds.contains(cell) {
                    continue;
                }
                let patch = play.region(Rect::new(
                    (x - window_origin.0) * tile_dim as i32,
                    (y - window_origin.1) * tile_dim as i32,
                    tile_dim,
                    tile_dim,
                ));
                match classifier.classify(perception, &patch) {
                    Some(candidate) => self.set(cell, candidate.tile),
                    None => self.set(cell, Tile::Inaccessible),
                }
            }
        }
        self.reconcile_resources();
        classifier.rank_pools();
    }

    /// Demote every visible resource cell whose supporting neighbor is not
    /// believed to hold the supporting tile.
    pub fn reconcile_resources(&mut self) {
        let rule = self.map.resource_rule.clone();
        if !rule.enabled {
            return;
        }
        let delta = rule.support_side.delta();
        let (min, max) = self.window();
        for y in min.1..=max.1 {
            for x in min.0..=max.0 {
                let cell = (x, y);
                if self.get(cell) != Some(rule.resource_tile) {
                    continue;
                }
                let support = (x + delta.0, y + delta.1);
                if self.get(support) != Some(rule.support_tile) {
                    self.set(cell, Tile::Inaccessible);
                }
            }
        }
    }

    /// Fix the agent's position from the coordinate readout.
    ///
    /// Parks the cursor, applies the fix item, and reads the readout; parse
    /// failures and out-of-bounds fixes are retried up to the configured cap
    /// before going fatal.
    pub fn update_agent_position<B: Backend>(&mut self, backend: &mut B) -> Result<(), FatalError> {
        let cap = self.map.position_retry_cap;
        for attempt in 1..=cap {
            backend.move_cursor(self.screen.neutral_point, Duration::ZERO);
            backend.use_item(&self.map.position_fix_item, None);
            match backend.extract_text(self.screen.position_region, Charset::Digits) {
                Ok(text) => {
                    if let Some((raw_x, raw_y)) = parse_coordinates(&text) {
                        let cell = (raw_x - self.map.origin, raw_y - self.map.origin);
                        if self.in_bounds(cell) {
                            self.place_player(cell);
                            debug!(cell = ?cell, attempt, "position fixed");
                            return Ok(());
                        }
                        warn!(text = %text, attempt, "coordinate fix lies outside the map");
                    } else {
                        warn!(text = %text, attempt, "could not parse coordinate fix");
                    }
                }
                Err(err) => warn!(error = %err, attempt, "coordinate extraction failed"),
            }
        }
        error!(attempts = cap, "coordinate fix failed repeatedly");
        Err(FatalError::CoordinateRead { attempts: cap })
    }

    /// One glyph per cell, one row per line.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(((self.width + 1) * self.height) as usize);
        for y in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                out.push(self.tiles[self.index((x, y))].display_char());
            }
            out.push('\n');
        }
        out
    }

    /// Dump the belief grid as JSON for post-mortem inspection.
    pub fn write_debug_dump(&self, path: &Path) -> io::Result<()> {
        #[derive(Serialize)]
        struct MapDump<'a> {
            width: u32,
            height: u32,
            player: Cell,
            rows: Vec<&'a str>,
        }
        let rendered = self.render();
        let dump = MapDump {
            width: self.width,
            height: self.height,
            player: self.player,
            rows: rendered.lines().collect(),
        };
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, &dump)?;
        Ok(())
    }
}

/// Parse a `"x, y"` coordinate readout.
fn parse_coordinates(text: &str) -> Option<(i32, i32)> {
    let mut parts = text.split(',');
    let x = parts.next()?.trim().parse().ok()?;
    let y = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((x, y))
}
