//! Agent configuration: map geometry, screen layout, navigation caps, task
//! thresholds, and station coordinates.
//!
//! Every field has a default tuned for the standard mining grounds, so a TOML
//! config file only needs to name the values it overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::geom::{Cell, Direction, Point, Rect};
use crate::interface::Merchant;
use crate::tile::Tile;

/// Inclusive cell range; everything outside it is sealed off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Cell,
    pub max: Cell,
}

impl Bounds {
    pub fn contains(&self, cell: Cell) -> bool {
        cell.0 >= self.min.0 && cell.0 <= self.max.0 && cell.1 >= self.min.1 && cell.1 <= self.max.1
    }
}

/// How resource cells are checked against their supporting terrain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceRule {
    pub enabled: bool,

    /// The minable tile the rule applies to
    pub resource_tile: Tile,

    /// Side of the resource its supporting tile must sit on. The agent also
    /// stands on this side to work the resource.
    pub support_side: Direction,

    pub support_tile: Tile,
}

impl Default for ResourceRule {
    fn default() -> Self {
        Self {
            enabled: true,
            resource_tile: Tile::Mountain,
            support_side: Direction::Left,
            support_tile: Tile::Gravel,
        }
    }
}

/// Belief map geometry and the coordinate fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Map width in cells (default: 82)
    pub width: u32,

    /// Map height in cells (default: 240)
    pub height: u32,

    /// Offset subtracted from both raw coordinate axes to normalize them
    /// into grid space (default: 3156)
    pub origin: i32,

    /// Cells visible in each direction around the agent (default: 10 = 21x21)
    pub visibility_radius: u32,

    /// Edge length of one cell on screen, in pixels (default: 16)
    pub tile_dim: u32,

    /// Cells outside this range are sealed as permanently inaccessible
    pub open_bounds: Bounds,

    /// Coordinate fix attempts before giving up for good (default: 10)
    pub position_retry_cap: u32,

    /// Inventory item that produces the coordinate readout
    pub position_fix_item: String,

    pub resource_rule: ResourceRule,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: 82,
            height: 240,
            origin: 3156,
            visibility_radius: 10,
            tile_dim: 16,
            open_bounds: Bounds {
                min: (1, 166),
                max: (71, 229),
            },
            position_retry_cap: 10,
            position_fix_item: "sextant".to_string(),
            resource_rule: ResourceRule::default(),
        }
    }
}

/// Fixed screen regions and click targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    // ===== Regions =====
    /// Game viewport; covers the whole visibility window
    pub play_region: Rect,

    /// Where the coordinate readout appears
    pub position_region: Rect,

    /// Where game messages appear
    pub chat_region: Rect,

    pub health_region: Rect,

    pub weight_region: Rect,

    /// Patch showing the furnace's fire state
    pub furnace_region: Rect,

    // ===== Click targets =====
    /// Cursor parking spot that obstructs nothing
    pub neutral_point: Point,

    /// Where the worked rock face appears in the viewport
    pub mine_click: Point,

    pub furnace_click: Point,

    pub furnace_light_click: Point,

    /// Offset from a menu entry's matched corner to its clickable center
    pub menu_item_offset: Point,

    /// Cursor travel time for deliberate moves (default: 150ms)
    pub cursor_glide_ms: u64,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            play_region: Rect::new(8, 8, 336, 336),
            position_region: Rect::new(120, 450, 60, 15),
            chat_region: Rect::new(0, 450, 170, 30),
            health_region: Rect::new(564, 96, 40, 12),
            weight_region: Rect::new(564, 112, 56, 12),
            furnace_region: Rect::new(168, 152, 16, 16),
            neutral_point: (400, 400),
            mine_click: (192, 176),
            furnace_click: (176, 161),
            furnace_light_click: (192, 159),
            menu_item_offset: (9, 10),
            cursor_glide_ms: 150,
        }
    }
}

impl ScreenConfig {
    pub fn cursor_glide(&self) -> Duration {
        Duration::from_millis(self.cursor_glide_ms)
    }
}

/// Navigation retry caps and pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// Consecutive planning failures tolerated before going fatal (default: 10)
    pub path_failure_cap: u32,

    /// Consecutive no-movement steps tolerated before going fatal (default: 10)
    pub stall_cap: u32,

    /// Occupied-destination polls tolerated before going fatal (default: 20)
    pub obstacle_poll_cap: u32,

    /// Wait between occupied-destination polls (default: 5s)
    pub obstacle_poll_ms: u64,

    /// Settle time after each step before re-observing (default: 300ms)
    pub step_delay_ms: u64,

    /// Wait between UI element polls (default: 250ms)
    pub ui_poll_ms: u64,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            path_failure_cap: 10,
            stall_cap: 10,
            obstacle_poll_cap: 20,
            obstacle_poll_ms: 5000,
            step_delay_ms: 300,
            ui_poll_ms: 250,
        }
    }
}

impl NavConfig {
    pub fn obstacle_poll(&self) -> Duration {
        Duration::from_millis(self.obstacle_poll_ms)
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    pub fn ui_poll(&self) -> Duration {
        Duration::from_millis(self.ui_poll_ms)
    }
}

/// Production task thresholds, tools, and pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    // ===== Vitals =====
    /// Run the vitals check every this many scheduler activations (default: 25)
    pub health_check_interval: u64,

    /// Health floor below which a recovery item is consumed (default: 150)
    pub low_health: u32,

    pub recovery_item: String,

    /// Settle time after drinking a recovery item (default: 6s)
    pub recovery_settle_ms: u64,

    /// Attempts to read a vitals or capacity readout before going fatal
    /// (default: 10)
    pub hud_retry_cap: u32,

    // ===== Capacity =====
    /// Minimum carry headroom to keep mining (default: 50)
    pub mine_weight_margin: i64,

    /// Minimum carry headroom to keep forging (default: 15)
    pub forge_weight_margin: i64,

    // ===== Error handling =====
    /// Consecutive confirmation failures tolerated per task (default: 5)
    pub task_error_cap: u32,

    /// Polls while waiting for a UI element to appear (default: 20)
    pub ui_wait_attempts: u32,

    // ===== Items =====
    pub mine_tool: String,

    pub forge_tool: String,

    pub ore_item: String,

    /// What smelting turns ore into and forging consumes
    pub ingot_item: String,

    /// Product forged and sold; doubles as its menu template name
    pub forge_item: String,

    // ===== Pacing =====
    /// Extra delay after each smelting activation (default: 1s)
    pub smelt_delay_ms: u64,

    /// Extra delay after each forging activation (default: 2s)
    pub forge_delay_ms: u64,

    /// Settle time after lighting the furnace (default: 1.5s)
    pub furnace_light_settle_ms: u64,

    /// Blind westward steps used to reach the shop when the coordinate fix
    /// item is buried under stock (default: 4)
    pub sidestep_count: u32,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            health_check_interval: 25,
            low_health: 150,
            recovery_item: "potion".to_string(),
            recovery_settle_ms: 6000,
            hud_retry_cap: 10,
            mine_weight_margin: 50,
            forge_weight_margin: 15,
            task_error_cap: 5,
            ui_wait_attempts: 20,
            mine_tool: "pickaxe".to_string(),
            forge_tool: "hammer".to_string(),
            ore_item: "ore".to_string(),
            ingot_item: "ingot".to_string(),
            forge_item: "dagger".to_string(),
            smelt_delay_ms: 1000,
            forge_delay_ms: 2000,
            furnace_light_settle_ms: 1500,
            sidestep_count: 4,
        }
    }
}

impl TaskConfig {
    pub fn recovery_settle(&self) -> Duration {
        Duration::from_millis(self.recovery_settle_ms)
    }

    pub fn furnace_light_settle(&self) -> Duration {
        Duration::from_millis(self.furnace_light_settle_ms)
    }
}

/// Grid coordinates of the fixed points of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stations {
    pub banker: Cell,
    pub potions: Cell,
    pub items: Cell,
    pub weapons: Cell,
    pub furnace: Cell,
    pub anvil: Cell,
    /// Fallback spot with rock faces in view
    pub mountain_range: Cell,
}

impl Default for Stations {
    fn default() -> Self {
        Self {
            banker: (34, 203),
            potions: (25, 209),
            items: (26, 219),
            weapons: (47, 217),
            furnace: (54, 217),
            anvil: (51, 217),
            mountain_range: (65, 207),
        }
    }
}

impl Stations {
    /// Where to stand to trade with a merchant. The blacksmith works at the
    /// furnace.
    pub fn for_merchant(&self, merchant: Merchant) -> Cell {
        match merchant {
            Merchant::Weapons => self.weapons,
            Merchant::Blacksmith => self.furnace,
            Merchant::Potions => self.potions,
            Merchant::Items => self.items,
            Merchant::Banker => self.banker,
        }
    }

    fn all(&self) -> [Cell; 7] {
        [
            self.banker,
            self.potions,
            self.items,
            self.weapons,
            self.furnace,
            self.anvil,
            self.mountain_range,
        ]
    }
}

/// Top-level agent configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// RNG seed; a random one is drawn when absent (default: None)
    pub seed: Option<u64>,

    /// Append-only run log location (default: prospector.log)
    pub log_path: PathBuf,

    /// Where the belief map is dumped on navigation failures
    /// (default: map_dump.json)
    pub map_dump_path: PathBuf,

    pub map: MapConfig,
    pub screen: ScreenConfig,
    pub nav: NavConfig,
    pub tasks: TaskConfig,
    pub stations: Stations,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            seed: None,
            log_path: PathBuf::from("prospector.log"),
            map_dump_path: PathBuf::from("map_dump.json"),
            map: MapConfig::default(),
            screen: ScreenConfig::default(),
            nav: NavConfig::default(),
            tasks: TaskConfig::default(),
            stations: Stations::default(),
        }
    }
}

impl AgentConfig {
    /// Parse a TOML config file; missing fields fall back to defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        let config: AgentConfig = toml::from_str(&text)
            .with_context(|| format!("could not parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Create a compact profile for the simulated backend.
    pub fn simulation() -> Self {
        Self {
            map: MapConfig {
                width: 48,
                height: 48,
                origin: 1000,
                visibility_radius: 3,
                tile_dim: 4,
                open_bounds: Bounds {
                    min: (1, 1),
                    max: (46, 46),
                },
                ..MapConfig::default()
            },
            screen: ScreenConfig {
                play_region: Rect::new(8, 8, 28, 28),
                position_region: Rect::new(8, 48, 40, 10),
                chat_region: Rect::new(8, 60, 40, 10),
                health_region: Rect::new(8, 72, 24, 8),
                weight_region: Rect::new(8, 82, 40, 8),
                furnace_region: Rect::new(60, 8, 8, 8),
                neutral_point: (90, 90),
                mine_click: (20, 20),
                furnace_click: (22, 16),
                furnace_light_click: (24, 16),
                menu_item_offset: (2, 2),
                cursor_glide_ms: 10,
            },
            stations: Stations {
                banker: (10, 8),
                potions: (8, 12),
                items: (12, 14),
                weapons: (10, 10),
                furnace: (22, 22),
                anvil: (20, 22),
                mountain_range: (34, 24),
            },
            ..AgentConfig::default()
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let map = &self.map;
        anyhow::ensure!(
            map.width > 0 && map.height > 0,
            "map dimensions must be positive"
        );
        anyhow::ensure!(map.tile_dim > 0, "tile_dim must be positive");
        anyhow::ensure!(
            map.visibility_radius > 0,
            "visibility_radius must be positive"
        );
        let bounds = &map.open_bounds;
        anyhow::ensure!(
            bounds.min.0 <= bounds.max.0 && bounds.min.1 <= bounds.max.1,
            "open_bounds min must not exceed max"
        );
        anyhow::ensure!(
            bounds.min.0 >= 0
                && bounds.min.1 >= 0
                && bounds.max.0 < map.width as i32
                && bounds.max.1 < map.height as i32,
            "open_bounds must lie within the map"
        );
        let window = (2 * map.visibility_radius + 1) * map.tile_dim;
        anyhow::ensure!(
            self.screen.play_region.width >= window && self.screen.play_region.height >= window,
            "play_region must cover the {window}x{window} pixel visibility window"
        );
        anyhow::ensure!(
            map.position_retry_cap > 0,
            "position_retry_cap must be positive"
        );
        anyhow::ensure!(
            self.nav.path_failure_cap > 0,
            "path_failure_cap must be positive"
        );
        anyhow::ensure!(self.nav.stall_cap > 0, "stall_cap must be positive");
        anyhow::ensure!(
            self.nav.obstacle_poll_cap > 0,
            "obstacle_poll_cap must be positive"
        );
        anyhow::ensure!(
            self.tasks.task_error_cap > 0,
            "task_error_cap must be positive"
        );
        anyhow::ensure!(
            self.tasks.ui_wait_attempts > 0,
            "ui_wait_attempts must be positive"
        );
        anyhow::ensure!(self.tasks.hud_retry_cap > 0, "hud_retry_cap must be positive");
        anyhow::ensure!(
            self.tasks.health_check_interval > 0,
            "health_check_interval must be positive"
        );
        for station in self.stations.all() {
            anyhow::ensure!(
                bounds.contains(station),
                "station {station:?} lies outside the open map bounds"
            );
        }
        Ok(())
    }
}
