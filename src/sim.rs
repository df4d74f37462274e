//! Deterministic scripted backend for tests and headless runs.
//!
//! The simulator keeps a true world the agent never sees directly: terrain,
//! patrolling actors, item counts, vitals, and furnace state. [`Perception`]
//! renders all of it into the same frame layout the agent expects from a real
//! capture, [`Actuator`] input is interpreted against the true world, and
//! every observable action lands in a journal the tests assert on.
//!
//! Tiles render as uniform patches and UI templates as ramp patterns, so
//! template matching is exact: a region matches a template only where the
//! simulator drew that template.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::config::{AgentConfig, MapConfig, ScreenConfig, Stations, TaskConfig};
use crate::geom::{Cell, Direction, Point, Rect};
use crate::interface::{
    Actuator, Charset, Commerce, CommerceError, Frame, Inventory, Merchant, ParseError, Perception,
};
use crate::signature::{SignatureLibrary, SignaturePool};
use crate::tile::Tile;
use crate::ui::{self, UiCatalog};

/// Carry weight added per mined ore and shed per sold product.
const ORE_WEIGHT: i64 = 12;
/// Most items a single sale hands over.
const SALE_BATCH: u32 = 12;
/// Screen point reported for any visible inventory item.
const ITEM_POINT: Point = (100, 100);

const MENU_BASE: u8 = 140;
const ENTRY_BASE: u8 = 160;
const NOTHING_BASE: u8 = 180;
const CANNOT_BASE: u8 = 200;
const COLD_FURNACE_BASE: u8 = 220;
const CORRUPT_BASE: u8 = 250;

/// One observable backend action, in dispatch order.
#[derive(Clone, Debug, PartialEq)]
pub enum SimEvent {
    Pressed(Direction),
    Clicked(Point),
    DoubleClicked(Point),
    Dragged(Point),
    Paused(Duration),
    Used {
        item: String,
        target: Option<Point>,
    },
    Reorganized,
    Bought {
        item: String,
        merchant: Merchant,
    },
    Sold {
        item: String,
        merchant: Merchant,
        count: u32,
    },
    QuitRequested,
}

struct SimNpc {
    tile: Tile,
    at: Cell,
    route: Vec<Cell>,
}

/// Looks like open floor but blocks movement until its shove budget runs out.
struct Phantom {
    cell: Cell,
    blocks_remaining: Option<u32>,
}

impl Phantom {
    fn active(&self) -> bool {
        self.blocks_remaining.map_or(true, |n| n > 0)
    }
}

/// Scripted implementation of every collaborator trait.
pub struct SimBackend {
    map: MapConfig,
    screen: ScreenConfig,
    tasks: TaskConfig,
    stations: Stations,
    frame_width: u32,
    frame_height: u32,
    menu_at: Point,
    entry_at: Point,

    terrain: Vec<Tile>,
    npcs: Vec<SimNpc>,
    phantoms: Vec<Phantom>,
    corrupt: HashSet<Cell>,
    player: Cell,
    cursor: Point,

    health: i64,
    max_health: i64,
    weight: i64,
    max_weight: i64,

    items: HashMap<String, u32>,
    obscured: HashSet<String>,

    furnace_lit: bool,
    menu_open: bool,
    menu_jammed: bool,
    chat: Option<String>,

    ocr_failures: u32,
    fail_purchases: bool,
    quit: bool,
    journal: Vec<SimEvent>,
}

/// Uniform fill byte a tile renders as.
fn tile_fill(tile: Tile) -> u8 {
    20 + (tile as u8) * 10
}

/// Non-uniform ramp that can only match where the simulator drew it.
fn pattern(base: u8, width: u32, height: u32) -> Frame {
    let data = (0..width * height)
        .map(|i| base.wrapping_add((i as u8).wrapping_mul(3)))
        .collect();
    Frame::from_raw(width, height, data)
}

/// Exact sliding-window match; the needle must appear verbatim.
fn scan(haystack: &Frame, needle: &Frame) -> Option<Point> {
    if needle.width() == 0
        || needle.height() == 0
        || needle.width() > haystack.width()
        || needle.height() > haystack.height()
    {
        return None;
    }
    for oy in 0..=(haystack.height() - needle.height()) {
        'candidate: for ox in 0..=(haystack.width() - needle.width()) {
            for y in 0..needle.height() {
                for x in 0..needle.width() {
                    if haystack.get(ox + x, oy + y) != needle.get(x, y) {
                        continue 'candidate;
                    }
                }
            }
            return Some((ox as i32, oy as i32));
        }
    }
    None
}

impl SimBackend {
    pub fn new(config: &AgentConfig) -> Self {
        let map = config.map.clone();
        let screen = config.screen.clone();
        let width = map.width;
        let height = map.height;
        let mut terrain = vec![Tile::Accessible; (width * height) as usize];
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                if !map.open_bounds.contains((x, y)) {
                    terrain[(y as u32 * width + x as u32) as usize] = Tile::Inaccessible;
                }
            }
        }
        let rects = [
            screen.play_region,
            screen.position_region,
            screen.chat_region,
            screen.health_region,
            screen.weight_region,
            screen.furnace_region,
        ];
        let mut frame_width = screen.neutral_point.0 + 1;
        let mut frame_height = screen.neutral_point.1 + 1;
        for rect in rects {
            frame_width = frame_width.max(rect.x + rect.width as i32);
            frame_height = frame_height.max(rect.y + rect.height as i32);
        }
        let ui_row = frame_height + 8;
        let player = (
            (map.open_bounds.min.0 + map.open_bounds.max.0) / 2,
            (map.open_bounds.min.1 + map.open_bounds.max.1) / 2,
        );
        let mut items = HashMap::new();
        for (item, count) in [
            (config.map.position_fix_item.clone(), 1),
            (config.tasks.mine_tool.clone(), 1),
            (config.tasks.forge_tool.clone(), 1),
            (config.tasks.recovery_item.clone(), 3),
        ] {
            items.insert(item, count);
        }
        Self {
            map,
            screen,
            tasks: config.tasks.clone(),
            stations: config.stations.clone(),
            frame_width: frame_width.max(64) as u32,
            frame_height: (ui_row + 24) as u32,
            menu_at: (8, ui_row),
            entry_at: (32, ui_row),
            terrain,
            npcs: Vec::new(),
            phantoms: Vec::new(),
            corrupt: HashSet::new(),
            player,
            cursor: (0, 0),
            health: 300,
            max_health: 300,
            weight: 0,
            max_weight: 400,
            items,
            obscured: HashSet::new(),
            furnace_lit: false,
            menu_open: false,
            menu_jammed: false,
            chat: None,
            ocr_failures: 0,
            fail_purchases: false,
            quit: false,
            journal: Vec::new(),
        }
    }

    // ===== Scripting =====

    /// Place the true player position; the coordinate readout follows it.
    pub fn set_player(&mut self, cell: Cell) {
        self.player = cell;
    }

    pub fn set_tile(&mut self, cell: Cell, tile: Tile) {
        if cell.0 >= 0
            && cell.1 >= 0
            && (cell.0 as u32) < self.map.width
            && (cell.1 as u32) < self.map.height
        {
            self.terrain[(cell.1 as u32 * self.map.width + cell.0 as u32) as usize] = tile;
        }
    }

    /// Spawn an actor at `at`; each capture advances it one route waypoint
    /// until the route runs out, then it stands still.
    pub fn add_npc(&mut self, tile: Tile, at: Cell, route: Vec<Cell>) {
        self.npcs.push(SimNpc { tile, at, route });
    }

    /// A cell that renders as open floor but blocks movement. `None` never
    /// clears; `Some(n)` gives way on the shove after the n-th.
    pub fn add_phantom_wall(&mut self, cell: Cell, blocks_remaining: Option<u32>) {
        self.phantoms.push(Phantom {
            cell,
            blocks_remaining,
        });
    }

    /// Render a cell as image data no signature matches.
    pub fn corrupt_cell(&mut self, cell: Cell) {
        self.corrupt.insert(cell);
    }

    /// Make the next `failures` coordinate readouts unreadable.
    pub fn fail_ocr(&mut self, failures: u32) {
        self.ocr_failures = failures;
    }

    pub fn set_health(&mut self, health: i64) {
        self.health = health;
    }

    pub fn set_weight(&mut self, current: i64, max: i64) {
        self.weight = current;
        self.max_weight = max;
    }

    pub fn stock_item(&mut self, item: &str, count: u32) {
        self.items.insert(item.to_string(), count);
    }

    /// Bury an item under stock so it cannot be seen until a sale clears it.
    pub fn obscure_item(&mut self, item: &str) {
        self.obscured.insert(item.to_string());
    }

    pub fn fail_purchases(&mut self, fail: bool) {
        self.fail_purchases = fail;
    }

    /// Keep the blacksmith menu from opening on hammer use.
    pub fn jam_blacksmith_menu(&mut self, jammed: bool) {
        self.menu_jammed = jammed;
    }

    pub fn open_blacksmith_menu(&mut self) {
        self.menu_open = true;
    }

    pub fn light_furnace(&mut self) {
        self.furnace_lit = true;
    }

    /// Show a chat message until gameplay replaces it.
    pub fn post_chat_message(&mut self, message: &str) {
        self.chat = Some(message.to_string());
    }

    /// Rock faces with gravel stands just east of the range station.
    pub fn seed_standard_world(&mut self) {
        let range = self.stations.mountain_range;
        for dy in -1..=1 {
            self.set_tile((range.0 + 2, range.1 + dy), Tile::Mountain);
            self.set_tile((range.0 + 1, range.1 + dy), Tile::Gravel);
        }
    }

    // ===== Inspection =====

    pub fn journal(&self) -> &[SimEvent] {
        &self.journal
    }

    pub fn clear_journal(&mut self) {
        self.journal.clear();
    }

    /// True player position, which the belief map may disagree with.
    pub fn player(&self) -> Cell {
        self.player
    }

    pub fn cursor(&self) -> Point {
        self.cursor
    }

    pub fn item_count(&self, item: &str) -> u32 {
        self.items.get(item).copied().unwrap_or(0)
    }

    pub fn chat(&self) -> Option<&str> {
        self.chat.as_deref()
    }

    pub fn furnace_lit(&self) -> bool {
        self.furnace_lit
    }

    pub fn blacksmith_menu_open(&self) -> bool {
        self.menu_open
    }

    pub fn quit_requested(&self) -> bool {
        self.quit
    }

    // ===== Template sources =====

    /// Signatures for every tile the simulator renders.
    pub fn signature_library(&self) -> SignatureLibrary {
        let mut library = SignatureLibrary::new();
        let dim = self.map.tile_dim;
        let entries = [
            (SignaturePool::Ground, "cave_floor", Tile::Accessible),
            (SignaturePool::Ground, "door", Tile::Door),
            (SignaturePool::Ground, "gravel", Tile::Gravel),
            (SignaturePool::Blocked, "stone_wall", Tile::Inaccessible),
            (SignaturePool::Blocked, "rock_face", Tile::Mountain),
            (SignaturePool::Actor, "weapon_shopkeeper", Tile::WeaponShopkeeper),
            (SignaturePool::Actor, "item_shopkeeper", Tile::ItemShopkeeper),
            (SignaturePool::Actor, "potion_shopkeeper", Tile::PotionShopkeeper),
            (SignaturePool::Actor, "banker", Tile::Banker),
            (SignaturePool::Actor, "blacksmith", Tile::Blacksmith),
        ];
        for (pool, name, tile) in entries {
            library
                .register(pool, name, tile, Frame::filled(dim, dim, tile_fill(tile)))
                .expect("simulated signature set is valid");
        }
        library
    }

    /// Templates for every UI element the simulator renders.
    pub fn ui_catalog(&self) -> UiCatalog {
        let mut catalog = UiCatalog::new();
        catalog.register(ui::BLACKSMITH_MENU, self.menu_template());
        catalog.register(self.tasks.forge_item.clone(), self.entry_template());
        catalog.register(ui::NOTHING_TO_MINE, pattern(NOTHING_BASE, 12, 6));
        catalog.register(ui::CANNOT_MINE_THERE, pattern(CANNOT_BASE, 12, 6));
        catalog.register(ui::COLD_FURNACE, self.cold_furnace_template());
        catalog
    }

    fn menu_template(&self) -> Frame {
        pattern(MENU_BASE, 8, 8)
    }

    fn entry_template(&self) -> Frame {
        pattern(ENTRY_BASE, 12, 8)
    }

    fn cold_furnace_template(&self) -> Frame {
        pattern(
            COLD_FURNACE_BASE,
            self.screen.furnace_region.width,
            self.screen.furnace_region.height,
        )
    }

    fn message_base(message: &str) -> Option<u8> {
        match message {
            ui::NOTHING_TO_MINE => Some(NOTHING_BASE),
            ui::CANNOT_MINE_THERE => Some(CANNOT_BASE),
            _ => None,
        }
    }

    // ===== World internals =====

    fn tile_at(&self, cell: Cell) -> Tile {
        if cell.0 < 0
            || cell.1 < 0
            || cell.0 >= self.map.width as i32
            || cell.1 >= self.map.height as i32
        {
            return Tile::Inaccessible;
        }
        self.terrain[(cell.1 as u32 * self.map.width + cell.0 as u32) as usize]
    }

    fn visible_count(&self, item: &str) -> u32 {
        if self.obscured.contains(item) {
            0
        } else {
            self.item_count(item)
        }
    }

    fn apparent_fill(&self, cell: Cell) -> u8 {
        if cell == self.player {
            return tile_fill(Tile::Player);
        }
        if let Some(npc) = self.npcs.iter().find(|npc| npc.at == cell) {
            return tile_fill(npc.tile);
        }
        if self.phantoms.iter().any(|p| p.cell == cell && p.active()) {
            return tile_fill(Tile::Accessible);
        }
        tile_fill(self.tile_at(cell))
    }

    fn render_screen(&self) -> Frame {
        let mut frame = Frame::new(self.frame_width, self.frame_height);
        let radius = self.map.visibility_radius as i32;
        let dim = self.map.tile_dim;
        let play = self.screen.play_region;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let cell = (self.player.0 + dx, self.player.1 + dy);
                let origin = (
                    play.x + (dx + radius) * dim as i32,
                    play.y + (dy + radius) * dim as i32,
                );
                if self.corrupt.contains(&cell) {
                    frame.paste(origin, &pattern(CORRUPT_BASE, dim, dim));
                } else {
                    frame.fill_rect(
                        Rect::new(origin.0, origin.1, dim, dim),
                        self.apparent_fill(cell),
                    );
                }
            }
        }
        if !self.furnace_lit {
            let furnace = self.screen.furnace_region;
            frame.paste((furnace.x, furnace.y), &self.cold_furnace_template());
        }
        if let Some(base) = self.chat.as_deref().and_then(Self::message_base) {
            let chat = self.screen.chat_region;
            frame.paste((chat.x, chat.y), &pattern(base, 12, 6));
        }
        if self.menu_open {
            frame.paste(self.menu_at, &self.menu_template());
            frame.paste(self.entry_at, &self.entry_template());
        }
        frame
    }

    /// Mining hits the rock the stand cell supports; a miss posts the
    /// cannot-mine message, a hit replaces it.
    fn swing_pick(&mut self) {
        let support = self.map.resource_rule.support_side.delta();
        let rock = (self.player.0 - support.0, self.player.1 - support.1);
        if self.tile_at(rock) == self.map.resource_rule.resource_tile {
            let ore = self.tasks.ore_item.clone();
            *self.items.entry(ore).or_insert(0) += 1;
            self.weight += ORE_WEIGHT;
            self.chat = None;
        } else {
            self.chat = Some(ui::CANNOT_MINE_THERE.to_string());
        }
    }

    fn apply_item(&mut self, item: &str) {
        if item == self.tasks.mine_tool {
            self.swing_pick();
        } else if item == self.tasks.ore_item {
            if self.furnace_lit && self.item_count(&self.tasks.ore_item) > 0 {
                let ore = self.tasks.ore_item.clone();
                let ingot = self.tasks.ingot_item.clone();
                *self.items.entry(ore).or_insert(1) -= 1;
                *self.items.entry(ingot).or_insert(0) += 1;
            }
        } else if item == self.tasks.forge_tool {
            if self.item_count(&self.tasks.ingot_item) > 0 && !self.menu_jammed {
                self.menu_open = true;
            }
        } else if item == self.tasks.recovery_item {
            let potion = self.tasks.recovery_item.clone();
            *self.items.entry(potion).or_insert(1) -= 1;
            self.health = self.max_health;
        }
    }
}

impl Perception for SimBackend {
    fn capture(&mut self) -> Frame {
        for npc in &mut self.npcs {
            if !npc.route.is_empty() {
                npc.at = npc.route.remove(0);
            }
        }
        self.render_screen()
    }

    fn extract_text(&mut self, region: Rect, _charset: Charset) -> Result<String, ParseError> {
        if region == self.screen.position_region {
            if self.ocr_failures > 0 {
                self.ocr_failures -= 1;
                return Err(ParseError {
                    region,
                    reason: "glare over the readout".to_string(),
                });
            }
            return Ok(format!(
                "{}, {}",
                self.map.origin + self.player.0,
                self.map.origin + self.player.1
            ));
        }
        if region == self.screen.health_region {
            return Ok(format!("{}/{}", self.health, self.max_health));
        }
        if region == self.screen.weight_region {
            return Ok(format!("{}/{}", self.weight, self.max_weight));
        }
        Err(ParseError {
            region,
            reason: "no readout in this region".to_string(),
        })
    }

    fn match_confidence(&mut self, region: &Frame, template: &Frame) -> f64 {
        if scan(region, template).is_some() {
            1.0
        } else {
            0.0
        }
    }

    fn locate(&mut self, template: &Frame) -> Option<(Point, f64)> {
        let screen = self.render_screen();
        scan(&screen, template).map(|at| (at, 1.0))
    }
}

impl Actuator for SimBackend {
    fn press(&mut self, direction: Direction) {
        self.journal.push(SimEvent::Pressed(direction));
        let delta = direction.delta();
        let target = (self.player.0 + delta.0, self.player.1 + delta.1);
        if self.tile_at(target).is_blocking() {
            return;
        }
        if self.npcs.iter().any(|npc| npc.at == target) {
            return;
        }
        if let Some(phantom) = self.phantoms.iter_mut().find(|p| p.cell == target) {
            if phantom.active() {
                if let Some(n) = phantom.blocks_remaining.as_mut() {
                    *n -= 1;
                }
                return;
            }
        }
        self.player = target;
    }

    fn move_cursor(&mut self, to: Point, _duration: Duration) {
        self.cursor = to;
    }

    fn click(&mut self) {
        self.journal.push(SimEvent::Clicked(self.cursor));
    }

    fn double_click(&mut self) {
        self.journal.push(SimEvent::DoubleClicked(self.cursor));
        if !self.furnace_lit && self.cursor == self.screen.furnace_light_click {
            self.furnace_lit = true;
            return;
        }
        if self.menu_open {
            let entry = Rect::new(self.entry_at.0, self.entry_at.1, 12, 8);
            if entry.contains(self.cursor) {
                if self.item_count(&self.tasks.ingot_item) > 0 {
                    let ingot = self.tasks.ingot_item.clone();
                    let product = self.tasks.forge_item.clone();
                    *self.items.entry(ingot).or_insert(1) -= 1;
                    *self.items.entry(product).or_insert(0) += 1;
                }
                self.menu_open = false;
            }
        }
    }

    fn drag(&mut self, to: Point, _duration: Duration) {
        self.journal.push(SimEvent::Dragged(to));
        self.cursor = to;
    }

    fn pause(&mut self, duration: Duration) {
        self.journal.push(SimEvent::Paused(duration));
    }

    fn quit_application(&mut self) {
        self.quit = true;
        self.journal.push(SimEvent::QuitRequested);
    }
}

impl Inventory for SimBackend {
    fn find_item(&mut self, item: &str) -> Option<Point> {
        if self.visible_count(item) > 0 {
            Some(ITEM_POINT)
        } else {
            None
        }
    }

    fn use_item(&mut self, item: &str, target: Option<Point>) -> bool {
        if self.visible_count(item) == 0 {
            return false;
        }
        self.journal.push(SimEvent::Used {
            item: item.to_string(),
            target,
        });
        self.apply_item(item);
        true
    }

    fn reorganize(&mut self) {
        self.journal.push(SimEvent::Reorganized);
    }
}

impl Commerce for SimBackend {
    fn buy(&mut self, item: &str, merchant: Merchant) -> Result<(), CommerceError> {
        if self.fail_purchases {
            return Err(CommerceError {
                item: item.to_string(),
                merchant,
            });
        }
        *self.items.entry(item.to_string()).or_insert(0) += 1;
        self.journal.push(SimEvent::Bought {
            item: item.to_string(),
            merchant,
        });
        Ok(())
    }

    fn sell(&mut self, item: &str, merchant: Merchant) -> u32 {
        let available = self.visible_count(item);
        let sold = available.min(SALE_BATCH);
        if sold > 0 {
            self.items.insert(item.to_string(), available - sold);
            self.weight -= sold as i64 * ORE_WEIGHT;
            // Moving stock out uncovers whatever it was burying.
            self.obscured.clear();
        }
        self.journal.push(SimEvent::Sold {
            item: item.to_string(),
            merchant,
            count: sold,
        });
        sold
    }
}
