//! The production loop: mine ore, smelt it down, forge and sell the product.
//!
//! Each activation runs one task step and names the task to run next, so the
//! agent can always re-check vitals and inventory between steps. Transient
//! failures bump a per-task error counter; a task that keeps failing takes
//! the whole run down with [`FatalError::TaskErrorCap`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agent::Agent;
use crate::error::FatalError;
use crate::geom::{Direction, Point};
use crate::interface::{Backend, Merchant};
use crate::nav::Navigator;
use crate::ui;

/// One stage of the production cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Mine,
    Smelt,
    Forge,
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::Mine => "mine",
            Task::Smelt => "smelt",
            Task::Forge => "forge",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Task {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mine" => Ok(Task::Mine),
            "smelt" => Ok(Task::Smelt),
            "forge" => Ok(Task::Forge),
            other => Err(format!(
                "unknown task {other:?}, expected mine, smelt, or forge"
            )),
        }
    }
}

/// Consecutive-failure counts, one per task.
#[derive(Debug, Default)]
pub struct TaskCounters {
    mine: u32,
    smelt: u32,
    forge: u32,
}

impl TaskCounters {
    fn slot(&mut self, task: Task) -> &mut u32 {
        match task {
            Task::Mine => &mut self.mine,
            Task::Smelt => &mut self.smelt,
            Task::Forge => &mut self.forge,
        }
    }

    /// Record one failure and return the new count.
    pub fn bump(&mut self, task: Task) -> u32 {
        let slot = self.slot(task);
        *slot += 1;
        *slot
    }

    pub fn reset(&mut self, task: Task) {
        *self.slot(task) = 0;
    }

    pub fn get(&self, task: Task) -> u32 {
        match task {
            Task::Mine => self.mine,
            Task::Smelt => self.smelt,
            Task::Forge => self.forge,
        }
    }
}

impl<B: Backend> Agent<B> {
    /// Swing at the current rock, or line up a new one first.
    ///
    /// Hands over to smelting once the carry weight gets close to the limit.
    pub(crate) fn run_mine(&mut self) -> Result<Task, FatalError> {
        let tasks = self.config.tasks.clone();
        if self.capacity_headroom()? < tasks.mine_weight_margin {
            info!("carry weight near the limit, moving to the furnace");
            return Ok(Task::Smelt);
        }
        if self.backend.find_item(&tasks.mine_tool).is_none() {
            self.restock(&tasks.mine_tool, Merchant::Blacksmith)?;
            // The detour to the smith leaves any cached target stale.
            self.mine_click = None;
        }
        let mut click = self.current_target()?;
        // A complaint from the last swing means the rock face is spent.
        if self.chat_shows(ui::NOTHING_TO_MINE)? || self.chat_shows(ui::CANNOT_MINE_THERE)? {
            info!("rock face is spent, lining up another");
            self.mine_click = None;
            click = self.current_target()?;
        }
        if !self.backend.use_item(&tasks.mine_tool, Some(click)) {
            self.note_task_error(Task::Mine)?;
            return Ok(Task::Mine);
        }
        self.counters.reset(Task::Mine);
        Ok(Task::Mine)
    }

    /// The cached swing point, walking to a fresh rock face if none is lined
    /// up.
    fn current_target(&mut self) -> Result<Point, FatalError> {
        match self.mine_click {
            Some(click) => Ok(click),
            None => {
                let click = self.acquire_target()?;
                self.mine_click = Some(click);
                Ok(click)
            }
        }
    }

    /// Feed ore into the furnace, lighting it first if it has gone cold.
    ///
    /// Hands over to forging once the ore runs out.
    pub(crate) fn run_smelt(&mut self) -> Result<Task, FatalError> {
        let tasks = self.config.tasks.clone();
        let furnace = self.config.stations.furnace;
        self.navigator().travel_to(furnace)?;
        if self.backend.find_item(&tasks.ore_item).is_none() {
            info!("ore exhausted, moving to the anvil");
            return Ok(Task::Forge);
        }
        if self.furnace_is_cold()? {
            info!("furnace is cold, lighting it");
            let light_at = self.config.screen.furnace_light_click;
            let glide = self.config.screen.cursor_glide();
            self.backend.move_cursor(light_at, glide);
            self.backend.double_click();
            self.backend.pause(tasks.furnace_light_settle());
        }
        let furnace_click = self.config.screen.furnace_click;
        if !self.backend.use_item(&tasks.ore_item, Some(furnace_click)) {
            self.note_task_error(Task::Smelt)?;
            return Ok(Task::Smelt);
        }
        self.counters.reset(Task::Smelt);
        Ok(Task::Smelt)
    }

    /// Work an ingot at the anvil through the blacksmith menu.
    ///
    /// Sells finished stock when the ingots run out, then hands back to
    /// mining.
    pub(crate) fn run_forge(&mut self) -> Result<Task, FatalError> {
        let tasks = self.config.tasks.clone();
        if self.capacity_headroom()? < tasks.forge_weight_margin {
            info!("carry weight near the limit, selling stock");
            self.sell_stock()?;
        }
        if self.backend.find_item(&tasks.forge_tool).is_none() {
            // Finished stock piles over the tool slots; selling uncovers them.
            self.sell_stock()?;
            if self.backend.find_item(&tasks.forge_tool).is_none() {
                self.restock(&tasks.forge_tool, Merchant::Blacksmith)?;
            }
        }
        let anvil = self.config.stations.anvil;
        self.navigator().travel_to(anvil)?;
        let mut ingot_at = self.backend.find_item(&tasks.ingot_item);
        if ingot_at.is_none() {
            info!("no ingots in sight, selling stock");
            self.sell_stock()?;
            self.navigator().travel_to(anvil)?;
            // Stock buries ingots too, so only a post-sale check is final.
            ingot_at = self.backend.find_item(&tasks.ingot_item);
            if ingot_at.is_none() {
                info!("ingots really are gone, back to the rock face");
                return Ok(Task::Mine);
            }
        }
        if !self.backend.use_item(&tasks.forge_tool, ingot_at) {
            self.note_task_error(Task::Forge)?;
            return Ok(Task::Forge);
        }
        if self.await_ui(ui::BLACKSMITH_MENU)?.is_none() {
            warn!("blacksmith menu never opened");
            self.note_task_error(Task::Forge)?;
            return Ok(Task::Forge);
        }
        self.counters.reset(Task::Forge);
        let entry_at = self
            .await_ui(&tasks.forge_item)?
            .ok_or_else(|| FatalError::UiElementMissing {
                name: tasks.forge_item.clone(),
                attempts: self.config.tasks.ui_wait_attempts,
            })?;
        let offset = self.config.screen.menu_item_offset;
        let glide = self.config.screen.cursor_glide();
        self.backend
            .move_cursor((entry_at.0 + offset.0, entry_at.1 + offset.1), glide);
        self.backend.double_click();
        Ok(Task::Forge)
    }

    /// Sell every finished product at the weapon shop.
    ///
    /// Stock can bury the position fix item, which rules out a coordinate
    /// read and with it any navigated walk. The fallback shuffles blind
    /// toward the counter and takes the shop cell on faith; the next
    /// navigated walk re-reads the coordinates and heals the drift.
    pub(crate) fn sell_stock(&mut self) -> Result<(), FatalError> {
        let weapons = self.config.stations.weapons;
        let fix_item = self.config.map.position_fix_item.clone();
        if self.backend.find_item(&fix_item).is_some() {
            self.navigator().travel_to(weapons)?;
        } else {
            info!("position fix item is buried, sidestepping to the counter");
            let step = self.config.nav.step_delay();
            for _ in 0..self.config.tasks.sidestep_count {
                self.backend.press(Direction::Left);
                self.backend.pause(step);
            }
            self.world.place_player(weapons);
        }
        let product = self.config.tasks.forge_item.clone();
        loop {
            let sold = self.backend.sell(&product, Merchant::Weapons);
            if sold == 0 {
                break;
            }
            info!(count = sold, item = %product, "sold stock");
        }
        Ok(())
    }

    /// Walk to the merchant and buy a replacement.
    pub(crate) fn restock(&mut self, item: &str, merchant: Merchant) -> Result<(), FatalError> {
        let station = self.config.stations.for_merchant(merchant);
        self.navigator().travel_to(station)?;
        self.backend.buy(item, merchant)?;
        info!(item, "restocked from the merchant");
        Ok(())
    }

    pub(crate) fn navigator(&mut self) -> Navigator<'_, B> {
        Navigator::new(
            &mut self.world,
            &mut self.classifier,
            &mut self.backend,
            &self.config,
        )
    }

    fn acquire_target(&mut self) -> Result<Point, FatalError> {
        let mut navigator = Navigator::new(
            &mut self.world,
            &mut self.classifier,
            &mut self.backend,
            &self.config,
        );
        navigator.acquire_mining_target(&mut self.rng)
    }

    fn note_task_error(&mut self, task: Task) -> Result<(), FatalError> {
        let count = self.counters.bump(task);
        warn!(%task, count, "activation failed, will retry");
        if count >= self.config.tasks.task_error_cap {
            return Err(FatalError::TaskErrorCap { task, count });
        }
        Ok(())
    }

    /// Whether the chat strip currently shows the named message.
    fn chat_shows(&mut self, name: &str) -> Result<bool, FatalError> {
        let region = self.config.screen.chat_region;
        let template = self.ui.get(name).ok_or_else(|| FatalError::UiElementMissing {
            name: name.to_string(),
            attempts: 0,
        })?;
        Ok(ui::region_shows(&mut self.backend, region, template))
    }

    fn furnace_is_cold(&mut self) -> Result<bool, FatalError> {
        let region = self.config.screen.furnace_region;
        let template = self
            .ui
            .get(ui::COLD_FURNACE)
            .ok_or_else(|| FatalError::UiElementMissing {
                name: ui::COLD_FURNACE.to_string(),
                attempts: 0,
            })?;
        Ok(ui::region_shows(&mut self.backend, region, template))
    }

    /// Poll for a UI element until it shows or the attempt budget runs out.
    fn await_ui(&mut self, name: &str) -> Result<Option<Point>, FatalError> {
        let neutral = self.config.screen.neutral_point;
        let attempts = self.config.tasks.ui_wait_attempts;
        let delay = self.config.nav.ui_poll();
        let template = self.ui.get(name).ok_or_else(|| FatalError::UiElementMissing {
            name: name.to_string(),
            attempts: 0,
        })?;
        Ok(ui::wait_for(
            &mut self.backend,
            template,
            neutral,
            attempts,
            delay,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::interface::{Frame, Inventory};
    use crate::sim::{SimBackend, SimEvent};
    use crate::tile::Tile;

    fn agent_with(setup: impl FnOnce(&mut SimBackend)) -> Agent<SimBackend> {
        let config = AgentConfig::simulation();
        let mut backend = SimBackend::new(&config);
        setup(&mut backend);
        let library = backend.signature_library();
        let catalog = backend.ui_catalog();
        let mut agent = Agent::new(config, backend, library, catalog);
        agent.bootstrap().expect("bootstrap succeeds");
        agent.backend_mut().clear_journal();
        agent
    }

    /// Rock face with a gravel stand cell just west of it.
    fn place_rock(backend: &mut SimBackend, rock: (i32, i32)) {
        backend.set_tile(rock, Tile::Mountain);
        backend.set_tile((rock.0 - 1, rock.1), Tile::Gravel);
    }

    #[test]
    fn test_task_parsing_and_display() {
        assert_eq!("MINE".parse::<Task>().unwrap(), Task::Mine);
        assert_eq!("Smelt".parse::<Task>().unwrap(), Task::Smelt);
        assert_eq!("forge".parse::<Task>().unwrap(), Task::Forge);
        assert!("plough".parse::<Task>().unwrap_err().contains("unknown task"));
        assert_eq!(Task::Smelt.to_string(), "smelt");
        assert_eq!(serde_json::to_string(&Task::Mine).unwrap(), "\"mine\"");
    }

    #[test]
    fn test_counters_track_per_task() {
        let mut counters = TaskCounters::default();
        assert_eq!(counters.bump(Task::Forge), 1);
        assert_eq!(counters.bump(Task::Forge), 2);
        assert_eq!(counters.bump(Task::Mine), 1);
        assert_eq!(counters.get(Task::Forge), 2);
        counters.reset(Task::Forge);
        assert_eq!(counters.get(Task::Forge), 0);
        assert_eq!(counters.get(Task::Mine), 1);
    }

    #[test]
    fn test_mine_hands_over_to_smelt_when_nearly_full() {
        let mut agent = agent_with(|sim| {
            sim.set_weight(380, 400);
        });
        assert_eq!(agent.run_mine().unwrap(), Task::Smelt);
        // The diversion happens before any walk to a rock.
        assert!(agent.backend().journal().is_empty());
    }

    #[test]
    fn test_mine_swings_at_acquired_rock() {
        let mut agent = agent_with(|sim| {
            sim.set_player((18, 20));
            place_rock(sim, (20, 20));
        });
        assert_eq!(agent.run_mine().unwrap(), Task::Mine);
        let ore = agent.config.tasks.ore_item.clone();
        assert_eq!(agent.backend().item_count(&ore), 1);
        assert_eq!(agent.mine_click, Some(agent.config.screen.mine_click));
        // The cached target is reused without another walk.
        assert_eq!(agent.run_mine().unwrap(), Task::Mine);
        assert_eq!(agent.backend().item_count(&ore), 2);
    }

    #[test]
    fn test_mine_restocks_missing_pickaxe() {
        let mut agent = agent_with(|sim| {
            sim.stock_item("pickaxe", 0);
            place_rock(sim, (36, 24));
        });
        assert_eq!(agent.run_mine().unwrap(), Task::Mine);
        let pick = agent.config.tasks.mine_tool.clone();
        assert!(agent.backend().journal().contains(&SimEvent::Bought {
            item: pick,
            merchant: Merchant::Blacksmith,
        }));
        // The walk to the smith dropped the old target, so the swing that
        // follows found a fresh rock out by the range.
        let ore = agent.config.tasks.ore_item.clone();
        assert_eq!(agent.backend().item_count(&ore), 1);
        assert_eq!(agent.world().player(), (35, 24));
    }

    #[test]
    fn test_mine_retargets_when_chat_complains() {
        let mut agent = agent_with(|sim| {
            sim.set_player((18, 20));
            place_rock(sim, (20, 20));
            place_rock(sim, (36, 24));
        });
        let ore = agent.config.tasks.ore_item.clone();
        assert_eq!(agent.run_mine().unwrap(), Task::Mine);
        assert_eq!(agent.backend().item_count(&ore), 1);
        // The rock face collapses; the cached target still gets one swing,
        // which only draws a complaint in chat.
        agent.backend_mut().set_tile((20, 20), Tile::Accessible);
        assert_eq!(agent.run_mine().unwrap(), Task::Mine);
        assert_eq!(agent.backend().item_count(&ore), 1);
        // A fresh look shows the face gone, and the complaint sends the
        // agent out to the range before the next swing.
        agent.bootstrap().unwrap();
        assert_eq!(agent.run_mine().unwrap(), Task::Mine);
        assert_eq!(agent.backend().item_count(&ore), 2);
        assert_eq!(agent.world().player(), (35, 24));
    }

    #[test]
    fn test_smelt_without_ore_moves_to_forge() {
        let mut agent = agent_with(|_| {});
        assert_eq!(agent.run_smelt().unwrap(), Task::Forge);
        // The walk to the furnace still happens; feeding it does not.
        assert_eq!(agent.world().player(), agent.config.stations.furnace);
        let ore = agent.config.tasks.ore_item.clone();
        let fed = agent
            .backend()
            .journal()
            .iter()
            .any(|event| matches!(event, SimEvent::Used { item, .. } if *item == ore));
        assert!(!fed);
    }

    #[test]
    fn test_smelt_lights_cold_furnace_once() {
        let mut agent = agent_with(|sim| {
            sim.stock_item("ore", 2);
        });
        assert_eq!(agent.run_smelt().unwrap(), Task::Smelt);
        let light_at = agent.config.screen.furnace_light_click;
        let lights: Vec<_> = agent
            .backend()
            .journal()
            .iter()
            .filter(|event| **event == SimEvent::DoubleClicked(light_at))
            .collect();
        assert_eq!(lights.len(), 1);
        assert!(agent.backend().furnace_lit());
        assert_eq!(agent.backend().item_count("ingot"), 1);

        // Second batch: furnace already lit, no second lighting click.
        assert_eq!(agent.run_smelt().unwrap(), Task::Smelt);
        let lights: Vec<_> = agent
            .backend()
            .journal()
            .iter()
            .filter(|event| **event == SimEvent::DoubleClicked(light_at))
            .collect();
        assert_eq!(lights.len(), 1);
        assert_eq!(agent.backend().item_count("ore"), 0);
        assert_eq!(agent.backend().item_count("ingot"), 2);
    }

    #[test]
    fn test_forge_works_an_ingot_through_the_menu() {
        let mut agent = agent_with(|sim| {
            sim.stock_item("ingot", 1);
        });
        assert_eq!(agent.run_forge().unwrap(), Task::Forge);
        assert_eq!(agent.backend().item_count("ingot"), 0);
        assert_eq!(agent.backend().item_count("dagger"), 1);
        assert!(!agent.backend().blacksmith_menu_open());
        assert_eq!(agent.world().player(), agent.config.stations.anvil);
    }

    #[test]
    fn test_forge_without_ingots_sells_and_returns_to_mining() {
        let mut agent = agent_with(|sim| {
            sim.stock_item("dagger", 2);
        });
        assert_eq!(agent.run_forge().unwrap(), Task::Mine);
        let product = agent.config.tasks.forge_item.clone();
        assert!(agent.backend().journal().contains(&SimEvent::Sold {
            item: product,
            merchant: Merchant::Weapons,
            count: 2,
        }));
        assert_eq!(agent.backend().item_count("dagger"), 0);
    }

    #[test]
    fn test_sell_walks_to_the_shop_when_the_fix_item_is_visible() {
        let mut agent = agent_with(|sim| {
            sim.stock_item("dagger", 2);
        });
        agent.sell_stock().unwrap();
        assert!(agent.backend().journal().contains(&SimEvent::Sold {
            item: "dagger".to_string(),
            merchant: Merchant::Weapons,
            count: 2,
        }));
        // The walk was navigated, so every step re-read the coordinates and
        // belief and truth agree on arrival.
        assert!(agent.backend().journal().contains(&SimEvent::Used {
            item: "sextant".to_string(),
            target: None,
        }));
        assert_eq!(agent.world().player(), agent.config.stations.weapons);
        assert_eq!(agent.backend().player(), agent.config.stations.weapons);
    }

    #[test]
    fn test_sell_sidesteps_blind_when_the_fix_item_is_buried() {
        let mut agent = agent_with(|sim| {
            // Already at the shop from the last trip.
            sim.set_player((10, 10));
            sim.stock_item("dagger", 1);
        });
        agent.backend_mut().obscure_item("sextant");
        agent.sell_stock().unwrap();
        let lefts = agent
            .backend()
            .journal()
            .iter()
            .filter(|event| **event == SimEvent::Pressed(Direction::Left))
            .count();
        assert_eq!(lefts as u32, agent.config.tasks.sidestep_count);
        // The shop cell is assumed rather than read, so belief and truth
        // drift apart until the next navigated walk re-fixes the position.
        assert_eq!(agent.world().player(), agent.config.stations.weapons);
        let weapons = agent.config.stations.weapons;
        assert_eq!(
            agent.backend().player(),
            (weapons.0 - agent.config.tasks.sidestep_count as i32, weapons.1)
        );
        // Selling the stock uncovered the sextant again.
        assert!(agent.backend_mut().find_item("sextant").is_some());
    }

    #[test]
    fn test_forge_uncovers_buried_hammer_by_selling() {
        let mut agent = agent_with(|sim| {
            sim.stock_item("ingot", 1);
            sim.stock_item("dagger", 3);
            sim.obscure_item("hammer");
        });
        assert_eq!(agent.run_forge().unwrap(), Task::Forge);
        let journal = agent.backend().journal();
        assert!(journal.contains(&SimEvent::Sold {
            item: "dagger".to_string(),
            merchant: Merchant::Weapons,
            count: 3,
        }));
        // The hammer turned up after the sale, so no replacement was bought.
        assert!(!journal
            .iter()
            .any(|event| matches!(event, SimEvent::Bought { .. })));
        assert_eq!(agent.backend().item_count("dagger"), 1);
    }

    #[test]
    fn test_forge_missing_menu_entry_is_fatal() {
        let config = AgentConfig::simulation();
        let mut backend = SimBackend::new(&config);
        backend.stock_item("ingot", 1);
        let library = backend.signature_library();
        let mut catalog = backend.ui_catalog();
        // A template nothing ever draws: the menu opens, the entry never
        // shows up in it.
        catalog.register("dagger", Frame::filled(6, 6, 7));
        let mut agent = Agent::new(config, backend, library, catalog);
        agent.bootstrap().expect("bootstrap succeeds");
        match agent.run_forge() {
            Err(FatalError::UiElementMissing { name, attempts }) => {
                assert_eq!(name, "dagger");
                assert_eq!(attempts, agent.config.tasks.ui_wait_attempts);
            }
            other => panic!("expected a missing menu entry, got {other:?}"),
        }
    }

    #[test]
    fn test_forge_jam_exhausts_error_budget() {
        let mut agent = agent_with(|sim| {
            sim.stock_item("ingot", 1);
            sim.jam_blacksmith_menu(true);
        });
        let cap = agent.config.tasks.task_error_cap;
        for round in 1..cap {
            assert_eq!(agent.run_forge().unwrap(), Task::Forge);
            assert_eq!(agent.counters.get(Task::Forge), round);
        }
        match agent.run_forge() {
            Err(FatalError::TaskErrorCap { task, count }) => {
                assert_eq!(task, Task::Forge);
                assert_eq!(count, cap);
            }
            other => panic!("expected task error cap, got {other:?}"),
        }
    }

    #[test]
    fn test_forge_error_counter_resets_on_success() {
        let mut agent = agent_with(|sim| {
            sim.stock_item("ingot", 3);
            sim.jam_blacksmith_menu(true);
        });
        assert_eq!(agent.run_forge().unwrap(), Task::Forge);
        assert_eq!(agent.run_forge().unwrap(), Task::Forge);
        assert_eq!(agent.counters.get(Task::Forge), 2);

        agent.backend_mut().jam_blacksmith_menu(false);
        assert_eq!(agent.run_forge().unwrap(), Task::Forge);
        assert_eq!(agent.counters.get(Task::Forge), 0);

        // A fresh jam gets the full budget again.
        agent.backend_mut().jam_blacksmith_menu(true);
        for round in 1..agent.config.tasks.task_error_cap {
            assert_eq!(agent.run_forge().unwrap(), Task::Forge);
            assert_eq!(agent.counters.get(Task::Forge), round);
        }
    }

    #[test]
    fn test_restock_failure_is_fatal() {
        let mut agent = agent_with(|sim| {
            sim.stock_item("pickaxe", 0);
            sim.fail_purchases(true);
        });
        match agent.run_mine() {
            Err(FatalError::Purchase(err)) => {
                assert_eq!(err.item, "pickaxe");
            }
            other => panic!("expected purchase failure, got {other:?}"),
        }
    }
}
