//! Top-level agent: owns the backend, the belief map, and the task loop.
//!
//! One activation is one pass through [`Agent::run_cycle`]: tidy the
//! inventory, check vitals on the configured interval, run the current task
//! for a single step, and adopt whatever task it names next. Fatal errors
//! unwind straight through to the caller; nothing here tries to limp on past
//! one.

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classifier::TileClassifier;
use crate::config::AgentConfig;
use crate::error::FatalError;
use crate::geom::{Point, Rect};
use crate::interface::{Backend, Charset};
use crate::signature::SignatureLibrary;
use crate::tasks::{Task, TaskCounters};
use crate::ui::UiCatalog;
use crate::world::WorldMap;

pub struct Agent<B: Backend> {
    pub(crate) config: AgentConfig,
    pub(crate) backend: B,
    pub(crate) world: WorldMap,
    pub(crate) classifier: TileClassifier,
    pub(crate) ui: UiCatalog,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) task: Task,
    pub(crate) counters: TaskCounters,
    /// Screen point of the rock currently being worked, if any.
    pub(crate) mine_click: Option<Point>,
    activations: u64,
    run_id: Uuid,
}

impl<B: Backend> Agent<B> {
    pub fn new(config: AgentConfig, backend: B, library: SignatureLibrary, ui: UiCatalog) -> Self {
        let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
        let run_id = Uuid::new_v4();
        info!(%run_id, seed, "agent created");
        let world = WorldMap::new(config.map.clone(), config.screen.clone());
        Self {
            world,
            classifier: TileClassifier::new(library),
            ui,
            rng: ChaCha8Rng::seed_from_u64(seed),
            task: Task::Mine,
            counters: TaskCounters::default(),
            mine_click: None,
            activations: 0,
            run_id,
            config,
            backend,
        }
    }

    /// First fix on the world: read the coordinate readout, then take a first
    /// look out the window.
    pub fn bootstrap(&mut self) -> Result<(), FatalError> {
        info!(run_id = %self.run_id, task = %self.task, "getting a first fix");
        self.world.update_agent_position(&mut self.backend)?;
        self.world.update(&mut self.classifier, &mut self.backend);
        Ok(())
    }

    /// Run until a fatal error, or for `cycles` activations when given.
    pub fn run(&mut self, cycles: Option<u64>) -> Result<(), FatalError> {
        self.bootstrap()?;
        let mut remaining = cycles;
        loop {
            if let Some(n) = remaining.as_mut() {
                if *n == 0 {
                    info!(activations = self.activations, "cycle budget spent");
                    return Ok(());
                }
                *n -= 1;
            }
            self.run_cycle()?;
        }
    }

    /// One activation of the current task.
    pub fn run_cycle(&mut self) -> Result<(), FatalError> {
        self.activations += 1;
        debug!(activation = self.activations, task = %self.task, "activation");
        self.backend.reorganize();
        let interval = self.config.tasks.health_check_interval;
        if interval > 0 && self.activations % interval == 0 {
            self.check_vitals()?;
        }
        let current = self.task;
        let next = match current {
            Task::Mine => self.run_mine()?,
            Task::Smelt => self.run_smelt()?,
            Task::Forge => self.run_forge()?,
        };
        if next != current {
            info!(from = %current, to = %next, "task handover");
        }
        self.task = next;
        let settle = match current {
            Task::Mine => Duration::ZERO,
            Task::Smelt => Duration::from_millis(self.config.tasks.smelt_delay_ms),
            Task::Forge => Duration::from_millis(self.config.tasks.forge_delay_ms),
        };
        if !settle.is_zero() {
            self.backend.pause(settle);
        }
        Ok(())
    }

    /// Drink a recovery draught when health has dropped below the floor.
    pub(crate) fn check_vitals(&mut self) -> Result<(), FatalError> {
        let health = self.read_health()?;
        if health >= self.config.tasks.low_health as i64 {
            return Ok(());
        }
        warn!(health, "health low, drinking a recovery draught");
        let item = self.config.tasks.recovery_item.clone();
        if !self.backend.use_item(&item, None) {
            return Err(FatalError::NoRecoveryItems);
        }
        self.backend.pause(self.config.tasks.recovery_settle());
        Ok(())
    }

    fn read_health(&mut self) -> Result<i64, FatalError> {
        let region = self.config.screen.health_region;
        Ok(self.read_hud_ratio(region, "health")?.0)
    }

    /// Carry weight still available before the bag is full.
    pub(crate) fn capacity_headroom(&mut self) -> Result<i64, FatalError> {
        let region = self.config.screen.weight_region;
        let (current, max) = self.read_hud_ratio(region, "weight")?;
        Ok(max - current)
    }

    /// Read a `current/max` readout, retrying through transient OCR noise.
    fn read_hud_ratio(&mut self, region: Rect, what: &'static str) -> Result<(i64, i64), FatalError> {
        let neutral = self.config.screen.neutral_point;
        let cap = self.config.tasks.hud_retry_cap;
        for attempt in 1..=cap {
            // The cursor tooltip can sit over the readout; park it first.
            self.backend.move_cursor(neutral, Duration::ZERO);
            match self.backend.extract_text(region, Charset::Digits) {
                Ok(text) => match parse_ratio(&text) {
                    Some(ratio) => return Ok(ratio),
                    None => warn!(attempt, what, %text, "unreadable ratio"),
                },
                Err(err) => warn!(attempt, what, %err, "readout failed"),
            }
        }
        Err(FatalError::HudRead {
            what,
            attempts: cap,
        })
    }

    pub fn set_task(&mut self, task: Task) {
        self.task = task;
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn world(&self) -> &WorldMap {
        &self.world
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

fn parse_ratio(text: &str) -> Option<(i64, i64)> {
    let (current, max) = text.trim().split_once('/')?;
    Some((current.trim().parse().ok()?, max.trim().parse().ok()?))
}
