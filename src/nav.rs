//! Step-by-step navigation over the belief map.
//!
//! Travel replans from scratch after every step: the world keeps moving while
//! the agent walks, so a path is only trusted for its first cell. Planning
//! failures trigger a fresh window observation before the next attempt, and
//! both failure ladders (no path, no movement) bottom out in a fatal error
//! with a belief-map dump for the post-mortem.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, error, info, trace, warn};

use crate::classifier::TileClassifier;
use crate::config::AgentConfig;
use crate::error::FatalError;
use crate::geom::{Cell, Direction, Point};
use crate::interface::Backend;
use crate::pathfind::find_path;
use crate::tile::Tile;
use crate::world::WorldMap;

/// Borrowed view over everything one journey needs.
pub struct Navigator<'a, B: Backend> {
    world: &'a mut WorldMap,
    classifier: &'a mut TileClassifier,
    backend: &'a mut B,
    config: &'a AgentConfig,
}

impl<'a, B: Backend> Navigator<'a, B> {
    pub fn new(
        world: &'a mut WorldMap,
        classifier: &'a mut TileClassifier,
        backend: &'a mut B,
        config: &'a AgentConfig,
    ) -> Self {
        Self {
            world,
            classifier,
            backend,
            config,
        }
    }

    /// Walk to `destination`, retrying through transient obstructions.
    /// Returns only on arrival or a fatal error.
    pub fn travel_to(&mut self, destination: Cell) -> Result<(), FatalError> {
        self.travel(destination, false).map(|_| ())
    }

    /// Walk to `destination` in the mining context: the first planning
    /// failure returns `Ok(false)` so the caller can pick another rock.
    pub fn try_travel_to(&mut self, destination: Cell) -> Result<bool, FatalError> {
        self.travel(destination, true)
    }

    fn travel(&mut self, destination: Cell, mining: bool) -> Result<bool, FatalError> {
        if self.world.player() == destination {
            return Ok(true);
        }
        debug!(from = ?self.world.player(), to = ?destination, mining, "traveling");
        let mut failures = 0u32;
        let mut stalls = 0u32;
        while self.world.player() != destination {
            let start = self.world.player();
            let Some(path) = find_path(self.world, start, destination) else {
                failures += 1;
                warn!(from = ?start, to = ?destination, failures, "no path, refreshing the map");
                self.world.update(self.classifier, self.backend);
                if mining {
                    return Ok(false);
                }
                if failures >= self.config.nav.path_failure_cap {
                    error!(from = ?start, to = ?destination, "no path after repeated refreshes");
                    self.dump_map();
                    return Err(FatalError::PathExhausted {
                        from: start,
                        to: destination,
                        attempts: failures,
                    });
                }
                if let Some(occupant) = self.world.get(destination).filter(|tile| tile.is_actor())
                {
                    self.wait_for_vacancy(destination, occupant)?;
                }
                continue;
            };
            failures = 0;
            let Some(&next) = path.first() else {
                continue;
            };
            self.step(next)?;
            if self.world.player() == start {
                stalls += 1;
                if stalls >= self.config.nav.stall_cap {
                    error!(at = ?start, stalls, "steps keep moving nowhere");
                    self.dump_map();
                    return Err(FatalError::Stuck {
                        at: start,
                        attempts: stalls,
                    });
                }
            } else {
                stalls = 0;
            }
        }
        debug!(at = ?destination, "arrived");
        Ok(true)
    }

    /// Dispatch one unit move, then re-fix the position and re-observe.
    fn step(&mut self, next: Cell) -> Result<(), FatalError> {
        let at = self.world.player();
        let delta = (next.0 - at.0, next.1 - at.1);
        let Some(direction) = Direction::from_delta(delta) else {
            error!(from = ?at, to = ?next, "planner produced a non-adjacent step");
            return Err(FatalError::InvalidStep { from: at, to: next });
        };
        trace!(?direction, from = ?at, "stepping");
        self.backend.press(direction);
        self.backend.pause(self.config.nav.step_delay());
        self.world.update_agent_position(self.backend)?;
        self.world.update(self.classifier, self.backend);
        Ok(())
    }

    /// Poll for an actor squatting on the destination to wander off.
    fn wait_for_vacancy(&mut self, cell: Cell, occupant: Tile) -> Result<(), FatalError> {
        let cap = self.config.nav.obstacle_poll_cap;
        for poll in 1..=cap {
            info!(?occupant, ?cell, poll, "destination is occupied, waiting");
            self.backend.pause(self.config.nav.obstacle_poll());
            self.world.update(self.classifier, self.backend);
            if !self.world.get(cell).is_some_and(|tile| tile.is_actor()) {
                debug!(?cell, poll, "destination cleared");
                return Ok(());
            }
        }
        error!(?occupant, ?cell, polls = cap, "occupant never moved");
        Err(FatalError::ObstacleNeverMoved {
            cell,
            tile: occupant,
            polls: cap,
        })
    }

    /// Walk the agent to a randomly drawn rock face and return the screen
    /// point where the rock is worked.
    ///
    /// Rocks are drawn from the visibility window; when none are in sight the
    /// agent returns to the configured range station and rescans. Re-drawing
    /// the rock that just failed re-rolls while alternatives exist, and walks
    /// back to the range station when it was the only one.
    pub fn acquire_mining_target(&mut self, rng: &mut ChaCha8Rng) -> Result<Point, FatalError> {
        let rule = self.config.map.resource_rule.clone();
        let delta = rule.support_side.delta();
        let range_station = self.config.stations.mountain_range;
        let mut last: Option<Cell> = None;
        let mut searches = 0u32;
        loop {
            searches += 1;
            let mut rocks = self.world.visible_matching(rule.resource_tile);
            if rocks.is_empty() {
                info!(station = ?range_station, "no rock in sight, returning to the range");
                self.travel(range_station, false)?;
                rocks = self.world.visible_matching(rule.resource_tile);
                if rocks.is_empty() {
                    error!(searches, "no minable rock in sight even at the range");
                    return Err(FatalError::NoMiningTargets { attempts: searches });
                }
            }
            let rock = rocks[rng.gen_range(0..rocks.len())];
            let mut stand = (rock.0 + delta.0, rock.1 + delta.1);
            if last == Some(stand) {
                if rocks.len() > 1 {
                    continue;
                }
                info!("the only rock in sight just failed, returning to the range");
                stand = range_station;
            }
            last = Some(stand);
            debug!(?rock, ?stand, "walking to a rock face");
            if self.travel(stand, true)? {
                info!(at = ?self.world.player(), "standing at a rock face");
                return Ok(self.config.screen.mine_click);
            }
            warn!(?stand, "could not reach the rock, picking another");
        }
    }

    fn dump_map(&self) {
        let path = &self.config.map_dump_path;
        match self.world.write_debug_dump(path) {
            Ok(()) => info!(path = %path.display(), "belief map dumped"),
            Err(err) => warn!(error = %err, "could not dump the belief map"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    use crate::config::AgentConfig;
    use crate::sim::{SimBackend, SimEvent};

    fn setup(config: &AgentConfig) -> (SimBackend, WorldMap, TileClassifier) {
        let sim = SimBackend::new(config);
        let world = WorldMap::new(config.map.clone(), config.screen.clone());
        let classifier = TileClassifier::new(sim.signature_library());
        (sim, world, classifier)
    }

    fn observe(world: &mut WorldMap, classifier: &mut TileClassifier, sim: &mut SimBackend) {
        world.update_agent_position(sim).unwrap();
        world.update(classifier, sim);
    }

    fn pressed(sim: &SimBackend) -> Vec<Direction> {
        sim.journal()
            .iter()
            .filter_map(|event| match event {
                SimEvent::Pressed(direction) => Some(*direction),
                _ => None,
            })
            .collect()
    }

    fn obstacle_pauses(sim: &SimBackend, config: &AgentConfig) -> usize {
        sim.journal()
            .iter()
            .filter(|event| **event == SimEvent::Paused(config.nav.obstacle_poll()))
            .count()
    }

    // ==================== BASIC TRAVEL ====================

    #[test]
    fn test_travel_straight_line() {
        let config = AgentConfig::simulation();
        let (mut sim, mut world, mut classifier) = setup(&config);
        sim.set_player((20, 20));
        observe(&mut world, &mut classifier, &mut sim);
        Navigator::new(&mut world, &mut classifier, &mut sim, &config)
            .travel_to((24, 20))
            .unwrap();
        assert_eq!(world.player(), (24, 20));
        assert_eq!(sim.player(), (24, 20));
        assert_eq!(pressed(&sim), vec![Direction::Right; 4]);
    }

    #[test]
    fn test_travel_is_noop_when_already_there() {
        let config = AgentConfig::simulation();
        let (mut sim, mut world, mut classifier) = setup(&config);
        sim.set_player((20, 20));
        observe(&mut world, &mut classifier, &mut sim);
        Navigator::new(&mut world, &mut classifier, &mut sim, &config)
            .travel_to((20, 20))
            .unwrap();
        assert!(pressed(&sim).is_empty());
    }

    #[test]
    fn test_travel_replans_around_appearing_obstacle() {
        let config = AgentConfig::simulation();
        let (mut sim, mut world, mut classifier) = setup(&config);
        sim.set_player((20, 20));
        // Steps onto the straight path right as the agent approaches.
        sim.add_npc(Tile::Banker, (23, 19), vec![(23, 19), (23, 19), (23, 20)]);
        observe(&mut world, &mut classifier, &mut sim);
        Navigator::new(&mut world, &mut classifier, &mut sim, &config)
            .travel_to((26, 20))
            .unwrap();
        assert_eq!(world.player(), (26, 20));
        let presses = pressed(&sim);
        assert!(presses.len() > 6, "expected a detour, got {presses:?}");
        assert!(presses
            .iter()
            .any(|d| matches!(d, Direction::Up | Direction::Down)));
    }

    // ==================== STALLS ====================

    #[test]
    fn test_travel_stuck_after_consecutive_stalls() {
        let mut config = AgentConfig::simulation();
        let dir = tempfile::tempdir().unwrap();
        config.map_dump_path = dir.path().join("dump.json");
        let (mut sim, mut world, mut classifier) = setup(&config);
        sim.set_player((20, 20));
        // Looks like open floor, blocks every step, never clears.
        sim.add_phantom_wall((22, 20), None);
        observe(&mut world, &mut classifier, &mut sim);
        let err = Navigator::new(&mut world, &mut classifier, &mut sim, &config)
            .travel_to((25, 20))
            .unwrap_err();
        match err {
            FatalError::Stuck { at, attempts } => {
                assert_eq!(at, (21, 20));
                assert_eq!(attempts, config.nav.stall_cap);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // One productive step plus exactly ten shoves into the wall.
        assert_eq!(pressed(&sim).len(), 11);
        assert!(config.map_dump_path.exists());
    }

    #[test]
    fn test_travel_recovers_when_obstruction_clears() {
        let config = AgentConfig::simulation();
        let (mut sim, mut world, mut classifier) = setup(&config);
        sim.set_player((20, 20));
        // Gives way on the tenth shove: nine stalls, then progress.
        sim.add_phantom_wall((22, 20), Some(9));
        observe(&mut world, &mut classifier, &mut sim);
        Navigator::new(&mut world, &mut classifier, &mut sim, &config)
            .travel_to((25, 20))
            .unwrap();
        assert_eq!(world.player(), (25, 20));
        assert_eq!(pressed(&sim).len(), 14);
    }

    // ==================== PLANNING FAILURES ====================

    fn box_in(sim: &mut SimBackend, cell: Cell) {
        sim.set_tile((cell.0 - 1, cell.1), Tile::Inaccessible);
        sim.set_tile((cell.0 + 1, cell.1), Tile::Inaccessible);
        sim.set_tile((cell.0, cell.1 - 1), Tile::Inaccessible);
        sim.set_tile((cell.0, cell.1 + 1), Tile::Inaccessible);
    }

    #[test]
    fn test_travel_fatal_after_planning_failures() {
        let mut config = AgentConfig::simulation();
        let dir = tempfile::tempdir().unwrap();
        config.map_dump_path = dir.path().join("dump.json");
        let (mut sim, mut world, mut classifier) = setup(&config);
        sim.set_player((21, 20));
        box_in(&mut sim, (23, 20));
        observe(&mut world, &mut classifier, &mut sim);
        let err = Navigator::new(&mut world, &mut classifier, &mut sim, &config)
            .travel_to((23, 20))
            .unwrap_err();
        match err {
            FatalError::PathExhausted { from, to, attempts } => {
                assert_eq!(from, (21, 20));
                assert_eq!(to, (23, 20));
                assert_eq!(attempts, config.nav.path_failure_cap);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(config.map_dump_path.exists());
    }

    #[test]
    fn test_try_travel_aborts_without_counting() {
        let mut config = AgentConfig::simulation();
        let dir = tempfile::tempdir().unwrap();
        config.map_dump_path = dir.path().join("dump.json");
        let (mut sim, mut world, mut classifier) = setup(&config);
        sim.set_player((21, 20));
        box_in(&mut sim, (23, 20));
        observe(&mut world, &mut classifier, &mut sim);
        let mut navigator = Navigator::new(&mut world, &mut classifier, &mut sim, &config);
        assert_eq!(navigator.try_travel_to((23, 20)).unwrap(), false);
        // Aborts carry no state into the next attempt.
        assert_eq!(navigator.try_travel_to((23, 20)).unwrap(), false);
        drop(navigator);
        assert!(!config.map_dump_path.exists());
    }

    // ==================== OCCUPIED DESTINATIONS ====================

    #[test]
    fn test_travel_waits_for_destination_to_vacate() {
        let config = AgentConfig::simulation();
        let (mut sim, mut world, mut classifier) = setup(&config);
        sim.set_player((20, 20));
        // Squats on the destination for two ticks, then steps aside.
        sim.add_npc(Tile::Banker, (23, 20), vec![(23, 20), (23, 20), (23, 21)]);
        observe(&mut world, &mut classifier, &mut sim);
        Navigator::new(&mut world, &mut classifier, &mut sim, &config)
            .travel_to((23, 20))
            .unwrap();
        assert_eq!(world.player(), (23, 20));
        assert_eq!(obstacle_pauses(&sim, &config), 1);
    }

    #[test]
    fn test_travel_fatal_when_occupant_never_moves() {
        let config = AgentConfig::simulation();
        let (mut sim, mut world, mut classifier) = setup(&config);
        sim.set_player((20, 20));
        sim.add_npc(Tile::Banker, (23, 20), Vec::new());
        observe(&mut world, &mut classifier, &mut sim);
        let err = Navigator::new(&mut world, &mut classifier, &mut sim, &config)
            .travel_to((23, 20))
            .unwrap_err();
        match err {
            FatalError::ObstacleNeverMoved { cell, tile, polls } => {
                assert_eq!(cell, (23, 20));
                assert_eq!(tile, Tile::Banker);
                assert_eq!(polls, config.nav.obstacle_poll_cap);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            obstacle_pauses(&sim, &config),
            config.nav.obstacle_poll_cap as usize
        );
    }

    // ==================== STEP VALIDATION ====================

    #[test]
    fn test_step_rejects_non_adjacent_cell() {
        let config = AgentConfig::simulation();
        let (mut sim, mut world, mut classifier) = setup(&config);
        sim.set_player((20, 20));
        observe(&mut world, &mut classifier, &mut sim);
        let mut navigator = Navigator::new(&mut world, &mut classifier, &mut sim, &config);
        let err = navigator.step((25, 25)).unwrap_err();
        assert!(matches!(
            err,
            FatalError::InvalidStep {
                from: (20, 20),
                to: (25, 25)
            }
        ));
    }

    // ==================== MINING TARGETS ====================

    #[test]
    fn test_acquire_target_with_rock_in_sight() {
        let config = AgentConfig::simulation();
        let (mut sim, mut world, mut classifier) = setup(&config);
        sim.set_tile((22, 20), Tile::Mountain);
        sim.set_tile((21, 20), Tile::Gravel);
        sim.set_player((20, 20));
        observe(&mut world, &mut classifier, &mut sim);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let click = Navigator::new(&mut world, &mut classifier, &mut sim, &config)
            .acquire_mining_target(&mut rng)
            .unwrap();
        assert_eq!(click, config.screen.mine_click);
        // Standing on the gravel west of the rock.
        assert_eq!(world.player(), (21, 20));
    }

    #[test]
    fn test_acquire_target_falls_back_to_range() {
        let config = AgentConfig::simulation();
        let (mut sim, mut world, mut classifier) = setup(&config);
        let range = config.stations.mountain_range;
        sim.set_tile((range.0 + 2, range.1), Tile::Mountain);
        sim.set_tile((range.0 + 1, range.1), Tile::Gravel);
        sim.set_player((10, 10));
        observe(&mut world, &mut classifier, &mut sim);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let click = Navigator::new(&mut world, &mut classifier, &mut sim, &config)
            .acquire_mining_target(&mut rng)
            .unwrap();
        assert_eq!(click, config.screen.mine_click);
        assert_eq!(world.player(), (range.0 + 1, range.1));
    }

    #[test]
    fn test_acquire_target_fatal_when_no_rocks_anywhere() {
        let config = AgentConfig::simulation();
        let (mut sim, mut world, mut classifier) = setup(&config);
        sim.set_player((20, 20));
        observe(&mut world, &mut classifier, &mut sim);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let err = Navigator::new(&mut world, &mut classifier, &mut sim, &config)
            .acquire_mining_target(&mut rng)
            .unwrap_err();
        assert!(matches!(err, FatalError::NoMiningTargets { attempts: 1 }));
        // It did walk over to the range station to look.
        assert_eq!(world.player(), config.stations.mountain_range);
    }

    #[test]
    fn test_acquire_target_single_failed_rock_returns_to_range() {
        let config = AgentConfig::simulation();
        let (mut sim, mut world, mut classifier) = setup(&config);
        // One rock whose stand cell is walled in on every open side.
        sim.set_tile((22, 20), Tile::Mountain);
        sim.set_tile((21, 20), Tile::Gravel);
        sim.set_tile((20, 20), Tile::Inaccessible);
        sim.set_tile((21, 19), Tile::Inaccessible);
        sim.set_tile((21, 21), Tile::Inaccessible);
        sim.set_player((19, 20));
        observe(&mut world, &mut classifier, &mut sim);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let click = Navigator::new(&mut world, &mut classifier, &mut sim, &config)
            .acquire_mining_target(&mut rng)
            .unwrap();
        assert_eq!(click, config.screen.mine_click);
        assert_eq!(world.player(), config.stations.mountain_range);
    }
}
