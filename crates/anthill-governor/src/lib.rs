//! Adaptive performance governor.
//!
//! Level-triggered: every evaluation with FPS under the configured threshold
//! applies the configured mitigation again. Mitigations are never reversed
//! here; [`SettingsStore::reset`] is the manual way back.

use anthill_settings::SettingsStore;
use anthill_types::settings::{RecoveryMethod, SettingsPatch};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Population never shrinks below this many ants.
pub const MIN_POPULATION: usize = 20;
/// Fraction of the population kept by one `reduceAnts` step.
pub const REDUCTION_RATIO: f64 = 0.7;

/// The slice of simulation state the governor may touch.
pub trait SimulationState {
    fn population(&self) -> usize;
    /// Truncates the population to `target`; implementors recompute any
    /// derived per-kind counts. Never grows the population.
    fn shrink_population(&mut self, target: usize);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AntKind {
    Scout,
    Worker,
}

/// Minimal population handle: the kinds of the live ants in spawn order.
#[derive(Debug, Clone, Default)]
pub struct ColonyPopulation {
    ants: Vec<AntKind>,
    scout_count: usize,
    worker_count: usize,
}

impl ColonyPopulation {
    pub fn new(ants: Vec<AntKind>) -> Self {
        let mut population = Self {
            ants,
            scout_count: 0,
            worker_count: 0,
        };
        population.recount();
        population
    }

    /// `scouts` scouts followed by `workers` workers.
    pub fn with_counts(scouts: usize, workers: usize) -> Self {
        let mut ants = vec![AntKind::Scout; scouts];
        ants.extend(std::iter::repeat(AntKind::Worker).take(workers));
        Self::new(ants)
    }

    pub fn scout_count(&self) -> usize {
        self.scout_count
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    fn recount(&mut self) {
        self.scout_count = self.ants.iter().filter(|k| **k == AntKind::Scout).count();
        self.worker_count = self.ants.len() - self.scout_count;
    }
}

impl SimulationState for ColonyPopulation {
    fn population(&self) -> usize {
        self.ants.len()
    }

    fn shrink_population(&mut self, target: usize) {
        if target < self.ants.len() {
            self.ants.truncate(target);
            self.recount();
        }
    }
}

/// Population after one `reduceAnts` step: `max(20, floor(p * 0.7))`,
/// never above `p`.
pub fn reduced_population(population: usize) -> usize {
    let scaled = (population as f64 * REDUCTION_RATIO).floor() as usize;
    population.min(scaled.max(MIN_POPULATION))
}

#[derive(Debug, Default)]
pub struct PerformanceGovernor {
    last_action: Option<RecoveryMethod>,
}

impl PerformanceGovernor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mitigation applied by the most recent evaluation, if any.
    pub fn last_action(&self) -> Option<RecoveryMethod> {
        self.last_action
    }

    /// One evaluation tick. Returns the mitigation that was applied.
    pub fn evaluate<S: SimulationState + ?Sized>(
        &mut self,
        current_fps: f64,
        settings: &mut SettingsStore,
        sim: &mut S,
    ) -> Option<RecoveryMethod> {
        self.last_action = self.decide(current_fps, settings, sim);
        self.last_action
    }

    fn decide<S: SimulationState + ?Sized>(
        &self,
        current_fps: f64,
        settings: &mut SettingsStore,
        sim: &mut S,
    ) -> Option<RecoveryMethod> {
        let current = settings.current();
        if !current.auto_recovery || !(current_fps < current.fps_threshold) {
            return None;
        }

        let method = current.recovery_method;
        warn!(
            "Low FPS detected: {:.1} (threshold {}). Applying recovery method: {}",
            current_fps,
            current.fps_threshold,
            method.as_str()
        );

        match method {
            RecoveryMethod::ReduceAnts => {
                let before = sim.population();
                if before <= MIN_POPULATION {
                    return None;
                }
                let target = reduced_population(before);
                sim.shrink_population(target);
                info!("Reduced ant count from {} to {}", before, sim.population());
                settings.apply();
            }
            RecoveryMethod::SimplifyPhysics => {
                commit(
                    settings,
                    SettingsPatch {
                        simplified_physics: Some(true),
                        cull_offscreen: Some(true),
                        spatial_partitioning: Some(true),
                        ..SettingsPatch::default()
                    },
                );
            }
            RecoveryMethod::SkipFrames => {
                commit(
                    settings,
                    SettingsPatch {
                        frame_skipping: Some(true),
                        ..SettingsPatch::default()
                    },
                );
            }
        }
        Some(method)
    }
}

fn commit(settings: &mut SettingsStore, patch: SettingsPatch) {
    if let Err(err) = settings.update(&patch) {
        warn!("Governor mitigation rejected by settings store: {err}");
    }
}
