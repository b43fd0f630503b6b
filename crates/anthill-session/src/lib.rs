//! Session context tying the recorder, settings store and governor to one
//! running simulation.

use std::sync::Arc;

use anthill_archive::ArchiveSink;
use anthill_governor::{PerformanceGovernor, SimulationState, MIN_POPULATION};
use anthill_ops::TelemetryRecorder;
use anthill_settings::SettingsStore;
use anthill_types::{
    config::SessionConfig,
    settings::RecoveryMethod,
    telemetry::{EventRecord, TelemetrySnapshot},
    AnthillError, Result,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct Session<S, A>
where
    S: SimulationState,
    A: ArchiveSink + 'static,
{
    id: Uuid,
    config: SessionConfig,
    settings: SettingsStore,
    governor: PerformanceGovernor,
    recorder: TelemetryRecorder,
    simulation: S,
    sink: Arc<A>,
    last_evaluation_ms: Option<i64>,
    last_frame_ms: Option<i64>,
}

impl<S, A> Session<S, A>
where
    S: SimulationState,
    A: ArchiveSink + 'static,
{
    /// The settings backend must not block: governor mitigations persist
    /// from inside [`Session::tick`]. Wrap disk-backed stores in
    /// [`anthill_settings::DeferredKeyValueStore`].
    pub fn new(
        config: SessionConfig,
        settings: SettingsStore,
        recorder: TelemetryRecorder,
        simulation: S,
        sink: Arc<A>,
    ) -> Result<Self> {
        if !settings.is_non_blocking() {
            return Err(AnthillError::Configuration(
                "session settings backend must be non-blocking; wrap it in DeferredKeyValueStore"
                    .into(),
            ));
        }
        let id = Uuid::new_v4();
        info!("Session {} started", id);
        Ok(Self {
            id,
            config,
            settings,
            governor: PerformanceGovernor::new(),
            recorder,
            simulation,
            sink,
            last_evaluation_ms: None,
            last_frame_ms: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Records one rendered frame and, once per evaluation interval, lets the
    /// governor react to the measured FPS. Never blocks on I/O: the settings
    /// backend is checked in [`Session::new`].
    pub fn tick(&mut self, frame_ms: f64, now_ms: i64) -> Option<RecoveryMethod> {
        self.recorder.record_frame(frame_ms, now_ms);
        self.last_frame_ms = Some(now_ms);
        if let Err(err) =
            self.recorder
                .record_metric("antCount", self.simulation.population() as f64, now_ms)
        {
            debug!("Population metric not recorded: {err}");
        }

        let last = *self.last_evaluation_ms.get_or_insert(now_ms);
        let interval = i64::try_from(self.config.evaluation_interval_ms).unwrap_or(i64::MAX);
        if now_ms.saturating_sub(last) < interval {
            return None;
        }
        self.last_evaluation_ms = Some(now_ms);

        let fps = self.recorder.current_fps()?;
        debug!("Session {} evaluating at {:.1} FPS", self.id, fps);
        let action = self
            .governor
            .evaluate(fps, &mut self.settings, &mut self.simulation);
        if let Some(method) = action {
            self.recorder.record_warning(EventRecord::new(
                now_ms,
                format!("Applied recovery method {} at {fps:.1} FPS", method.as_str()),
            ));
        }
        action
    }

    /// Freeze check, run off the frame path (e.g. once a second). When no
    /// frame arrived for longer than `freeze_threshold_ms`, the population is
    /// cut straight to the floor. Returns whether a freeze was detected.
    pub fn watchdog(&mut self, now_ms: i64) -> bool {
        let Some(last_frame) = self.last_frame_ms else {
            return false;
        };
        let gap = now_ms.saturating_sub(last_frame);
        let threshold = i64::try_from(self.config.freeze_threshold_ms).unwrap_or(i64::MAX);
        if gap <= threshold {
            return false;
        }

        self.recorder.record_error(EventRecord::new(
            now_ms,
            format!(
                "Possible freeze detected: {:.1} seconds since last frame",
                gap as f64 / 1000.0
            ),
        ));
        let before = self.simulation.population();
        if before > MIN_POPULATION {
            self.simulation.shrink_population(MIN_POPULATION);
            info!(
                "Freeze recovery: reduced ant count from {} to {}",
                before,
                self.simulation.population()
            );
        }
        true
    }

    /// Captures the recorder state now and ships it to the archive on the
    /// runtime. The tick loop never waits on the returned handle.
    pub fn save_snapshot(&self) -> JoinHandle<Result<String>> {
        let snapshot = self.recorder.snapshot();
        self.submit(snapshot)
    }

    pub fn submit(&self, snapshot: TelemetrySnapshot) -> JoinHandle<Result<String>> {
        let sink = self.sink.clone();
        let session = self.id;
        tokio::spawn(async move {
            let outcome = sink.submit(snapshot).await;
            match &outcome {
                Ok(identifier) => info!("Session {} snapshot archived as {}", session, identifier),
                Err(err) => warn!("Session {} snapshot not archived: {err}", session),
            }
            outcome
        })
    }

    /// Manual way back from governor mitigations.
    pub fn reset_settings(&mut self) {
        self.settings.reset();
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut SettingsStore {
        &mut self.settings
    }

    pub fn governor(&self) -> &PerformanceGovernor {
        &self.governor
    }

    pub fn recorder(&self) -> &TelemetryRecorder {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut TelemetryRecorder {
        &mut self.recorder
    }

    pub fn simulation(&self) -> &S {
        &self.simulation
    }
}
