use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{AnthillError, Result};

/// Rendering quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Low,
    Medium,
    High,
}

/// Mitigation strategy the governor applies when FPS drops below threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum RecoveryMethod {
    #[default]
    ReduceAnts,
    SimplifyPhysics,
    SkipFrames,
}

impl RecoveryMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            RecoveryMethod::ReduceAnts => "reduceAnts",
            RecoveryMethod::SimplifyPhysics => "simplifyPhysics",
            RecoveryMethod::SkipFrames => "skipFrames",
        }
    }
}

/// Live performance configuration for one simulation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSettings {
    pub quality: Quality,
    pub draw_distance: f64,
    pub cull_offscreen: bool,
    pub spatial_partitioning: bool,
    pub optimize_rendering: bool,
    pub frame_skipping: bool,
    pub simplified_physics: bool,
    #[serde(rename = "targetFPS")]
    pub target_fps: u32,
    pub max_ants: u32,
    pub max_food: u32,
    pub max_obstacles: u32,
    pub auto_recovery: bool,
    pub fps_threshold: f64,
    pub recovery_method: RecoveryMethod,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            quality: Quality::Low,
            draw_distance: 150.0,
            cull_offscreen: true,
            spatial_partitioning: true,
            optimize_rendering: true,
            frame_skipping: true,
            simplified_physics: true,
            target_fps: 30,
            max_ants: 100,
            max_food: 20,
            max_obstacles: 10,
            auto_recovery: true,
            fps_threshold: 15.0,
            recovery_method: RecoveryMethod::ReduceAnts,
        }
    }
}

impl PerformanceSettings {
    /// Merges a validated patch; returns whether any field changed.
    pub fn merge(&mut self, patch: &SettingsPatch) -> bool {
        let before = self.clone();
        macro_rules! take {
            ($target:expr, $source:expr; $($field:ident),* $(,)?) => {
                $(if let Some(value) = $source.$field {
                    $target.$field = value;
                })*
            };
        }
        take!(
            self, patch;
            quality,
            draw_distance,
            cull_offscreen,
            spatial_partitioning,
            optimize_rendering,
            frame_skipping,
            simplified_physics,
            target_fps,
            max_ants,
            max_food,
            max_obstacles,
            auto_recovery,
            fps_threshold,
            recovery_method,
        );
        *self != before
    }

    /// Overlays persisted JSON key by key. Keys that are recognized but badly
    /// typed or out of range keep their current value and are returned.
    pub fn merge_persisted(&mut self, persisted: &Value) -> Vec<String> {
        let Some(object) = persisted.as_object() else {
            return vec!["<root>".into()];
        };

        let mut rejected = Vec::new();
        for (key, value) in object {
            let mut single = Map::new();
            single.insert(key.clone(), value.clone());
            let accepted = serde_json::from_value::<SettingsPatch>(Value::Object(single))
                .ok()
                .filter(|patch| patch.validate().is_ok());
            match accepted {
                Some(patch) => {
                    self.merge(&patch);
                }
                None => rejected.push(key.clone()),
            }
        }
        rejected
    }
}

/// Partial update applied through the settings store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<Quality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw_distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cull_offscreen: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_partitioning: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimize_rendering: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_skipping: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simplified_physics: Option<bool>,
    #[serde(default, rename = "targetFPS", skip_serializing_if = "Option::is_none")]
    pub target_fps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ants: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_food: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_obstacles: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_recovery: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_method: Option<RecoveryMethod>,
}

impl SettingsPatch {
    pub fn validate(&self) -> Result<()> {
        if let Some(distance) = self.draw_distance {
            if !(distance.is_finite() && distance > 0.0) {
                return Err(AnthillError::Configuration(
                    "drawDistance must be a positive number".into(),
                ));
            }
        }
        if self.target_fps == Some(0) {
            return Err(AnthillError::Configuration(
                "targetFPS must be greater than zero".into(),
            ));
        }
        if let Some(threshold) = self.fps_threshold {
            if !(threshold.is_finite() && threshold > 0.0) {
                return Err(AnthillError::Configuration(
                    "fpsThreshold must be a positive number".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_serialize_with_browser_keys() {
        let value = serde_json::to_value(PerformanceSettings::default()).unwrap();
        assert_eq!(value["targetFPS"], json!(30));
        assert_eq!(value["recoveryMethod"], json!("reduceAnts"));
        assert_eq!(value["quality"], json!("low"));
        assert_eq!(value["fpsThreshold"], json!(15.0));
    }

    #[test]
    fn persisted_overlay_keeps_defaults_for_bad_keys() {
        let mut settings = PerformanceSettings::default();
        let rejected = settings.merge_persisted(&json!({
            "maxAnts": 250,
            "recoveryMethod": "teleportAnts",
            "fpsThreshold": -3,
            "quality": "high",
            "somethingElse": true,
        }));

        assert_eq!(settings.max_ants, 250);
        assert_eq!(settings.quality, Quality::High);
        assert_eq!(settings.recovery_method, RecoveryMethod::ReduceAnts);
        assert_eq!(settings.fps_threshold, 15.0);
        assert!(rejected.contains(&"recoveryMethod".to_string()));
        assert!(rejected.contains(&"fpsThreshold".to_string()));
        assert!(!rejected.contains(&"somethingElse".to_string()));
    }

    #[test]
    fn persisted_overlay_rejects_non_object() {
        let mut settings = PerformanceSettings::default();
        let rejected = settings.merge_persisted(&json!([1, 2, 3]));
        assert_eq!(rejected, vec!["<root>".to_string()]);
        assert_eq!(settings, PerformanceSettings::default());
    }

    #[test]
    fn negative_caps_are_rejected() {
        let mut settings = PerformanceSettings::default();
        let rejected = settings.merge_persisted(&json!({ "maxAnts": -5 }));
        assert_eq!(rejected, vec!["maxAnts".to_string()]);
        assert_eq!(settings.max_ants, 100);
    }

    #[test]
    fn merge_reports_changes() {
        let mut settings = PerformanceSettings::default();
        let patch = SettingsPatch {
            frame_skipping: Some(true),
            ..SettingsPatch::default()
        };
        assert!(!settings.merge(&patch));

        let patch = SettingsPatch {
            recovery_method: Some(RecoveryMethod::SkipFrames),
            ..SettingsPatch::default()
        };
        assert!(settings.merge(&patch));
        assert_eq!(settings.recovery_method, RecoveryMethod::SkipFrames);
    }

    #[test]
    fn patch_validation_rules() {
        let mut patch = SettingsPatch {
            fps_threshold: Some(0.0),
            ..SettingsPatch::default()
        };
        assert!(patch.validate().is_err());
        patch.fps_threshold = Some(12.0);
        patch.target_fps = Some(0);
        assert!(patch.validate().is_err());
        patch.target_fps = Some(60);
        patch.draw_distance = Some(f64::NAN);
        assert!(patch.validate().is_err());
        patch.draw_distance = Some(300.0);
        assert!(patch.validate().is_ok());
        assert!(SettingsPatch::default().is_empty());
        assert!(!patch.is_empty());
    }
}
