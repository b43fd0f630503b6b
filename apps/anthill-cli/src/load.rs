use anthill_types::settings::PerformanceSettings;

/// Toy cost model for `simulate`: frame time grows with the population and
/// shrinks when the governor's mitigations are active.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticLoad {
    pub base_frame_ms: f64,
    pub per_ant_ms: f64,
}

impl SyntheticLoad {
    pub fn frame_ms(&self, population: usize, settings: &PerformanceSettings) -> f64 {
        let mut per_ant = self.per_ant_ms;
        if settings.simplified_physics {
            per_ant *= 0.5;
        }
        if settings.spatial_partitioning {
            per_ant *= 0.8;
        }
        let mut frame = self.base_frame_ms + per_ant * population as f64;
        if settings.frame_skipping {
            frame *= 0.75;
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mitigations_reduce_frame_time() {
        let load = SyntheticLoad {
            base_frame_ms: 5.0,
            per_ant_ms: 2.0,
        };
        let mut settings = PerformanceSettings {
            simplified_physics: false,
            spatial_partitioning: false,
            frame_skipping: false,
            ..PerformanceSettings::default()
        };
        let heavy = load.frame_ms(100, &settings);
        assert_eq!(heavy, 205.0);
        assert!(load.frame_ms(20, &settings) < heavy);

        settings.simplified_physics = true;
        assert_eq!(load.frame_ms(100, &settings), 105.0);
        settings.frame_skipping = true;
        assert!(load.frame_ms(100, &settings) < 105.0);
    }
}
