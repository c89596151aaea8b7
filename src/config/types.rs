use serde::{Deserialize, Serialize};

const DEFAULT_MAX_CONCENTRATION: f32 = 300.0;
const DEFAULT_SLOPE_THRESHOLD: f32 = 0.414;

/// Haptic tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Concentration ceiling mapped to full motor intensity.
    pub max_concentration: f32,
    /// Trend slope magnitude required before the pattern biases toward the
    /// front or rear channels.
    pub slope_threshold: f32,
}

impl Config {
    /// Replace out-of-range values with their defaults, so a hand-edited
    /// config file cannot produce a zero or NaN intensity scale.
    pub fn sanitize(&mut self) {
        if !(self.max_concentration > 0.0) {
            self.max_concentration = DEFAULT_MAX_CONCENTRATION;
        }
        if !(self.slope_threshold >= 0.0) {
            self.slope_threshold = DEFAULT_SLOPE_THRESHOLD;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_concentration: DEFAULT_MAX_CONCENTRATION,
            slope_threshold: DEFAULT_SLOPE_THRESHOLD,
        }
    }
}
