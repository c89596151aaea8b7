use crate::actuator::types::MotorPattern;
use crate::config::types::Config;
use crate::sensor::telemetry::TelemetrySample;

/// Translate one telemetry sample into a 4-channel motor pattern.
///
/// The averaged concentration, clamped to the configured ceiling, scales to
/// an 8-bit intensity. The trend slope picks the channels: a rising trend
/// biases toward the rear pair, a falling trend toward the front pair, and
/// anything within the slope threshold drives the middle channels. Pure and
/// idempotent.
pub fn map_sample(sample: &TelemetrySample, config: &Config) -> MotorPattern {
    let clamped = sample.averaged_concentration.clamp(0.0, config.max_concentration);
    let intensity = ((clamped / config.max_concentration) * 255.0).round() as u8;
    let half = half_intensity(intensity);

    if sample.trend_slope > config.slope_threshold {
        MotorPattern::new(0, 0, half, intensity)
    } else if sample.trend_slope < -config.slope_threshold {
        MotorPattern::new(intensity, half, 0, 0)
    } else {
        MotorPattern::new(0, intensity, intensity, 0)
    }
}

fn half_intensity(intensity: u8) -> u8 {
    ((u16::from(intensity) + 1) / 2) as u8
}
