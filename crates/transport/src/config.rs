use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Gain applied to a muted track. Kept above zero so backends that suspend
/// output on silence keep their clocks running.
pub const MUTE_GAIN: f32 = 1e-4;

/// Timing knobs for the ensemble. Every field has a default, so a partial
/// TOML table (or none at all) deserializes cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Maximum master/track difference tolerated by `play_all` before re-seeking.
    pub realign_tolerance_ms: u64,
    /// Difference above which a drift tick re-seeks a track.
    pub drift_threshold_ms: u64,
    pub drift_period_ms: u64,
    /// Delay between the first `finished` notification and the ensemble check.
    pub finish_settle_ms: u64,
    pub mute_gain: f32,
}

impl TransportConfig {
    pub fn realign_tolerance_secs(&self) -> f64 {
        self.realign_tolerance_ms as f64 / 1000.0
    }

    pub fn drift_threshold_secs(&self) -> f64 {
        self.drift_threshold_ms as f64 / 1000.0
    }

    pub fn drift_period(&self) -> Duration {
        Duration::from_millis(self.drift_period_ms)
    }

    pub fn finish_settle(&self) -> Duration {
        Duration::from_millis(self.finish_settle_ms)
    }

    /// Mute gain with non-positive values replaced by the default.
    pub fn effective_mute_gain(&self) -> f32 {
        if self.mute_gain > 0.0 && self.mute_gain.is_finite() {
            self.mute_gain
        } else {
            MUTE_GAIN
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            realign_tolerance_ms: 10,
            drift_threshold_ms: 50,
            drift_period_ms: 200,
            finish_settle_ms: 50,
            mute_gain: MUTE_GAIN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.drift_period(), Duration::from_millis(200));
        assert_eq!(config.finish_settle(), Duration::from_millis(50));
        assert!((config.realign_tolerance_secs() - 0.010).abs() < 1e-12);
        assert!((config.drift_threshold_secs() - 0.050).abs() < 1e-12);
    }

    #[test]
    fn test_partial_table_uses_defaults() {
        let config: TransportConfig = toml::from_str("drift_period_ms = 100").unwrap();
        assert_eq!(config.drift_period_ms, 100);
        assert_eq!(config.drift_threshold_ms, 50);
        assert_eq!(config.mute_gain, MUTE_GAIN);
    }

    #[test]
    fn test_zero_mute_gain_is_replaced() {
        let config = TransportConfig {
            mute_gain: 0.0,
            ..Default::default()
        };
        assert_eq!(config.effective_mute_gain(), MUTE_GAIN);
    }
}
