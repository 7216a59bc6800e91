use serde::Deserialize;

use crate::error::SessionError;

fn default_ref_multiplier() -> i32 {
    8
}

fn default_symbolizer_tool() -> String {
    pulse_symbolize::DEFAULT_TOOL.to_string()
}

/// Session wiring, usually deserialized from a device database entry.
///
/// `ref_period` is the period of the timeline reference clock in
/// seconds — after clock multiplication on platforms that use it — and
/// one machine unit equals this period. `ref_multiplier` is the ratio
/// between the fine and coarse timestamp frequencies.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub ref_period: f64,

    #[serde(default = "default_ref_multiplier")]
    pub ref_multiplier: i32,

    #[serde(default = "default_symbolizer_tool")]
    pub symbolizer_tool: String,
}

impl SessionConfig {
    pub fn new(ref_period: f64) -> Self {
        Self {
            ref_period,
            ref_multiplier: default_ref_multiplier(),
            symbolizer_tool: default_symbolizer_tool(),
        }
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if !self.ref_period.is_finite() || self.ref_period <= 0.0 {
            return Err(SessionError::Config(format!(
                "ref_period must be a positive finite number of seconds, got {}",
                self.ref_period
            )));
        }
        if self.ref_multiplier < 1 {
            return Err(SessionError::Config(format!(
                "ref_multiplier must be >= 1, got {}",
                self.ref_multiplier
            )));
        }
        if self.symbolizer_tool.is_empty() {
            return Err(SessionError::Config(
                "symbolizer_tool must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"ref_period": 1e-9}"#).expect("parse config");
        assert_eq!(config.ref_period, 1e-9);
        assert_eq!(config.ref_multiplier, 8);
        assert_eq!(config.symbolizer_tool, pulse_symbolize::DEFAULT_TOOL);
        config.validate().expect("valid");
    }

    #[test]
    fn rejects_nonpositive_ref_period() {
        assert!(SessionConfig::new(0.0).validate().is_err());
        assert!(SessionConfig::new(-1e-9).validate().is_err());
        assert!(SessionConfig::new(f64::NAN).validate().is_err());
    }

    #[test]
    fn rejects_zero_multiplier() {
        let mut config = SessionConfig::new(1e-9);
        config.ref_multiplier = 0;
        assert!(config.validate().is_err());
    }
}
