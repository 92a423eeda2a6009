use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::generator::emitter::SimEmitter;
use sweepcore::prelude::EngineConfig;

/// Full description of one simulated run: the synthetic RF environment plus
/// the engine configuration driven against it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub units: usize,
    pub noise_dbm: f64,
    pub seed: u64,
    /// Per-unit cable phase errors to bake into the front end, radians.
    pub phase_errors: Vec<f64>,
    pub emitters: Vec<SimEmitter>,
    pub engine: EngineConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            units: 4,
            noise_dbm: -90.0,
            seed: 7,
            phase_errors: Vec::new(),
            emitters: vec![SimEmitter::default()],
            engine: EngineConfig::default(),
        }
    }
}

impl ScenarioConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading scenario {}", path_ref.display()))?;
        let config: ScenarioConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing scenario {}", path_ref.display()))?;
        config.engine.validate().context("validating scenario engine config")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_scenario_validates() {
        let config = ScenarioConfig::default();
        config.engine.validate().unwrap();
        assert_eq!(config.units, 4);
    }

    #[test]
    fn scenario_loads_from_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"units: 6\nnoise_dbm: -85.0\nemitters:\n  - frequency_hz: 433.92e6\n    power_dbm: -30.0\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let config = ScenarioConfig::load(&path).unwrap();
        assert_eq!(config.units, 6);
        assert_eq!(config.emitters.len(), 1);
        assert!((config.emitters[0].frequency_hz - 433.92e6).abs() < 1.0);
    }

    #[test]
    fn bad_engine_config_is_rejected() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"engine:\n  bands: []\n").unwrap();
        let path = temp.into_temp_path();
        assert!(ScenarioConfig::load(&path).is_err());
    }
}
