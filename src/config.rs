//! Run configuration for an attack/defense experiment, loadable from JSON.
use crate::attack::AttackConfig;
use crate::defense::DefenseConfig;
use crate::error::PerturbError;
use crate::model::Mode;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub attack: AttackConfig,
    /// Outlier removal applied to the adversarial batch before re-evaluation.
    pub defense: Option<DefenseConfig>,
    pub mode: Mode,
    /// Keep only this many objects in the emitted record.
    pub record_limit: Option<usize>,
}

impl PipelineConfig {
    /// # Errors
    /// Malformed JSON or an invalid attack configuration.
    pub fn from_json_str(json: &str) -> Result<Self, PerturbError> {
        let config: Self = serde_json::from_str(json)?;
        config.attack.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Unreadable file, malformed JSON or an invalid attack configuration.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, PerturbError> {
        let config: Self = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        config.attack.validate()?;
        Ok(config)
    }
}
