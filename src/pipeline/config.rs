//! Pipeline configuration.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::track_error::TrackError;

/// What ingestion does when `max_in_flight` extraction tasks are outstanding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backpressure {
    /// Wait for a worker slot; no frame is skipped.
    #[default]
    Block,
    /// Keep the frame's record but skip its extraction.
    Drop,
}

impl FromStr for Backpressure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "block" => Ok(Backpressure::Block),
            "drop" => Ok(Backpressure::Drop),
            other => Err(format!("unknown backpressure policy '{other}' (expected block|drop)")),
        }
    }
}

/// Configuration for [`StreamingPipeline`](super::StreamingPipeline).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker threads; `0` lets rayon pick one per core.
    pub workers: usize,
    /// Upper bound on scheduled-but-unfinished extraction tasks.
    pub max_in_flight: usize,
    pub backpressure: Backpressure,
    /// Where transition matrices are saved; nothing is saved when unset.
    pub output_dir: Option<PathBuf>,
    /// Prefix of transition-matrix file names.
    pub dataname: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            max_in_flight: 16,
            backpressure: Backpressure::Block,
            output_dir: None,
            dataname: "vortex".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), TrackError> {
        if self.max_in_flight == 0 {
            return Err(TrackError::Config("max_in_flight must be at least 1".into()));
        }
        if self.dataname.is_empty() {
            return Err(TrackError::Config("dataname must not be empty".into()));
        }
        Ok(())
    }

    /// Read a JSON config; missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, TrackError> {
        let text = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"workers": 3, "backpressure": "drop"}"#).unwrap();
        assert_eq!(cfg.workers, 3);
        assert_eq!(cfg.backpressure, Backpressure::Drop);
        assert_eq!(cfg.max_in_flight, 16);
        assert_eq!(cfg.dataname, "vortex");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_zero_slots() {
        let cfg = PipelineConfig {
            max_in_flight: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(TrackError::Config(_))));
        assert_eq!("BLOCK".parse::<Backpressure>(), Ok(Backpressure::Block));
        assert!("later".parse::<Backpressure>().is_err());
    }
}
