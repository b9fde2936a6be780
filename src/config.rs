//! Engine configuration.
//!
//! Defaults reproduce the constants the engine was calibrated with; an
//! optional TOML file overrides them, and `LOOKALIKE_*` environment
//! variables override both.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::search::fusion::FusionConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Embedding dimension D, fixed per deployment.
    pub dimension: usize,
    /// Default cutoff for the single-metric cosine search.
    pub min_similarity: f32,
    pub fusion: FusionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dimension: 512,
            min_similarity: 0.1,
            fusion: FusionConfig::default(),
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let text = fs::read_to_string(p)
                    .with_context(|| format!("read config file {}", p.display()))?;
                toml::from_str(&text)
                    .with_context(|| format!("parse config file {}", p.display()))?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(val) = dotenvy::var("LOOKALIKE_DIMENSION")
            && let Ok(dimension) = val.parse()
        {
            self.dimension = dimension;
        }
        if let Ok(val) = dotenvy::var("LOOKALIKE_MIN_SIMILARITY")
            && let Ok(min) = val.parse()
        {
            self.min_similarity = min;
        }
        if let Ok(val) = dotenvy::var("LOOKALIKE_CANDIDATE_MULTIPLIER")
            && let Ok(multiplier) = val.parse()
        {
            self.fusion.candidate_multiplier = multiplier;
        }
        if let Ok(val) = dotenvy::var("LOOKALIKE_RANK_BONUS")
            && let Ok(bonus) = val.parse()
        {
            self.fusion.rank_bonus_max = bonus;
        }
        if let Ok(val) = dotenvy::var("LOOKALIKE_SCORE_DIVISOR")
            && let Ok(divisor) = val.parse()
        {
            self.fusion.score_divisor = divisor;
        }
    }
}
