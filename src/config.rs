//! Engine configuration, read from a JSON file.
//!
//! ```json
//! {
//!   "bigram": "models/pos.bigram",
//!   "lexicon": "models/lexicon.txt",
//!   "prosody_tree": "models/break.tree",
//!   "sample_rate": 16000,
//!   "crossfade_ms": 10,
//!   "nbest": 3
//! }
//! ```
//!
//! Relative model paths are resolved against the directory holding the
//! config file.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::wave::WaveFormat;

fn default_sample_rate() -> u32 {
    16_000
}

fn default_crossfade_ms() -> u32 {
    10
}

fn default_nbest() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Binary POS bigram model.
    pub bigram: PathBuf,

    /// Tab-separated pronunciation lexicon.
    pub lexicon: PathBuf,

    /// Wagon tree for prosody labels; prosody is skipped when absent.
    #[serde(default)]
    pub prosody_tree: Option<PathBuf>,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Crossfade length between spliced fragments.
    #[serde(default = "default_crossfade_ms")]
    pub crossfade_ms: u32,

    /// Taggings kept by [`Engine::tag_alternatives`](crate::engine::Engine::tag_alternatives).
    #[serde(default = "default_nbest")]
    pub nbest: usize,
}

impl EngineConfig {
    pub fn new(bigram: impl Into<PathBuf>, lexicon: impl Into<PathBuf>) -> Self {
        Self {
            bigram: bigram.into(),
            lexicon: lexicon.into(),
            prosody_tree: None,
            sample_rate: default_sample_rate(),
            crossfade_ms: default_crossfade_ms(),
            nbest: default_nbest(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).context("Failed to parse engine config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read engine config: {}", path.display()))?;
        let mut config = Self::from_json(&text)
            .with_context(|| format!("Invalid engine config: {}", path.display()))?;

        if let Some(dir) = path.parent() {
            config.bigram = resolve(dir, &config.bigram);
            config.lexicon = resolve(dir, &config.lexicon);
            config.prosody_tree = config.prosody_tree.map(|p| resolve(dir, &p));
        }
        tracing::debug!(path = %path.display(), ?config, "loaded engine config");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            bail!("sample_rate must be positive");
        }
        if self.nbest == 0 {
            bail!("nbest must be at least 1");
        }
        Ok(())
    }

    /// 16-bit mono at the configured rate.
    pub fn wave_format(&self) -> WaveFormat {
        WaveFormat::new(self.sample_rate, 16, 1)
    }

    /// Crossfade length in samples, rounded to the nearest sample.
    pub fn crossfade_samples(&self) -> usize {
        let samples = u64::from(self.sample_rate) * u64::from(self.crossfade_ms);
        ((samples + 500) / 1000) as usize
    }
}

fn resolve(dir: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        dir.join(p)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::from_json(r#"{"bigram": "a.bin", "lexicon": "b.txt"}"#).unwrap();
        assert_eq!(cfg, EngineConfig::new("a.bin", "b.txt"));
        assert_eq!(cfg.sample_rate, 16_000);
        assert_eq!(cfg.crossfade_samples(), 160);
        assert_eq!(cfg.prosody_tree, None);
    }

    #[test]
    fn test_crossfade_rounding() {
        let mut cfg = EngineConfig::new("a", "b");
        cfg.sample_rate = 22_050;
        cfg.crossfade_ms = 5;
        assert_eq!(cfg.crossfade_samples(), 110);
        cfg.crossfade_ms = 0;
        assert_eq!(cfg.crossfade_samples(), 0);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(EngineConfig::from_json(r#"{"bigram": "a", "lexicon": "b", "nbest": 0}"#).is_err());
        assert!(EngineConfig::from_json(r#"{"bigram": "a", "lexicon": "b", "sample_rate": 0}"#).is_err());
        assert!(EngineConfig::from_json(r#"{"lexicon": "b"}"#).is_err());
    }

    #[test]
    fn test_from_file_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(
            &path,
            r#"{"bigram": "pos.bigram", "lexicon": "/abs/lexicon.txt", "prosody_tree": "break.tree"}"#,
        )
        .unwrap();

        let cfg = EngineConfig::from_file(&path).unwrap();
        assert_eq!(cfg.bigram, dir.path().join("pos.bigram"));
        assert_eq!(cfg.lexicon, PathBuf::from("/abs/lexicon.txt"));
        assert_eq!(cfg.prosody_tree, Some(dir.path().join("break.tree")));
    }
}
