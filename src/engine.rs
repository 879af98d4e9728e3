//! Front-end pipeline: tagging, pronunciation, prosody and waveform splicing.
//!
//! An [`Engine`] owns read-only models behind [`Arc`]; cloning it is cheap
//! and every clone shares the same data.

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};

use crate::{
    bigram::BigramModel,
    config::EngineConfig,
    dsp,
    lexicon::{self, Lexicon},
    prosody::{ProsodyLabel, ProsodyPredictor},
    tagger::{PosTagger, TagSequence},
    wagon::WagonTree,
    wave::WaveBuffer,
};

/// Everything the front end knows about one word.
#[derive(Debug, Clone, PartialEq)]
pub struct WordAnalysis {
    pub word: String,
    pub pos: String,
    /// Space-separated pronunciation, `None` when no character resolved.
    pub phonemes: Option<String>,
    /// `None` when the engine has no prosody tree.
    pub prosody: Option<ProsodyLabel>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    bigram: Arc<BigramModel>,
    lexicon: Arc<Lexicon>,
    prosody: Option<ProsodyPredictor>,
}

impl Engine {
    /// Load every model the config names.
    pub fn load(config: &EngineConfig) -> Result<Self> {
        // ── POS bigram ────────────────────────────────────────────────────────
        let bigram = BigramModel::load(&config.bigram).context("Failed to load POS bigram model")?;

        // ── Lexicon ───────────────────────────────────────────────────────────
        let lexicon = Lexicon::load(&config.lexicon).context("Failed to load lexicon")?;

        // ── Prosody tree (optional) ───────────────────────────────────────────
        let prosody = match &config.prosody_tree {
            Some(path) => Some(WagonTree::load(path).context("Failed to load prosody tree")?),
            None => None,
        };

        tracing::info!(
            tags = bigram.len(),
            entries = lexicon.len(),
            prosody = prosody.is_some(),
            "engine ready"
        );
        Ok(Self::from_parts(config.clone(), bigram, lexicon, prosody))
    }

    /// Assemble an engine from models already in memory.
    pub fn from_parts(
        config: EngineConfig,
        bigram: BigramModel,
        lexicon: Lexicon,
        prosody_tree: Option<WagonTree>,
    ) -> Self {
        Self {
            config,
            bigram: Arc::new(bigram),
            lexicon: Arc::new(lexicon),
            prosody: prosody_tree.map(|t| ProsodyPredictor::new(Arc::new(t))),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bigram(&self) -> &BigramModel {
        &self.bigram
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn tagger(&self) -> PosTagger<'_, Lexicon> {
        PosTagger::new(&*self.lexicon, &*self.bigram)
    }

    // ── Text analysis ─────────────────────────────────────────────────────────

    /// Tag, pronounce and label each word of one utterance.
    pub fn analyze(&self, words: &[&str]) -> Vec<WordAnalysis> {
        let tagged = self.tagger().tag(words);
        let labels = self.prosody.as_ref().map(|p| p.predict(&tagged));

        tagged
            .into_iter()
            .enumerate()
            .map(|(i, t)| {
                let phonemes = lexicon::phonemes(&*self.lexicon, &t.word, &t.pos);
                if phonemes.is_none() {
                    tracing::warn!(word = %t.word, "no pronunciation found");
                }
                WordAnalysis {
                    prosody: labels.as_ref().and_then(|l| l.get(i).cloned()),
                    word: t.word,
                    pos: t.pos,
                    phonemes,
                }
            })
            .collect()
    }

    /// The `nbest` best taggings of `words`.
    pub fn tag_alternatives(&self, words: &[&str]) -> Vec<TagSequence> {
        self.tagger().tag_nbest(words, self.config.nbest)
    }

    // ── Waveform splicing ─────────────────────────────────────────────────────

    /// Join `fragments` in order, crossfading each boundary.
    ///
    /// An empty list yields an empty buffer in the configured format.
    pub fn splice(&self, fragments: &[WaveBuffer]) -> Result<WaveBuffer> {
        let mut iter = fragments.iter();
        let Some(first) = iter.next() else {
            return Ok(WaveBuffer::new(self.config.wave_format())?);
        };

        let overlap = self.config.crossfade_samples();
        let mut out = first.clone();
        for (i, next) in iter.enumerate() {
            out = dsp::concatenate(&out, next, overlap)
                .with_context(|| format!("Failed to splice fragment {}", i + 1))?;
        }
        tracing::debug!(
            fragments = fragments.len(),
            samples = out.sample_count(),
            "spliced waveform"
        );
        Ok(out)
    }

    pub fn splice_to_file(&self, fragments: &[WaveBuffer], output_path: &Path) -> Result<()> {
        self.splice(fragments)?.write_wav(output_path)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
