//! # latticetts
//!
//! Core of a unit-selection text-to-speech front end: a generic Viterbi
//! lattice search, Wagon CART decision trees, POS bigram and lexicon
//! scoring, and PCM waveform buffers with Hanning crossfades.
//!
//! ## Quick start
//!
//! ```no_run
//! use latticetts::{Engine, EngineConfig};
//!
//! let config = EngineConfig::from_file(std::path::Path::new("models/engine.json")).unwrap();
//! let engine = Engine::load(&config).unwrap();
//!
//! for word in engine.analyze(&["我", "爱", "中国"]) {
//!     println!("{}\t{}\t{:?}", word.word, word.pos, word.phonemes);
//! }
//! ```
//!
//! Recorded fragments are joined with crossfades:
//!
//! ```no_run
//! # use latticetts::{Engine, EngineConfig, WaveBuffer};
//! # let engine = Engine::load(&EngineConfig::new("pos.bigram", "lexicon.txt")).unwrap();
//! let a = WaveBuffer::read_wav(std::path::Path::new("a.wav")).unwrap();
//! let b = WaveBuffer::read_wav(std::path::Path::new("b.wav")).unwrap();
//! engine.splice_to_file(&[a, b], std::path::Path::new("out.wav")).unwrap();
//! ```
//!
//! ## Model files
//! | File           | Format                                                   |
//! |----------------|----------------------------------------------------------|
//! | POS bigram     | little-endian binary, see [`bigram`]                     |
//! | Lexicon        | `grapheme<TAB>phoneme<TAB>POS[<TAB>frequency]` per line  |
//! | Prosody tree   | Wagon tree text, see [`wagon`]                           |
//!
//! ## Pipeline
//! 1. **Tagging**: Viterbi search over lexicon POS readings with bigram transitions.
//! 2. **Pronunciation**: layered lexicon lookup per tagged word.
//! 3. **Prosody**: a Wagon tree labels each word from its context.
//! 4. **Splicing**: waveform fragments joined with Hanning crossfades.
//!
//! Logging goes through `tracing`; install a subscriber to see it.

pub mod bigram;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod lexicon;
pub mod prosody;
pub mod tagger;
pub mod viterbi;
pub mod wagon;
pub mod wave;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use bigram::BigramModel;
pub use config::EngineConfig;
pub use engine::{Engine, WordAnalysis};
pub use error::{BigramError, DspError, TreeParseError, WaveError};
pub use lexicon::{Lexicon, LexiconEntry, LexiconProvider};
pub use viterbi::{Candidate, CandidateSource, Decoder, ScoreOrder};
pub use wagon::WagonTree;
pub use wave::{WaveBuffer, WaveFormat};
