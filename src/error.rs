//! Typed errors for the synthesis core.
//!
//! The core never panics on bad data: format problems, bad ranges and
//! malformed model files come back as one of these enums.  File loading on
//! top of them uses [`anyhow`] for context, like the rest of the crate.

use thiserror::Error;

/// Failures of [`WaveBuffer`](crate::wave::WaveBuffer) operations.
#[derive(Debug, Error)]
pub enum WaveError {
    #[error("unsupported wave format: {bits_per_sample}-bit, {channels} channel(s), format tag {format_tag}")]
    UnsupportedFormat {
        bits_per_sample: u16,
        channels: u16,
        format_tag: u16,
    },

    #[error("sample index {index} out of range (buffer holds {count} samples)")]
    SampleOutOfRange { index: usize, count: usize },

    #[error("cannot grow wave buffer by {requested} bytes")]
    Alloc {
        requested: usize,
        #[source]
        source: std::collections::TryReserveError,
    },
}

/// Failures of the DSP routines in [`dsp`](crate::dsp).
#[derive(Debug, Error)]
pub enum DspError {
    #[error("sample range {start}..{end} is invalid for a buffer of {count} samples")]
    Range { start: usize, end: usize, count: usize },

    #[error("target holds {to} samples but source holds {from}")]
    TooShort { to: usize, from: usize },

    #[error("wave formats differ: {left} vs {right}")]
    FormatMismatch { left: String, right: String },

    #[error(transparent)]
    Wave(#[from] WaveError),
}

/// Failures while parsing Wagon tree text.
#[derive(Debug, Error, PartialEq)]
pub enum TreeParseError {
    #[error("unexpected {found:?} at byte {offset} while {expecting}")]
    Unexpected {
        offset: usize,
        found: char,
        expecting: &'static str,
    },

    #[error("tree text ended early while {expecting}")]
    UnexpectedEnd { expecting: &'static str },

    #[error("bad probability {text:?} at byte {offset}")]
    BadProbability { offset: usize, text: String },

    #[error("question {text:?} at byte {offset} has no operator")]
    MissingOperator { offset: usize, text: String },

    #[error("trailing input {found:?} at byte {offset} after the tree")]
    TrailingInput { offset: usize, found: char },
}

/// Failures while decoding or building a [`BigramModel`](crate::bigram::BigramModel).
#[derive(Debug, Error)]
pub enum BigramError {
    #[error("bigram model truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("unigram table is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("unigram line {line}: {message}")]
    BadLine { line: usize, message: String },

    #[error("unigram table lists {found} tags, header says {expected}")]
    CountMismatch { expected: usize, found: usize },

    #[error("duplicate POS tag {0:?}")]
    DuplicateTag(String),

    #[error("POS index {index} out of range ({count} tags)")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("{what} ({size}) does not fit a u32 header field")]
    TooLarge { what: &'static str, size: usize },
}
