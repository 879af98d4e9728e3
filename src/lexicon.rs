//! Pronunciation lexicon and layered phoneme lookup.
//!
//! [`phonemes`] resolves a word in this order, stopping at the first hit:
//!
//! 1. entry matching both word and POS;
//! 2. first entry for the word, whatever its POS;
//! 3. for personal names (POS `nr`), surname + given name looked up apart;
//! 4. forward maximum match over the characters of the word, joining the
//!    partial pronunciations with a single space.
//!
//! Characters no step can resolve are dropped.

use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result};

/// Separator between partial pronunciations.
pub const PHONEME_DELIMITER: &str = " ";

/// POS tag of personal names.
pub const PERSONAL_NAME_POS: &str = "nr";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexiconEntry {
    pub grapheme: String,
    pub phoneme: String,
    pub pos: String,
    pub frequency: u32,
}

impl LexiconEntry {
    pub fn new(grapheme: &str, phoneme: &str, pos: &str, frequency: u32) -> Self {
        Self {
            grapheme: grapheme.to_string(),
            phoneme: phoneme.to_string(),
            pos: pos.to_string(),
            frequency,
        }
    }
}

/// Word → entries lookup used by the tagger and the phoneme resolver.
pub trait LexiconProvider {
    /// Every entry for `word`, in lexicon order; empty when unknown.
    fn lookup_word(&self, word: &str) -> &[LexiconEntry];

    /// Longest grapheme in characters, bounding forward maximum match.
    fn max_word_chars(&self) -> usize {
        usize::MAX
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory lexicon
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    words: HashMap<String, Vec<LexiconEntry>>,
    entries: usize,
    max_word_chars: usize,
}

impl Lexicon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: LexiconEntry) {
        self.max_word_chars = self.max_word_chars.max(entry.grapheme.chars().count());
        self.entries += 1;
        self.words.entry(entry.grapheme.clone()).or_default().push(entry);
    }

    /// Number of entries (not distinct words).
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Parse `grapheme<TAB>phoneme<TAB>POS[<TAB>frequency]` lines.
    ///
    /// Blank lines and `#` comments are ignored; malformed lines are skipped
    /// with a warning.
    pub fn parse(text: &str) -> Self {
        let mut lexicon = Self::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let frequency = match fields.get(3).map(|f| f.trim().parse::<u32>()) {
                None => Ok(0),
                Some(parsed) => parsed,
            };
            match (fields.len(), frequency) {
                (3 | 4, Ok(frequency)) if !fields[0].is_empty() && !fields[1].is_empty() => {
                    lexicon.insert(LexiconEntry::new(fields[0], fields[1], fields[2], frequency));
                }
                _ => tracing::warn!(line = i + 1, text = line, "skipping malformed lexicon line"),
            }
        }
        lexicon
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read lexicon: {}", path.display()))?;
        let lexicon = Self::parse(&text);
        tracing::info!(path = %path.display(), entries = lexicon.len(), "loaded lexicon");
        Ok(lexicon)
    }
}

impl LexiconProvider for Lexicon {
    fn lookup_word(&self, word: &str) -> &[LexiconEntry] {
        self.words.get(word).map(Vec::as_slice).unwrap_or(&[])
    }

    fn max_word_chars(&self) -> usize {
        self.max_word_chars
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Phoneme resolution
// ─────────────────────────────────────────────────────────────────────────────

/// Pronunciation of `word` read as `pos`, or `None` if no character of it
/// can be resolved.
pub fn phonemes<L: LexiconProvider + ?Sized>(lexicon: &L, word: &str, pos: &str) -> Option<String> {
    let entries = lexicon.lookup_word(word);
    if let Some(e) = entries.iter().find(|e| e.pos == pos) {
        return Some(e.phoneme.clone());
    }
    if let Some(e) = entries.first() {
        return Some(e.phoneme.clone());
    }
    if pos == PERSONAL_NAME_POS {
        if let Some(p) = personal_name(lexicon, word) {
            return Some(p);
        }
    }
    forward_max_match(lexicon, word)
}

/// Prefer a personal-name reading of `word`, else its first reading.
fn name_reading<'a, L: LexiconProvider + ?Sized>(lexicon: &'a L, word: &str) -> Option<&'a str> {
    let entries = lexicon.lookup_word(word);
    entries
        .iter()
        .find(|e| e.pos == PERSONAL_NAME_POS)
        .or_else(|| entries.first())
        .map(|e| e.phoneme.as_str())
}

/// Split a name into surname (two characters first, then one) and given
/// name, and look each half up on its own.
fn personal_name<L: LexiconProvider + ?Sized>(lexicon: &L, word: &str) -> Option<String> {
    let boundaries: Vec<usize> = word.char_indices().map(|(b, _)| b).skip(1).collect();
    // Two-character surnames need at least one character left for the given name.
    let splits = [boundaries.get(1).copied(), boundaries.first().copied()];
    for split in splits.into_iter().flatten() {
        let (surname, given) = word.split_at(split);
        let Some(sur) = name_reading(lexicon, surname) else { continue };
        let given = match name_reading(lexicon, given) {
            Some(p) => p.to_string(),
            None => match forward_max_match(lexicon, given) {
                Some(p) => p,
                None => continue,
            },
        };
        return Some([sur, given.as_str()].join(PHONEME_DELIMITER));
    }
    None
}

/// Greedy longest-prefix segmentation of `word` against the lexicon.
fn forward_max_match<L: LexiconProvider + ?Sized>(lexicon: &L, word: &str) -> Option<String> {
    let starts: Vec<usize> = word.char_indices().map(|(b, _)| b).collect();
    let byte_at = |i: usize| starts.get(i).copied().unwrap_or(word.len());
    let max = lexicon.max_word_chars().max(1);

    let mut parts: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < starts.len() {
        let longest = (starts.len() - i).min(max);
        let mut step = 1;
        for len in (1..=longest).rev() {
            if let Some(e) = lexicon.lookup_word(&word[byte_at(i)..byte_at(i + len)]).first() {
                parts.push(&e.phoneme);
                step = len;
                break;
            }
        }
        i += step;
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(PHONEME_DELIMITER))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
