//! POS bigram model with unigram backoff.
//!
//! Binary file layout (all integers and floats little-endian):
//!
//! | Offset            | Size             | Content                                  |
//! |-------------------|------------------|------------------------------------------|
//! | 0                 | 4                | `pos_count: u32`                         |
//! | 4                 | 4                | `text_len: u32`                          |
//! | 8                 | `text_len`       | `"TAG\tunigram\tbackoff\n"` × pos_count  |
//! | 8 + `text_len`    | 8 × pos_count²   | row-major `f64` bigram matrix            |
//!
//! A matrix cell holding [`NO_BIGRAM`] (`1.0`, never a valid log score) has
//! no data of its own; lookups fall back to `backoff[a] + unigram[b]`.
//! Tag 0 is the unknown tag by convention of the file format.

use std::{borrow::Cow, collections::HashMap, path::Path};

use anyhow::{Context, Result};

use crate::error::BigramError;

/// Matrix sentinel: "no explicit bigram, use backoff".
pub const NO_BIGRAM: f64 = 1.0;

/// Score for a tag index outside the vocabulary.
pub const MISSING_SCORE: f64 = -1e30;

/// Conventional spelling of tag 0.
pub const UNKNOWN_TAG: &str = "<UNK>";

const HEADER_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct BigramModel {
    tags: Vec<String>,
    index: HashMap<String, usize>,
    unigram: Vec<f64>,
    backoff: Vec<f64>,
    /// `tags.len()²` cells, row = previous tag.
    matrix: Vec<f64>,
    /// Unigram table as read from a file, written back verbatim so foreign
    /// float spellings (`-1.500000`) survive a load/save cycle.
    unigram_text: Option<String>,
}

/// Equal when tags, scores and matrix agree, however the table was spelled.
impl PartialEq for BigramModel {
    fn eq(&self, other: &Self) -> bool {
        self.tags == other.tags
            && self.unigram == other.unigram
            && self.backoff == other.backoff
            && self.matrix == other.matrix
    }
}

impl BigramModel {
    /// Build a model from `(tag, unigram, backoff)` rows with every bigram
    /// cell unset.
    pub fn new<I, S>(entries: I) -> Result<Self, BigramError>
    where
        I: IntoIterator<Item = (S, f64, f64)>,
        S: Into<String>,
    {
        let mut model = Self {
            tags: Vec::new(),
            index: HashMap::new(),
            unigram: Vec::new(),
            backoff: Vec::new(),
            matrix: Vec::new(),
            unigram_text: None,
        };
        for (line, (tag, unigram, backoff)) in entries.into_iter().enumerate() {
            let tag = tag.into();
            if tag.is_empty() || tag.contains(['\t', '\n']) {
                return Err(BigramError::BadLine {
                    line: line + 1,
                    message: format!("tag {:?} is empty or contains a separator", tag),
                });
            }
            if model.index.contains_key(&tag) {
                return Err(BigramError::DuplicateTag(tag));
            }
            model.index.insert(tag.clone(), model.tags.len());
            model.tags.push(tag);
            model.unigram.push(unigram);
            model.backoff.push(backoff);
        }
        let n = model.tags.len();
        model.matrix = vec![NO_BIGRAM; n * n];
        Ok(model)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn tag(&self, index: usize) -> Option<&str> {
        self.tags.get(index).map(String::as_str)
    }

    pub fn unigram(&self, index: usize) -> Option<f64> {
        self.unigram.get(index).copied()
    }

    pub fn backoff(&self, index: usize) -> Option<f64> {
        self.backoff.get(index).copied()
    }

    /// Store an explicit bigram score for `prev → cur`.
    pub fn set_bigram(&mut self, prev: usize, cur: usize, value: f64) -> Result<(), BigramError> {
        let n = self.len();
        for index in [prev, cur] {
            if index >= n {
                return Err(BigramError::IndexOutOfRange { index, count: n });
            }
        }
        self.matrix[prev * n + cur] = value;
        Ok(())
    }

    /// Log score of tag `cur` following tag `prev`.
    ///
    /// Explicit cell if present, else `backoff[prev] + unigram[cur]`, else
    /// [`MISSING_SCORE`] when either index is out of range.
    pub fn bigram_value(&self, prev: usize, cur: usize) -> f64 {
        let n = self.len();
        if prev >= n || cur >= n {
            return MISSING_SCORE;
        }
        let cell = self.matrix[prev * n + cur];
        if cell != NO_BIGRAM {
            cell
        } else {
            self.backoff[prev] + self.unigram[cur]
        }
    }

    /// Index of `pos`, falling back to ever shorter prefixes (`"nrf"` →
    /// `"nr"` → `"n"`), then to 0.
    pub fn pos_index(&self, pos: &str) -> usize {
        let mut probe = pos;
        while !probe.is_empty() {
            if let Some(&i) = self.index.get(probe) {
                return i;
            }
            let mut chars = probe.chars();
            chars.next_back();
            probe = chars.as_str();
        }
        0
    }

    // ── Binary layout ─────────────────────────────────────────────────────────

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BigramError> {
        let mut at = 0;
        let pos_count = read_u32(bytes, &mut at)? as usize;
        let text_len = read_u32(bytes, &mut at)? as usize;

        // Size the whole file from the header before allocating anything.
        let matrix_len = pos_count.checked_mul(pos_count).and_then(|c| c.checked_mul(8));
        let needed = matrix_len
            .and_then(|m| m.checked_add(text_len))
            .and_then(|m| m.checked_add(HEADER_LEN));
        let (Some(matrix_len), Some(needed)) = (matrix_len, needed) else {
            return Err(BigramError::Truncated { needed: usize::MAX, available: bytes.len() });
        };
        if needed > bytes.len() {
            return Err(BigramError::Truncated { needed, available: bytes.len() });
        }

        let text = std::str::from_utf8(take(bytes, &mut at, text_len)?)?;
        let mut rows = Vec::new();
        for (i, line) in text.lines().enumerate() {
            rows.push(parse_unigram_line(i + 1, line)?);
        }
        if rows.len() != pos_count {
            return Err(BigramError::CountMismatch { expected: pos_count, found: rows.len() });
        }
        let mut model = Self::new(rows)?;
        model.unigram_text = Some(text.to_string());

        let raw = take(bytes, &mut at, matrix_len)?;
        model.matrix = raw
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect();

        if at < bytes.len() {
            tracing::debug!(trailing = bytes.len() - at, "ignoring bytes after bigram matrix");
        }
        Ok(model)
    }

    /// Encode in the binary layout.  A table read by [`from_bytes`](Self::from_bytes)
    /// is written back byte for byte; otherwise it is generated with the
    /// shortest float spelling that parses back exactly.
    pub fn to_bytes(&self) -> Result<Vec<u8>, BigramError> {
        let text: Cow<'_, str> = match &self.unigram_text {
            Some(text) => Cow::Borrowed(text.as_str()),
            None => {
                let mut text = String::new();
                for ((tag, uni), bo) in self.tags.iter().zip(&self.unigram).zip(&self.backoff) {
                    text.push_str(&format!("{}\t{}\t{}\n", tag, uni, bo));
                }
                Cow::Owned(text)
            }
        };
        let pos_count = u32::try_from(self.len())
            .map_err(|_| BigramError::TooLarge { what: "tag count", size: self.len() })?;
        let text_len = u32::try_from(text.len())
            .map_err(|_| BigramError::TooLarge { what: "unigram table", size: text.len() })?;

        let mut out = Vec::with_capacity(HEADER_LEN + text.len() + self.matrix.len() * 8);
        out.extend_from_slice(&pos_count.to_le_bytes());
        out.extend_from_slice(&text_len.to_le_bytes());
        out.extend_from_slice(text.as_bytes());
        for v in &self.matrix {
            out.extend_from_slice(&v.to_le_bytes());
        }
        Ok(out)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Cannot read bigram model: {}", path.display()))?;
        let model = Self::from_bytes(&bytes)
            .with_context(|| format!("Cannot decode bigram model: {}", path.display()))?;
        tracing::info!(path = %path.display(), tags = model.len(), "loaded bigram model");
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes().context("Cannot encode bigram model")?;
        std::fs::write(path, bytes)
            .with_context(|| format!("Cannot write bigram model: {}", path.display()))
    }
}

fn take<'a>(bytes: &'a [u8], at: &mut usize, len: usize) -> Result<&'a [u8], BigramError> {
    let end = at.checked_add(len).unwrap_or(usize::MAX);
    if end > bytes.len() {
        return Err(BigramError::Truncated { needed: end, available: bytes.len() });
    }
    let slice = &bytes[*at..end];
    *at = end;
    Ok(slice)
}

fn read_u32(bytes: &[u8], at: &mut usize) -> Result<u32, BigramError> {
    let b = take(bytes, at, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn parse_unigram_line(line: usize, text: &str) -> Result<(String, f64, f64), BigramError> {
    let bad = |message: String| BigramError::BadLine { line, message };
    let mut fields = text.split('\t');
    let (Some(tag), Some(uni), Some(bo), None) = (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(bad(format!("expected 3 tab-separated fields in {:?}", text)));
    };
    let uni = uni.trim().parse::<f64>().map_err(|e| bad(format!("unigram {:?}: {}", uni, e)))?;
    let bo = bo.trim().parse::<f64>().map_err(|e| bad(format!("backoff {:?}: {}", bo, e)))?;
    Ok((tag.to_string(), uni, bo))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BigramModel {
        let mut m = BigramModel::new(vec![
            (UNKNOWN_TAG, -9.0, -1.0),
            ("n", -1.5, -0.5),
            ("nr", -3.0, -0.25),
            ("v", -2.0, -0.75),
        ])
        .unwrap();
        m.set_bigram(1, 3, -0.1).unwrap();
        m.set_bigram(3, 1, -0.2).unwrap();
        m
    }

    #[test]
    fn test_untouched_cell_uses_backoff() {
        let m = sample();
        for i in 0..m.len() {
            let expected = m.backoff(i).unwrap() + m.unigram(i).unwrap();
            assert_eq!(m.bigram_value(i, i), expected);
            assert_ne!(m.bigram_value(i, i), NO_BIGRAM);
        }
        assert_eq!(m.bigram_value(1, 2), -0.5 + -3.0);
    }

    #[test]
    fn test_explicit_cell_and_out_of_range() {
        let m = sample();
        assert_eq!(m.bigram_value(1, 3), -0.1);
        assert_eq!(m.bigram_value(3, 1), -0.2);
        assert_eq!(m.bigram_value(4, 0), MISSING_SCORE);
        assert_eq!(m.bigram_value(0, 99), MISSING_SCORE);
    }

    #[test]
    fn test_set_bigram_bounds() {
        let mut m = sample();
        assert!(matches!(
            m.set_bigram(0, 4, -1.0),
            Err(BigramError::IndexOutOfRange { index: 4, count: 4 })
        ));
    }

    #[test]
    fn test_pos_index_prefix_fallback() {
        let m = sample();
        assert_eq!(m.pos_index("v"), 3);
        assert_eq!(m.pos_index("nr"), 2);
        assert_eq!(m.pos_index("nrf"), 2);
        assert_eq!(m.pos_index("ng"), 1);
        assert_eq!(m.pos_index("vd"), 3);
        assert_eq!(m.pos_index("zz"), 0);
        assert_eq!(m.pos_index(""), 0);
    }

    #[test]
    fn test_duplicate_and_bad_tags() {
        assert!(matches!(
            BigramModel::new(vec![("n", 0.0, 0.0), ("n", 0.0, 0.0)]),
            Err(BigramError::DuplicateTag(t)) if t == "n"
        ));
        assert!(BigramModel::new(vec![("a\tb", 0.0, 0.0)]).is_err());
    }

    #[test]
    fn test_byte_layout() {
        let m = BigramModel::new(vec![("a", -1.0, -2.0), ("b", -3.5, 0.0)]).unwrap();
        let bytes = m.to_bytes().unwrap();
        let text = "a\t-1\t-2\nb\t-3.5\t0\n";
        assert_eq!(&bytes[0..4], &2u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &(text.len() as u32).to_le_bytes());
        assert_eq!(&bytes[8..8 + text.len()], text.as_bytes());
        assert_eq!(bytes.len(), 8 + text.len() + 4 * 8);
        assert_eq!(&bytes[8 + text.len()..8 + text.len() + 8], &NO_BIGRAM.to_le_bytes());
    }

    #[test]
    fn test_bytes_round_trip() {
        let m = sample();
        let bytes = m.to_bytes().unwrap();
        let back = BigramModel::from_bytes(&bytes).unwrap();
        assert_eq!(back, m);
        assert_eq!(back.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_truncated_and_malformed() {
        let bytes = sample().to_bytes().unwrap();
        assert!(matches!(
            BigramModel::from_bytes(&bytes[..bytes.len() - 1]),
            Err(BigramError::Truncated { .. })
        ));
        assert!(matches!(BigramModel::from_bytes(&bytes[..3]), Err(BigramError::Truncated { .. })));

        let mut bad = Vec::new();
        let text = b"n\tx\t0\n";
        bad.extend_from_slice(&1u32.to_le_bytes());
        bad.extend_from_slice(&(text.len() as u32).to_le_bytes());
        bad.extend_from_slice(text);
        bad.extend_from_slice(&NO_BIGRAM.to_le_bytes());
        assert!(matches!(BigramModel::from_bytes(&bad), Err(BigramError::BadLine { line: 1, .. })));

        let mut short = Vec::new();
        let text = b"n\t0\t0\n";
        short.extend_from_slice(&2u32.to_le_bytes());
        short.extend_from_slice(&(text.len() as u32).to_le_bytes());
        short.extend_from_slice(text);
        for _ in 0..4 {
            short.extend_from_slice(&NO_BIGRAM.to_le_bytes());
        }
        assert!(matches!(
            BigramModel::from_bytes(&short),
            Err(BigramError::CountMismatch { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_huge_header_count_is_truncated() {
        assert!(matches!(
            BigramModel::from_bytes(&[0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0]),
            Err(BigramError::Truncated { .. })
        ));
        // Fits in usize but not in the buffer.
        let mut bytes = 0x0001_0000u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            BigramModel::from_bytes(&bytes),
            Err(BigramError::Truncated { available: 8, .. })
        ));
        // Oversized text length.
        let mut bytes = 1u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(BigramModel::from_bytes(&bytes), Err(BigramError::Truncated { .. })));
    }

    #[test]
    fn test_foreign_float_spelling_survives_round_trip() {
        let text = "<UNK>\t-9.000000\t-1.000000\nn\t-1.500000\t-0.500000\n";
        let mut bytes = 2u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&(text.len() as u32).to_le_bytes());
        bytes.extend_from_slice(text.as_bytes());
        for v in [NO_BIGRAM, -0.25, NO_BIGRAM, -2.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }

        let m = BigramModel::from_bytes(&bytes).unwrap();
        assert_eq!(m.unigram(1), Some(-1.5));
        assert_eq!(m.bigram_value(0, 1), -0.25);
        assert_eq!(m.to_bytes().unwrap(), bytes);

        // Same model built in memory compares equal but spells floats its own way.
        let mut built = BigramModel::new(vec![(UNKNOWN_TAG, -9.0, -1.0), ("n", -1.5, -0.5)]).unwrap();
        built.set_bigram(0, 1, -0.25).unwrap();
        built.set_bigram(1, 1, -2.0).unwrap();
        assert_eq!(built, m);
        assert_ne!(built.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pos.bigram");
        let m = sample();
        m.save(&path).unwrap();
        assert_eq!(BigramModel::load(&path).unwrap(), m);
        assert!(BigramModel::load(&dir.path().join("missing.bigram")).is_err());
    }
}
