//! Part-of-speech tagging as a Viterbi search.
//!
//! Each word's candidates are the POS tags its lexicon entries carry,
//! scored by smoothed relative frequency; transitions between tags come
//! from the [`BigramModel`].  Words missing from the lexicon get the single
//! unknown tag.

use crate::{
    bigram::{BigramModel, UNKNOWN_TAG},
    lexicon::LexiconProvider,
    viterbi::{Candidate, CandidateSource, Decoder, ScoreOrder},
};

/// A POS reading of one word, as searched by the decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct TagCandidate {
    /// Index into the bigram vocabulary (after prefix fallback).
    pub tag: usize,
    /// POS as written in the lexicon.
    pub pos: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaggedWord {
    pub word: String,
    pub pos: String,
    pub tag: usize,
}

/// One complete tagging with its total log score.
#[derive(Debug, Clone, PartialEq)]
pub struct TagSequence {
    pub score: f64,
    pub words: Vec<TaggedWord>,
}

pub struct PosTagger<'a, L: LexiconProvider + ?Sized> {
    lexicon: &'a L,
    bigram: &'a BigramModel,
}

impl<L: LexiconProvider + ?Sized> Clone for PosTagger<'_, L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<L: LexiconProvider + ?Sized> Copy for PosTagger<'_, L> {}

impl<'a, L: LexiconProvider + ?Sized> PosTagger<'a, L> {
    pub fn new(lexicon: &'a L, bigram: &'a BigramModel) -> Self {
        Self { lexicon, bigram }
    }

    /// Best tagging of `words`.
    pub fn tag(&self, words: &[&str]) -> Vec<TaggedWord> {
        self.tag_nbest(words, 1)
            .into_iter()
            .next()
            .map(|seq| seq.words)
            .unwrap_or_default()
    }

    /// Up to `n` taggings of `words`, best first.
    pub fn tag_nbest(&self, words: &[&str], n: usize) -> Vec<TagSequence> {
        let mut decoder = Decoder::new(*self, ScoreOrder::BiggerIsBetter);
        decoder.initialize(words.iter().map(|w| w.to_string()).collect());
        decoder.search();
        decoder
            .get_result(n)
            .into_iter()
            .map(|path| TagSequence {
                score: path.score,
                words: words
                    .iter()
                    .zip(path.values)
                    .map(|(word, c)| TaggedWord { word: word.to_string(), pos: c.pos, tag: c.tag })
                    .collect(),
            })
            .collect()
    }
}

impl<L: LexiconProvider + ?Sized> CandidateSource for PosTagger<'_, L> {
    type Item = String;
    type Value = TagCandidate;

    fn candidates(&mut self, word: &String) -> Vec<Candidate<TagCandidate>> {
        // Frequencies summed per POS, in first-seen order.
        let mut by_pos: Vec<(&str, u64)> = Vec::new();
        for e in self.lexicon.lookup_word(word) {
            match by_pos.iter_mut().find(|(pos, _)| *pos == e.pos) {
                Some(slot) => slot.1 += u64::from(e.frequency),
                None => by_pos.push((e.pos.as_str(), u64::from(e.frequency))),
            }
        }

        if by_pos.is_empty() {
            let pos = self.bigram.tag(0).unwrap_or(UNKNOWN_TAG).to_string();
            return vec![Candidate::new(0.0, TagCandidate { tag: 0, pos })];
        }

        // Add-one smoothing keeps zero-frequency readings finite.
        let total: f64 = by_pos.iter().map(|&(_, f)| (f + 1) as f64).sum();
        by_pos
            .into_iter()
            .map(|(pos, f)| {
                let score = ((f + 1) as f64 / total).ln();
                Candidate::new(score, TagCandidate { tag: self.bigram.pos_index(pos), pos: pos.to_string() })
            })
            .collect()
    }

    fn transition_score(&self, prev: &Candidate<TagCandidate>, cur: &Candidate<TagCandidate>) -> f64 {
        self.bigram.bigram_value(prev.value.tag, cur.value.tag)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::{Lexicon, LexiconEntry};

    fn lexicon() -> Lexicon {
        let mut lex = Lexicon::new();
        lex.insert(LexiconEntry::new("我", "wo3", "r", 1000));
        lex.insert(LexiconEntry::new("爱", "ai4", "v", 800));
        lex.insert(LexiconEntry::new("爱", "ai4", "n", 50));
        lex.insert(LexiconEntry::new("中国", "zhong1 guo2", "ns", 900));
        lex
    }

    fn bigram() -> BigramModel {
        BigramModel::new(vec![
            (UNKNOWN_TAG, -8.0, -1.0),
            ("r", -2.0, -1.0),
            ("v", -2.0, -1.0),
            ("n", -2.0, -1.0),
            ("ns", -3.0, -1.0),
        ])
        .unwrap()
    }

    fn pos_of(tagged: &[TaggedWord]) -> Vec<&str> {
        tagged.iter().map(|t| t.pos.as_str()).collect()
    }

    #[test]
    fn test_frequency_decides_without_bigrams() {
        let (lex, bg) = (lexicon(), bigram());
        let tagged = PosTagger::new(&lex, &bg).tag(&["我", "爱", "中国"]);
        assert_eq!(pos_of(&tagged), vec!["r", "v", "ns"]);
        assert_eq!(tagged[2].tag, 4);
        assert_eq!(tagged[1].word, "爱");
    }

    #[test]
    fn test_bigrams_override_frequency() {
        let lex = lexicon();
        let mut bg = bigram();
        bg.set_bigram(1, 2, -12.0).unwrap(); // r → v unlikely
        bg.set_bigram(1, 3, -0.1).unwrap(); // r → n likely
        let tagged = PosTagger::new(&lex, &bg).tag(&["我", "爱", "中国"]);
        assert_eq!(pos_of(&tagged), vec!["r", "n", "ns"]);
    }

    #[test]
    fn test_unknown_word_gets_unknown_tag() {
        let (lex, bg) = (lexicon(), bigram());
        let tagged = PosTagger::new(&lex, &bg).tag(&["我", "xyz"]);
        assert_eq!(tagged[1].tag, 0);
        assert_eq!(tagged[1].pos, UNKNOWN_TAG);
    }

    #[test]
    fn test_nbest_lists_alternatives() {
        let (lex, bg) = (lexicon(), bigram());
        let seqs = PosTagger::new(&lex, &bg).tag_nbest(&["爱"], 2);
        assert_eq!(seqs.len(), 2);
        assert_eq!(seqs[0].words[0].pos, "v");
        assert_eq!(seqs[1].words[0].pos, "n");
        assert!(seqs[0].score > seqs[1].score);
    }

    #[test]
    fn test_empty_input() {
        let (lex, bg) = (lexicon(), bigram());
        assert!(PosTagger::new(&lex, &bg).tag(&[]).is_empty());
    }
}
