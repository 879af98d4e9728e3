//! Prosody labels predicted per word by a Wagon tree.
//!
//! Features offered to the tree questions:
//!
//! | Name         | Value                                        |
//! |--------------|----------------------------------------------|
//! | `name`       | the word itself                              |
//! | `pos`        | its POS tag                                  |
//! | `p.pos`      | POS of the previous word (absent at start)   |
//! | `n.pos`      | POS of the next word (absent at end)         |
//! | `position`   | 0-based word index                           |
//! | `word_count` | words in the utterance                       |
//! | `num_chars`  | characters in the word                       |
//!
//! Context features are left out rather than padded, so any question on
//! them answers "no" at the utterance edges.

use std::{collections::HashMap, sync::Arc};

use crate::{tagger::TaggedWord, wagon::WagonTree};

#[derive(Debug, Clone, PartialEq)]
pub struct ProsodyLabel {
    pub label: String,
    /// Probability the leaf lists for `label`; 0 if it lists none.
    pub probability: f64,
}

#[derive(Debug, Clone)]
pub struct ProsodyPredictor {
    tree: Arc<WagonTree>,
}

impl ProsodyPredictor {
    pub fn new(tree: Arc<WagonTree>) -> Self {
        Self { tree }
    }

    pub fn tree(&self) -> &WagonTree {
        &self.tree
    }

    /// Feature map for word `i` of `words`.
    pub fn features_for(words: &[TaggedWord], i: usize) -> HashMap<String, String> {
        let mut f = HashMap::new();
        let Some(w) = words.get(i) else {
            return f;
        };
        f.insert("name".to_string(), w.word.clone());
        f.insert("pos".to_string(), w.pos.clone());
        if let Some(prev) = i.checked_sub(1).and_then(|p| words.get(p)) {
            f.insert("p.pos".to_string(), prev.pos.clone());
        }
        if let Some(next) = words.get(i + 1) {
            f.insert("n.pos".to_string(), next.pos.clone());
        }
        f.insert("position".to_string(), i.to_string());
        f.insert("word_count".to_string(), words.len().to_string());
        f.insert("num_chars".to_string(), w.word.chars().count().to_string());
        f
    }

    pub fn predict(&self, words: &[TaggedWord]) -> Vec<ProsodyLabel> {
        (0..words.len())
            .map(|i| {
                let leaf = self.tree.predict(&Self::features_for(words, i));
                ProsodyLabel {
                    label: leaf.most_probable.clone(),
                    probability: leaf.probability(&leaf.most_probable).unwrap_or(0.0),
                }
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const BREAK_TREE: &str = "
        ((n.pos is w)
         (((B3 0.9)(B1 0.1) B3))
         ((num_chars > 1)
          (((B1 0.7)(B0 0.3) B1))
          (((B0 0.8)(B1 0.2) B0))))";

    fn words(spec: &[(&str, &str)]) -> Vec<TaggedWord> {
        spec.iter()
            .map(|&(w, p)| TaggedWord { word: w.to_string(), pos: p.to_string(), tag: 0 })
            .collect()
    }

    #[test]
    fn test_features_at_edges() {
        let ws = words(&[("我", "r"), ("爱", "v")]);
        let first = ProsodyPredictor::features_for(&ws, 0);
        assert!(!first.contains_key("p.pos"));
        assert_eq!(first["n.pos"], "v");
        assert_eq!(first["word_count"], "2");

        let last = ProsodyPredictor::features_for(&ws, 1);
        assert_eq!(last["p.pos"], "r");
        assert!(!last.contains_key("n.pos"));
        assert_eq!(last["position"], "1");
        assert!(ProsodyPredictor::features_for(&ws, 2).is_empty());
    }

    #[test]
    fn test_predict_breaks() {
        let tree = Arc::new(WagonTree::parse(BREAK_TREE).unwrap());
        let predictor = ProsodyPredictor::new(tree);
        let ws = words(&[("我", "r"), ("中国", "ns"), ("，", "w"), ("好", "a")]);
        let labels = predictor.predict(&ws);
        let names: Vec<&str> = labels.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(names, vec!["B0", "B3", "B0", "B0"]);
        assert_eq!(labels[1].probability, 0.9);
    }
}
