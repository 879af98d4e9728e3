//! Wagon (CART) decision trees: text parser and prediction.
//!
//! Tree text grammar, whitespace-insensitive outside question text:
//!
//! ```text
//! TREE     ::= "(" "(" QUESTION ")" TREE TREE ")"
//!            | "(" "(" PAIR+ MOSTPROBABLE ")" ")"
//! QUESTION ::= FEATURE OP VALUE        ; OP ∈ { is not, is, =, >, < }
//! VALUE    ::= WORD | '"' any text without '"' '"'
//! PAIR     ::= "(" VALUE PROB ")"
//! ```
//!
//! e.g. `((pos is n)(((a 0.7)(b 0.3) a))(((c 1.0) c)))`.
//!
//! The parser is a flat state machine with an explicit node stack, so tree
//! depth is bounded only by memory.  Nodes live in an arena and refer to
//! their children by index.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    path::Path,
    str::FromStr,
};

use anyhow::{Context, Result};

use crate::error::TreeParseError;

// ─────────────────────────────────────────────────────────────────────────────
// Features
// ─────────────────────────────────────────────────────────────────────────────

/// Named feature values a question can look up.
pub trait FeatureLookup {
    fn lookup(&self, name: &str) -> Option<&str>;
}

impl FeatureLookup for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl FeatureLookup for BTreeMap<String, String> {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl FeatureLookup for HashMap<&str, &str> {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name).copied()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Questions
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    IsNot,
    Is,
    Eq,
    Gt,
    Lt,
}

impl Operator {
    /// Match order matters: `" is not "` has to be tried before `" is "`.
    const MATCH_ORDER: [Operator; 5] =
        [Operator::IsNot, Operator::Is, Operator::Eq, Operator::Gt, Operator::Lt];

    /// The operator as it appears in tree text, surrounding spaces included.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::IsNot => " is not ",
            Operator::Is => " is ",
            Operator::Eq => " = ",
            Operator::Gt => " > ",
            Operator::Lt => " < ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub feature: String,
    pub op: Operator,
    pub value: String,
    numeric: Option<f64>,
}

impl Question {
    pub fn new(feature: impl Into<String>, op: Operator, value: impl Into<String>) -> Self {
        let value = value.into();
        let numeric = value.trim().parse::<f64>().ok();
        Self { feature: feature.into(), op, value, numeric }
    }

    /// Split `feature OP value` on the first operator found, trying
    /// operators in [`Operator::MATCH_ORDER`].
    pub fn parse(text: &str) -> Option<Self> {
        Operator::MATCH_ORDER.iter().find_map(|&op| {
            let at = text.find(op.symbol())?;
            let feature = text[..at].trim();
            let value = unquote(text[at + op.symbol().len()..].trim());
            Some(Self::new(feature, op, value))
        })
    }

    /// Evaluate against `features`.  An absent feature is always "no", and
    /// so is a numeric comparison on a non-numeric value.
    pub fn ask<F: FeatureLookup + ?Sized>(&self, features: &F) -> bool {
        let Some(actual) = features.lookup(&self.feature) else {
            return false;
        };
        match self.op {
            Operator::Is => actual == self.value,
            Operator::IsNot => actual != self.value,
            Operator::Eq | Operator::Gt | Operator::Lt => {
                let (Some(want), Ok(got)) = (self.numeric, actual.trim().parse::<f64>()) else {
                    return false;
                };
                match self.op {
                    Operator::Eq => got == want,
                    Operator::Gt => got > want,
                    _ => got < want,
                }
            }
        }
    }
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(s)
}

// ─────────────────────────────────────────────────────────────────────────────
// Nodes
// ─────────────────────────────────────────────────────────────────────────────

/// Output distribution at the bottom of the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub distribution: Vec<(String, f64)>,
    pub most_probable: String,
}

impl Leaf {
    /// Probability listed for `value`, if any.
    pub fn probability(&self, value: &str) -> Option<f64> {
        self.distribution.iter().find(|(v, _)| v == value).map(|&(_, p)| p)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Question { question: Question, yes: usize, no: usize },
    Leaf(Leaf),
}

/// An immutable, parsed decision tree.
#[derive(Debug, Clone, PartialEq)]
pub struct WagonTree {
    nodes: Vec<Node>,
    root: usize,
}

impl WagonTree {
    pub fn parse(text: &str) -> Result<Self, TreeParseError> {
        Parser::default().run(text)
    }

    /// Read and parse a tree file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read tree file: {}", path.display()))?;
        let tree = Self::parse(&text)
            .with_context(|| format!("Cannot parse tree file: {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            nodes = tree.node_count(),
            depth = tree.depth(),
            "loaded decision tree"
        );
        Ok(tree)
    }

    pub fn root(&self) -> &Node {
        &self.nodes[self.root]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of questions on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self.root, 0usize)];
        while let Some((id, d)) = stack.pop() {
            match &self.nodes[id] {
                Node::Leaf(_) => deepest = deepest.max(d),
                Node::Question { yes, no, .. } => {
                    stack.push((*yes, d + 1));
                    stack.push((*no, d + 1));
                }
            }
        }
        deepest
    }

    /// Walk from the root to a leaf, taking the yes branch whenever the
    /// question holds.
    pub fn predict<F: FeatureLookup + ?Sized>(&self, features: &F) -> &Leaf {
        let mut id = self.root;
        loop {
            match &self.nodes[id] {
                Node::Leaf(leaf) => return leaf,
                Node::Question { question, yes, no } => {
                    id = if question.ask(features) { *yes } else { *no };
                }
            }
        }
    }
}

impl FromStr for WagonTree {
    type Err = TreeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Writes the tree back in the grammar [`WagonTree::parse`] accepts.
impl fmt::Display for WagonTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        enum Emit {
            Node(usize),
            Text(&'static str),
        }
        let mut stack = vec![Emit::Node(self.root)];
        while let Some(item) = stack.pop() {
            match item {
                Emit::Text(t) => f.write_str(t)?,
                Emit::Node(id) => match &self.nodes[id] {
                    Node::Leaf(leaf) => {
                        f.write_str("((")?;
                        for (value, prob) in &leaf.distribution {
                            write!(f, "({} {})", value, prob)?;
                        }
                        write!(f, " {}))", leaf.most_probable)?;
                    }
                    Node::Question { question, yes, no } => {
                        let v = &question.value;
                        if v.is_empty() || v.contains(|c: char| c == '(' || c == ')' || c.is_whitespace()) {
                            write!(f, "(({}{}\"{}\")", question.feature, question.op.symbol(), v)?;
                        } else {
                            write!(f, "(({}{}{})", question.feature, question.op.symbol(), v)?;
                        }
                        stack.push(Emit::Text(")"));
                        stack.push(Emit::Node(*no));
                        stack.push(Emit::Text(" "));
                        stack.push(Emit::Node(*yes));
                    }
                },
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parser
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Expecting the `(` that opens a tree.
    Start,
    /// Expecting the `(` that opens a question or a leaf body.
    NodeOpen,
    /// Deciding between question text and a leaf's first pair.
    ContentStart,
    QuestionBody,
    /// Value half of a `(value prob)` pair.
    LeafPairFirst,
    /// Probability half of a `(value prob)` pair.
    LeafPairSecond,
    /// Between pairs, or before the most probable value.
    LeafContent,
    LeafOutput,
    /// Expecting the `)` that closes a tree.
    NodeClose,
    Done,
}

impl ParseState {
    fn expecting(self) -> &'static str {
        match self {
            ParseState::Start => "opening a tree node",
            ParseState::NodeOpen => "opening a question or leaf",
            ParseState::ContentStart => "starting a question or leaf",
            ParseState::QuestionBody => "reading a question",
            ParseState::LeafPairFirst => "reading a leaf value",
            ParseState::LeafPairSecond => "reading a leaf probability",
            ParseState::LeafContent => "reading leaf pairs",
            ParseState::LeafOutput => "reading a leaf's most probable value",
            ParseState::NodeClose => "closing a tree node",
            ParseState::Done => "finishing the tree",
        }
    }
}

/// A question waiting for its children.
struct Frame {
    question: Question,
    yes: Option<usize>,
    no: Option<usize>,
}

#[derive(Default)]
struct Parser {
    nodes: Vec<Node>,
    stack: Vec<Frame>,
    root: Option<usize>,
    token: String,
    token_start: usize,
    /// Whitespace seen after a non-empty token; only a delimiter may follow.
    token_closed: bool,
    /// Inside a quoted question value, where brackets are plain text.
    in_quote: bool,
    pair_value: String,
    pairs: Vec<(String, f64)>,
    pending_leaf: Option<Leaf>,
}

impl Parser {
    fn run(mut self, text: &str) -> Result<WagonTree, TreeParseError> {
        let mut state = ParseState::Start;
        for (offset, ch) in text.char_indices() {
            state = self.step(state, offset, ch)?;
        }
        match (state, self.root) {
            (ParseState::Done, Some(root)) => Ok(WagonTree { nodes: self.nodes, root }),
            _ => Err(TreeParseError::UnexpectedEnd { expecting: state.expecting() }),
        }
    }

    fn begin_token(&mut self, offset: usize, ch: char) {
        self.token.clear();
        self.token.push(ch);
        self.token_start = offset;
        self.token_closed = false;
    }

    /// Accumulate a whitespace-free token.  Returns `false` if `ch` cannot
    /// continue it.
    fn extend_token(&mut self, offset: usize, ch: char) -> bool {
        if ch.is_whitespace() {
            if !self.token.is_empty() {
                self.token_closed = true;
            }
            return true;
        }
        if self.token_closed {
            return false;
        }
        if self.token.is_empty() {
            self.token_start = offset;
        }
        self.token.push(ch);
        true
    }

    fn step(&mut self, state: ParseState, offset: usize, ch: char) -> Result<ParseState, TreeParseError> {
        let unexpected = || TreeParseError::Unexpected { offset, found: ch, expecting: state.expecting() };
        let ws = ch.is_whitespace();

        let next = match state {
            ParseState::Start => match ch {
                _ if ws => state,
                '(' => ParseState::NodeOpen,
                _ => return Err(unexpected()),
            },
            ParseState::NodeOpen => match ch {
                _ if ws => state,
                '(' => ParseState::ContentStart,
                _ => return Err(unexpected()),
            },
            ParseState::ContentStart => match ch {
                _ if ws => state,
                '(' => {
                    self.pairs.clear();
                    self.token.clear();
                    self.token_closed = false;
                    ParseState::LeafPairFirst
                }
                ')' => return Err(unexpected()),
                _ => {
                    self.begin_token(offset, ch);
                    self.in_quote = ch == '"';
                    ParseState::QuestionBody
                }
            },
            ParseState::QuestionBody => match ch {
                '"' => {
                    self.in_quote = !self.in_quote;
                    self.token.push(ch);
                    state
                }
                _ if self.in_quote => {
                    self.token.push(ch);
                    state
                }
                ')' => {
                    let text = self.token.trim();
                    let question = Question::parse(text).ok_or_else(|| {
                        TreeParseError::MissingOperator { offset: self.token_start, text: text.to_string() }
                    })?;
                    self.stack.push(Frame { question, yes: None, no: None });
                    self.token.clear();
                    ParseState::Start
                }
                '(' => return Err(unexpected()),
                _ => {
                    self.token.push(ch);
                    state
                }
            },
            ParseState::LeafPairFirst => match ch {
                '(' | ')' => return Err(unexpected()),
                _ if ws && !self.token.is_empty() => {
                    self.pair_value = std::mem::take(&mut self.token);
                    self.token_closed = false;
                    ParseState::LeafPairSecond
                }
                _ => {
                    self.extend_token(offset, ch);
                    state
                }
            },
            ParseState::LeafPairSecond => match ch {
                ')' => {
                    let prob = self.token.parse::<f64>().map_err(|_| TreeParseError::BadProbability {
                        offset: self.token_start,
                        text: self.token.clone(),
                    })?;
                    self.pairs.push((std::mem::take(&mut self.pair_value), prob));
                    self.token.clear();
                    self.token_closed = false;
                    ParseState::LeafContent
                }
                '(' => return Err(unexpected()),
                _ if self.extend_token(offset, ch) => state,
                _ => return Err(unexpected()),
            },
            ParseState::LeafContent => match ch {
                _ if ws => state,
                '(' => ParseState::LeafPairFirst,
                ')' => return Err(unexpected()),
                _ => {
                    self.begin_token(offset, ch);
                    ParseState::LeafOutput
                }
            },
            ParseState::LeafOutput => match ch {
                ')' => {
                    self.pending_leaf = Some(Leaf {
                        distribution: std::mem::take(&mut self.pairs),
                        most_probable: std::mem::take(&mut self.token),
                    });
                    ParseState::NodeClose
                }
                '(' => return Err(unexpected()),
                _ if self.extend_token(offset, ch) => state,
                _ => return Err(unexpected()),
            },
            ParseState::NodeClose => match ch {
                _ if ws => state,
                ')' => {
                    let node = match self.pending_leaf.take() {
                        Some(leaf) => Node::Leaf(leaf),
                        None => match self.stack.pop() {
                            Some(Frame { question, yes: Some(yes), no: Some(no) }) => {
                                Node::Question { question, yes, no }
                            }
                            _ => return Err(unexpected()),
                        },
                    };
                    self.nodes.push(node);
                    self.complete(self.nodes.len() - 1)
                }
                _ => return Err(unexpected()),
            },
            ParseState::Done => match ch {
                _ if ws => state,
                _ => return Err(TreeParseError::TrailingInput { offset, found: ch }),
            },
        };
        Ok(next)
    }

    /// Attach a finished node to the question waiting for it.
    fn complete(&mut self, id: usize) -> ParseState {
        match self.stack.last_mut() {
            None => {
                self.root = Some(id);
                ParseState::Done
            }
            Some(frame) if frame.yes.is_none() => {
                frame.yes = Some(id);
                ParseState::Start
            }
            Some(frame) => {
                frame.no = Some(id);
                ParseState::NodeClose
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
