//! Separates speakable agent output from internal narration.
//!
//! The live model occasionally emits text describing its own plan or the tool
//! it is about to call. That text must never reach the listener. The check is
//! a heuristic: an ordered list of rules where the first match classifies the
//! fragment as internal. Short technical speech can be suppressed and long
//! narration without trigger words can leak through.

use crate::tools::ENCYCLOPEDIA_TOOL_NAME;
use once_cell::sync::Lazy;
use regex::Regex;

/// Fragments mentioning meta vocabulary are only suppressed above this many
/// characters; shorter ones ("the control parameter") are usually content.
pub const META_LENGTH_THRESHOLD: usize = 50;

static EMPHASIS_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*[^*]+\*\*").expect("Invalid regex pattern for emphasis span"));

static PLANNING_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:i(?:'|’)ve decided|i will now|i(?:'|’)m going to|let me|i(?:'|’)ll proceed)\b")
        .expect("Invalid regex pattern for planning phrase")
});

static META_VOCABULARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:tools?|functions?|arguments?|parameters?|calling)\b")
        .expect("Invalid regex pattern for meta vocabulary")
});

/// A single classification rule, checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningRule {
    /// `**bold**` markup.
    EmphasisSpan,
    /// A backtick anywhere in the fragment.
    InlineCode,
    /// The literal name of the page generation tool.
    ToolName,
    /// "I've decided", "I will now", "I'm going to", "Let me", "I'll proceed".
    PlanningPhrase,
    /// Tool/function/argument vocabulary in a fragment longer than
    /// [`META_LENGTH_THRESHOLD`].
    LongMetaNarration,
}

pub const RULES: [ReasoningRule; 5] = [
    ReasoningRule::EmphasisSpan,
    ReasoningRule::InlineCode,
    ReasoningRule::ToolName,
    ReasoningRule::PlanningPhrase,
    ReasoningRule::LongMetaNarration,
];

impl ReasoningRule {
    pub fn matches(self, text: &str) -> bool {
        match self {
            Self::EmphasisSpan => EMPHASIS_SPAN.is_match(text),
            Self::InlineCode => text.contains('`'),
            Self::ToolName => text.contains(ENCYCLOPEDIA_TOOL_NAME),
            Self::PlanningPhrase => PLANNING_PHRASE.is_match(text),
            Self::LongMetaNarration => {
                text.chars().count() > META_LENGTH_THRESHOLD && META_VOCABULARY.is_match(text)
            }
        }
    }
}

/// Returns the first rule that marks `text` as internal, if any.
pub fn classify(text: &str) -> Option<ReasoningRule> {
    RULES.into_iter().find(|rule| rule.matches(text))
}

pub fn is_internal_reasoning(text: &str) -> bool {
    classify(text).is_some()
}
