//! Recovery of structured output from raw model text.
//!
//! Models asked for "JSON only" still wrap it in code fences, prepend prose,
//! leak control characters or leave trailing commas. [`recover`] runs an
//! ordered list of strategies and returns the first JSON object any of them
//! produces. If none does, it builds a deterministic placeholder from the raw
//! text, so recovery itself never fails.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Value, json};

/// Characters of raw text used for the fallback post summary.
const FALLBACK_POST_CHARS: usize = 400;
/// Characters of raw text, after the post summary, used for the comment summary.
const FALLBACK_COMMENT_CHARS: usize = 600;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid fenced-block regex")
});

static BALANCED_BRACES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").expect("valid balanced-brace regex")
});

static CONTROL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x1F\x7F]").expect("valid control-char regex"));

static GREEDY_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid greedy-object regex"));

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("valid trailing-comma regex"));

/// Which step of the cascade produced the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Direct,
    FencedBlock,
    BalancedBraces,
    ControlCharsStripped,
    GreedyRepaired,
    Fallback,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::FencedBlock => "fenced_block",
            Strategy::BalancedBraces => "balanced_braces",
            Strategy::ControlCharsStripped => "control_chars_stripped",
            Strategy::GreedyRepaired => "greedy_repaired",
            Strategy::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

type Parser = fn(&str) -> Option<Value>;

/// The cascade, in the order it is attempted.
const STRATEGIES: [(Strategy, Parser); 5] = [
    (Strategy::Direct, parse_direct),
    (Strategy::FencedBlock, parse_fenced_block),
    (Strategy::BalancedBraces, parse_balanced_braces),
    (Strategy::ControlCharsStripped, parse_without_control_chars),
    (Strategy::GreedyRepaired, parse_greedy_repaired),
];

/// A recovered JSON object and the step that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    pub value: Value,
    pub strategy: Strategy,
}

/// Extract a JSON object from `text`, falling back to a placeholder.
pub fn recover(text: &str) -> Recovered {
    for (strategy, parse) in STRATEGIES {
        if let Some(value) = parse(text) {
            if strategy != Strategy::Direct {
                tracing::debug!(%strategy, "Recovered model output");
            }
            return Recovered { value, strategy };
        }
    }

    tracing::warn!(chars = text.chars().count(), "Model output unparseable, using fallback");
    Recovered {
        value: fallback(text),
        strategy: Strategy::Fallback,
    }
}

/// Only objects count as structured output.
fn as_object(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text)
        .ok()
        .filter(Value::is_object)
}

fn parse_direct(text: &str) -> Option<Value> {
    as_object(text.trim())
}

fn parse_fenced_block(text: &str) -> Option<Value> {
    FENCED_BLOCK
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| as_object(m.as_str()))
}

fn parse_balanced_braces(text: &str) -> Option<Value> {
    BALANCED_BRACES
        .find(text)
        .and_then(|m| as_object(m.as_str()))
}

fn parse_without_control_chars(text: &str) -> Option<Value> {
    let cleaned = CONTROL_CHARS.replace_all(text, "");
    as_object(cleaned.trim())
}

fn parse_greedy_repaired(text: &str) -> Option<Value> {
    let candidate = GREEDY_OBJECT.find(text)?.as_str();
    let repaired = TRAILING_COMMA.replace_all(candidate, "$1");
    as_object(&repaired)
}

/// Placeholder built from the raw text when nothing parses.
pub fn fallback(text: &str) -> Value {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(FALLBACK_POST_CHARS).collect();
    let tail: String = chars.take(FALLBACK_COMMENT_CHARS).collect();

    let summary_post = if head.is_empty() {
        "Failed to process the model response".to_string()
    } else {
        head
    };

    let sentiment = json!({
        "label": "Neutral",
        "score": 0.5,
        "details": "Sentiment unavailable: the model response could not be parsed",
    });

    json!({
        "summary_post": summary_post,
        "summary_comments": tail,
        "sentiment_post": sentiment.clone(),
        "sentiment_comments": sentiment,
        "consensus": "Unavailable: the model response could not be parsed",
        "key_controversies": [],
        "useful_links": [],
    })
}
