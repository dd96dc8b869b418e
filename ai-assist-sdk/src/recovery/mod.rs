//! Response recovery parser
//!
//! Model output is unreliable in predictable ways: prose around the JSON,
//! markdown fences, truncated trailing text. The parser tries a fixed
//! sequence of strategies, each aimed at one of those failure modes, and
//! accepts the first candidate that is valid JSON *and* passes every
//! validation rule of the template.
//!
//! The parser never fails loudly. A response nothing can be salvaged from
//! comes back as a `ParseError` value carrying a preview of the raw text.

mod extract;

use std::fmt;

use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::prompts::PromptTemplate;
use crate::util::truncate_string;

/// Number of raw-response characters embedded in a `ParseError`
pub const PREVIEW_CHARS: usize = 200;

/// One technique for salvaging JSON from free-form text, in the order tried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// The whole response parses as JSON
    DirectParse,

    /// First `{` to its matching `}` in the raw response
    BalancedExtraction,

    /// Markdown fences removed, then parsed whole
    FenceStripping,

    /// Balanced extraction on the fence-stripped text
    CleanedBalancedExtraction,

    /// Lines from the first `{`-led line to the first `}`-ended line
    LineWindow,
}

impl RecoveryStrategy {
    pub const ORDER: [RecoveryStrategy; 5] = [
        RecoveryStrategy::DirectParse,
        RecoveryStrategy::BalancedExtraction,
        RecoveryStrategy::FenceStripping,
        RecoveryStrategy::CleanedBalancedExtraction,
        RecoveryStrategy::LineWindow,
    ];

    /// Text this strategy would hand to the JSON parser, if any.
    ///
    /// Balanced extraction on the raw text is skipped when the object it
    /// would pick opens inside a fenced block; that case belongs to the
    /// fence-aware strategies.
    fn candidate(self, raw: &str) -> Option<String> {
        match self {
            RecoveryStrategy::DirectParse => Some(raw.trim().to_string()),
            RecoveryStrategy::BalancedExtraction => {
                if extract::opens_inside_fence(raw) {
                    None
                } else {
                    extract::extract_balanced(raw).map(str::to_string)
                }
            }
            RecoveryStrategy::FenceStripping => {
                if extract::has_fence(raw) {
                    Some(extract::strip_fences(raw))
                } else {
                    None
                }
            }
            RecoveryStrategy::CleanedBalancedExtraction => {
                let cleaned = extract::strip_fences(raw);
                extract::extract_balanced(&cleaned).map(str::to_string)
            }
            RecoveryStrategy::LineWindow => extract::line_window(raw),
        }
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecoveryStrategy::DirectParse => "direct parse",
            RecoveryStrategy::BalancedExtraction => "balanced extraction",
            RecoveryStrategy::FenceStripping => "fence stripping",
            RecoveryStrategy::CleanedBalancedExtraction => "cleaned balanced extraction",
            RecoveryStrategy::LineWindow => "line window",
        };
        f.write_str(name)
    }
}

/// A validated value and the strategy that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    pub value: Value,
    pub strategy: RecoveryStrategy,
}

/// Every strategy was exhausted without a valid result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Number of strategies attempted
    pub strategies_tried: usize,

    /// Leading characters of the raw response
    pub preview: String,

    /// Last validation rule that rejected otherwise valid JSON
    pub validation_error: Option<String>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to parse AI response: all {} recovery strategies exhausted",
            self.strategies_tried
        )?;
        if let Some(ref reason) = self.validation_error {
            write!(f, " (last {})", reason)?;
        }
        write!(f, ". Response preview: {}", self.preview)
    }
}

impl std::error::Error for ParseError {}

/// Applies the recovery strategies against a template's validation rules
#[derive(Debug, Clone)]
pub struct ResponseParser {
    preview_chars: usize,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self {
            preview_chars: PREVIEW_CHARS,
        }
    }
}

impl ResponseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Change how much of the raw response failures embed
    pub fn with_preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }

    /// Extract a structurally valid JSON value from `raw`
    pub fn parse(&self, raw: &str, template: &PromptTemplate) -> Result<Recovered, ParseError> {
        let mut validation_error = None;

        for strategy in RecoveryStrategy::ORDER {
            let Some(candidate) = strategy.candidate(raw) else {
                continue;
            };

            let value = match serde_json::from_str::<Value>(&candidate) {
                Ok(value) if value.is_object() || value.is_array() => value,
                _ => continue,
            };

            match template.validate(&value) {
                Ok(()) => {
                    debug!("Recovered '{}' response via {}", template.id, strategy);
                    return Ok(Recovered { value, strategy });
                }
                Err(reason) => {
                    debug!("{} produced JSON rejected for '{}': {}", strategy, template.id, reason);
                    validation_error = Some(reason);
                }
            }
        }

        Err(ParseError {
            strategies_tried: RecoveryStrategy::ORDER.len(),
            preview: truncate_string(raw, self.preview_chars),
            validation_error,
        })
    }
}
