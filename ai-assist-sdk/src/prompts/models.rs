//! Typed results for the built-in task types
//!
//! Field names follow the camelCase JSON the templates ask the model for.
//! Optional prose fields default to empty so a terse fallback answer still
//! deserializes.

use serde::{Deserialize, Serialize};

/// A proposed label for thematic coding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSuggestion {
    pub name: String,

    pub description: String,

    /// Model confidence, 0-100
    #[serde(default)]
    pub confidence: f64,

    #[serde(default)]
    pub reasoning: String,

    #[serde(default)]
    pub tags: Vec<String>,
}

/// Answer to `TaskType::LabelGeneration`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelGenerationResult {
    pub suggestions: Vec<LabelSuggestion>,

    #[serde(default)]
    pub general_advice: String,
}

/// One existing label chosen for a text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelAssignment {
    pub label: String,

    #[serde(default)]
    pub confidence: f64,

    #[serde(default)]
    pub reasoning: String,
}

/// Answer to `TaskType::LabelAssignment`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelAssignmentResult {
    pub assignments: Vec<LabelAssignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    pub name: String,

    pub summary: String,

    /// Number of rows the theme was observed in
    #[serde(default)]
    pub frequency: u32,
}

/// Answer to `TaskType::ThemeSummary`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeSummaryResult {
    pub themes: Vec<Theme>,

    #[serde(default)]
    pub overview: String,
}
