//! Built-in task types and their templates
//!
//! Each `TaskType` resolves once to a static `PromptTemplate`.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::{PromptTemplate, ValidationRule};

const JSON_ONLY: &str = "Always answer with a single valid JSON object. \
Do not wrap it in markdown and do not add any text before or after it.";

static LABEL_GENERATION: Lazy<PromptTemplate> = Lazy::new(|| {
    PromptTemplate::new(
        TaskType::LabelGeneration.as_str(),
        format!(
            "You are an expert qualitative researcher who designs coding schemes for \
             thematic analysis of survey and interview data. {}",
            JSON_ONLY
        ),
        "Analyze the following responses from the column \"{{columnName}}\" and propose \
         up to {{maxSuggestions}} labels for thematic coding.\n\n\
         Project context: {{projectContext}}\n\n\
         Labels that already exist (do not repeat them): {{existingLabels}}\n\n\
         Sample responses:\n{{sampleData}}\n\n\
         Respond with JSON in exactly this format:\n\
         {\"suggestions\": [{\"name\": \"short label\", \"description\": \"what the label covers\", \
         \"confidence\": 0-100, \"reasoning\": \"why this label fits the data\", \"tags\": [\"keyword\"]}], \
         \"generalAdvice\": \"advice on the coding scheme as a whole\"}",
    )
    .with_fallback(
        "List up to {{maxSuggestions}} short labels that describe these responses:\n{{sampleData}}\n\n\
         Return only this JSON: {\"suggestions\": [{\"name\": \"label\", \"description\": \"one sentence\", \
         \"confidence\": 50, \"reasoning\": \"\", \"tags\": []}], \"generalAdvice\": \"\"}",
    )
    .with_expected_format(
        "{ suggestions: [{ name, description, confidence, reasoning, tags[] }], generalAdvice }",
    )
    .with_rule(ValidationRule::has_field("suggestions"))
    .with_rule(ValidationRule::is_array("suggestions"))
    .with_rule(ValidationRule::every_item_has("suggestions", &["name", "description"]))
});

static LABEL_ASSIGNMENT: Lazy<PromptTemplate> = Lazy::new(|| {
    PromptTemplate::new(
        TaskType::LabelAssignment.as_str(),
        format!(
            "You are a careful annotator applying an existing coding scheme to qualitative data. \
             Only use labels from the provided list. {}",
            JSON_ONLY
        ),
        "Available labels:\n{{labels}}\n\n\
         Text to annotate:\n\"{{text}}\"\n\n\
         Pick every label that applies. Respond with JSON in exactly this format:\n\
         {\"assignments\": [{\"label\": \"label name from the list\", \"confidence\": 0-100, \
         \"reasoning\": \"short justification\"}]}",
    )
    .with_fallback(
        "Which of these labels apply to the text?\nLabels: {{labels}}\nText: \"{{text}}\"\n\n\
         Return only this JSON: {\"assignments\": [{\"label\": \"name\"}]}",
    )
    .with_expected_format("{ assignments: [{ label, confidence, reasoning }] }")
    .with_rule(ValidationRule::has_field("assignments"))
    .with_rule(ValidationRule::is_array("assignments"))
    .with_rule(ValidationRule::every_item_has("assignments", &["label"]))
});

static THEME_SUMMARY: Lazy<PromptTemplate> = Lazy::new(|| {
    PromptTemplate::new(
        TaskType::ThemeSummary.as_str(),
        format!(
            "You are a qualitative research analyst summarizing coded data into themes. {}",
            JSON_ONLY
        ),
        "Research question: {{researchQuestion}}\n\n\
         Labeled rows (text and assigned labels):\n{{labeledData}}\n\n\
         Identify the main themes. Respond with JSON in exactly this format:\n\
         {\"themes\": [{\"name\": \"theme\", \"summary\": \"two or three sentences\", \
         \"frequency\": 0}], \"overview\": \"one paragraph overview\"}",
    )
    .with_expected_format("{ themes: [{ name, summary, frequency }], overview }")
    .with_rule(ValidationRule::has_field("themes"))
    .with_rule(ValidationRule::is_array("themes"))
    .with_rule(ValidationRule::every_item_has("themes", &["name", "summary"]))
});

/// Closed set of structured-suggestion tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// Propose new labels for a column sample
    LabelGeneration,

    /// Choose existing labels for one text
    LabelAssignment,

    /// Summarize labeled rows into themes
    ThemeSummary,
}

impl TaskType {
    pub const ALL: [TaskType; 3] = [
        TaskType::LabelGeneration,
        TaskType::LabelAssignment,
        TaskType::ThemeSummary,
    ];

    /// Stable key, used for template ids and custom prompt overrides
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::LabelGeneration => "LABEL_GENERATION",
            TaskType::LabelAssignment => "LABEL_ASSIGNMENT",
            TaskType::ThemeSummary => "THEME_SUMMARY",
        }
    }

    /// The template registered for this task
    pub fn template(&self) -> &'static PromptTemplate {
        match self {
            TaskType::LabelGeneration => &LABEL_GENERATION,
            TaskType::LabelAssignment => &LABEL_ASSIGNMENT,
            TaskType::ThemeSummary => &THEME_SUMMARY,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|task| task.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown task type '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::{render_placeholders, PromptData};
    use serde_json::json;

    #[test]
    fn test_every_task_resolves_to_its_own_template() {
        for task in TaskType::ALL {
            let template = task.template();
            assert_eq!(template.id, task.as_str());
            assert!(!template.validation_rules.is_empty());
            assert!(!template.expected_format.is_empty());
        }
    }

    #[test]
    fn test_task_type_parsing() {
        assert_eq!("label_generation".parse::<TaskType>(), Ok(TaskType::LabelGeneration));
        assert_eq!("THEME_SUMMARY".parse::<TaskType>(), Ok(TaskType::ThemeSummary));
        assert!("sentiment".parse::<TaskType>().is_err());
        assert_eq!(
            serde_json::to_value(TaskType::LabelAssignment).unwrap(),
            json!("LABEL_ASSIGNMENT")
        );
    }

    #[test]
    fn test_label_generation_rules() {
        let template = TaskType::LabelGeneration.template();

        let valid = json!({
            "suggestions": [{"name": "Pricing", "description": "Cost concerns", "confidence": 80}],
            "generalAdvice": "Keep labels short"
        });
        assert!(template.validate(&valid).is_ok());

        let missing_description = json!({"suggestions": [{"name": "Pricing"}]});
        assert!(template.validate(&missing_description).is_err());
    }

    #[test]
    fn test_label_generation_template_fully_renders() {
        let data = PromptData::new()
            .with("columnName", "Feedback")
            .with("maxSuggestions", 5)
            .with("projectContext", "Customer survey")
            .with("existingLabels", json!([]))
            .with("sampleData", json!(["Too expensive", "Great support"]));

        let template = TaskType::LabelGeneration.template();
        let rendered = render_placeholders(&template.user_prompt_template, &data);
        assert!(rendered.unresolved.is_empty());
        assert!(rendered.text.contains("Too expensive"));
        assert!(!rendered.text.contains("{{"));
    }
}
