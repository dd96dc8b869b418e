//! Prompt templates
//!
//! A `PromptTemplate` bundles everything the pipeline needs to ask for one
//! kind of structured answer: the system message, the user prompt with
//! `{{name}}` placeholders, an optional simplified fallback prompt, a
//! description of the expected output and the structural rules a parsed
//! answer must satisfy.

mod models;
mod overrides;
mod registry;

pub use models::*;
pub use overrides::CustomPromptStore;
pub use registry::TaskType;

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

/// Matches `{{name}}` placeholders
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("placeholder pattern is valid")
});

/// The two messages sent to a completion provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system_message: String,
    pub user_prompt: String,
}

impl Prompt {
    pub fn new(system_message: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_message: system_message.into(),
            user_prompt: user_prompt.into(),
        }
    }
}

/// Values substituted into template placeholders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptData(Map<String, Value>);

impl PromptData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String form used when substituting a placeholder
    fn render_value(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Array(_) | Value::Object(_) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            other => other.to_string(),
        }
    }
}

impl From<Map<String, Value>> for PromptData {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Objects become placeholder maps; any other JSON value yields no data
impl From<Value> for PromptData {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }
}

/// Result of substituting placeholders into a template string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedText {
    pub text: String,

    /// Placeholder names with no value in the data, left verbatim in `text`
    pub unresolved: Vec<String>,
}

/// Replace every `{{key}}` with the string form of `data[key]`
pub fn render_placeholders(template: &str, data: &PromptData) -> RenderedText {
    let mut unresolved = Vec::new();

    let text = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        let key = &caps[1];
        match data.get(key) {
            Some(value) => PromptData::render_value(value),
            None => {
                if !unresolved.iter().any(|k| k == key) {
                    unresolved.push(key.to_string());
                }
                caps[0].to_string()
            }
        }
    });

    RenderedText {
        text: text.into_owned(),
        unresolved,
    }
}

/// One structural check a parsed answer must pass
#[derive(Clone)]
pub struct ValidationRule {
    description: String,
    check: Arc<dyn Fn(&Value) -> bool + Send + Sync>,
}

impl ValidationRule {
    pub fn new(
        description: impl Into<String>,
        check: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            check: Arc::new(check),
        }
    }

    /// `field` is present (any value, including null)
    pub fn has_field(field: &'static str) -> Self {
        Self::new(format!("has field `{}`", field), move |v| v.get(field).is_some())
    }

    /// `field` is a JSON array
    pub fn is_array(field: &'static str) -> Self {
        Self::new(format!("`{}` is a list", field), move |v| {
            v.get(field).map_or(false, Value::is_array)
        })
    }

    /// `field` is a JSON string
    pub fn is_string(field: &'static str) -> Self {
        Self::new(format!("`{}` is a string", field), move |v| {
            v.get(field).map_or(false, Value::is_string)
        })
    }

    /// Every element of the `field` array is an object carrying all `required` keys
    pub fn every_item_has(field: &'static str, required: &'static [&'static str]) -> Self {
        Self::new(
            format!("every item of `{}` has {}", field, required.join(", ")),
            move |v| {
                v.get(field)
                    .and_then(Value::as_array)
                    .map_or(false, |items| {
                        items.iter().all(|item| {
                            item.is_object() && required.iter().all(|key| item.get(*key).is_some())
                        })
                    })
            },
        )
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn check(&self, value: &Value) -> bool {
        (self.check)(value)
    }
}

impl fmt::Debug for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ValidationRule").field(&self.description).finish()
    }
}

/// Prompt structure and validation contract for one task type
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// Task key, also used to look up custom system-prompt overrides
    pub id: String,

    pub system_message: String,

    /// User prompt with `{{name}}` placeholders
    pub user_prompt_template: String,

    /// Simplified prompt tried once after all primary attempts fail
    pub fallback_prompt: Option<String>,

    /// Human-readable description of the expected output
    pub expected_format: String,

    /// Rules a parsed answer must satisfy; none means anything is accepted
    pub validation_rules: Vec<ValidationRule>,
}

impl PromptTemplate {
    pub fn new(
        id: impl Into<String>,
        system_message: impl Into<String>,
        user_prompt_template: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            system_message: system_message.into(),
            user_prompt_template: user_prompt_template.into(),
            fallback_prompt: None,
            expected_format: String::new(),
            validation_rules: Vec::new(),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback_prompt = Some(fallback.into());
        self
    }

    pub fn with_expected_format(mut self, format: impl Into<String>) -> Self {
        self.expected_format = format.into();
        self
    }

    pub fn with_rule(mut self, rule: ValidationRule) -> Self {
        self.validation_rules.push(rule);
        self
    }

    /// Check `value` against every rule, reporting the first one that fails
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        match self.validation_rules.iter().find(|rule| !rule.check(value)) {
            Some(rule) => Err(format!("validation failed: {}", rule.description())),
            None => Ok(()),
        }
    }

    /// Build the primary prompt, optionally replacing the system message
    pub fn build_prompt(&self, data: &PromptData, system_override: Option<&str>) -> (Prompt, Vec<String>) {
        self.build_from(&self.user_prompt_template, data, system_override)
    }

    /// Build the fallback prompt if the template has one
    pub fn build_fallback_prompt(
        &self,
        data: &PromptData,
        system_override: Option<&str>,
    ) -> Option<(Prompt, Vec<String>)> {
        self.fallback_prompt
            .as_deref()
            .map(|fallback| self.build_from(fallback, data, system_override))
    }

    fn build_from(
        &self,
        user_template: &str,
        data: &PromptData,
        system_override: Option<&str>,
    ) -> (Prompt, Vec<String>) {
        let rendered = render_placeholders(user_template, data);
        let system = system_override.unwrap_or(&self.system_message);
        (Prompt::new(system, rendered.text), rendered.unresolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_substitutes_and_keeps_unresolved() {
        let data = PromptData::new()
            .with("column", "Feedback")
            .with("count", 5)
            .with("labels", json!(["Price", "Support"]));

        let rendered = render_placeholders(
            "Column {{column}}, {{count}} labels, known {{labels}}, missing {{context}} {{context}}",
            &data,
        );

        assert!(rendered.text.starts_with("Column Feedback, 5 labels"));
        assert!(rendered.text.contains("\"Price\""));
        assert!(rendered.text.ends_with("missing {{context}} {{context}}"));
        assert_eq!(rendered.unresolved, vec!["context".to_string()]);
    }

    #[test]
    fn test_single_braces_are_not_placeholders() {
        let rendered = render_placeholders(r#"Return {"name": "{{name}}"}"#, &PromptData::new().with("name", "x"));
        assert_eq!(rendered.text, r#"Return {"name": "x"}"#);
    }

    #[test]
    fn test_rules() {
        let template = PromptTemplate::new("t", "sys", "user")
            .with_rule(ValidationRule::has_field("items"))
            .with_rule(ValidationRule::is_array("items"))
            .with_rule(ValidationRule::every_item_has("items", &["id"]));

        assert!(template.validate(&json!({"items": [{"id": 1}]})).is_ok());
        assert!(template.validate(&json!({"items": []})).is_ok());

        let err = template.validate(&json!({"items": [{"name": "x"}]})).unwrap_err();
        assert!(err.contains("every item of `items` has id"));
        assert!(template.validate(&json!({"items": "nope"})).is_err());
        assert!(template.validate(&json!({})).is_err());
    }

    #[test]
    fn test_template_without_rules_accepts_anything() {
        let template = PromptTemplate::new("free", "sys", "user");
        assert!(template.validate(&json!(42)).is_ok());
    }

    #[test]
    fn test_build_prompt_with_override() {
        let template = PromptTemplate::new("t", "default system", "Hello {{who}}")
            .with_fallback("Hi {{who}}");
        let data = PromptData::new().with("who", "team");

        let (prompt, unresolved) = template.build_prompt(&data, Some("custom system"));
        assert_eq!(prompt, Prompt::new("custom system", "Hello team"));
        assert!(unresolved.is_empty());

        let (fallback, _) = template.build_fallback_prompt(&data, None).unwrap();
        assert_eq!(fallback, Prompt::new("default system", "Hi team"));
    }

    #[test]
    fn test_prompt_data_from_non_object_is_empty() {
        assert_eq!(PromptData::from(json!([1, 2])), PromptData::new());
        assert_eq!(
            PromptData::from(json!({"a": 1})).get("a"),
            Some(&json!(1))
        );
    }
}
