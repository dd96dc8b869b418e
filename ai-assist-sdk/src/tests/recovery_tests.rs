//! Tests for response recovery against the built-in templates
//!
//! The raw strings below mimic what chat models actually return: chatty
//! preambles, fenced blocks, trailing commentary.

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::prompts::{LabelGenerationResult, TaskType};
    use crate::recovery::{RecoveryStrategy, ResponseParser};

    const LABELS_JSON: &str = r#"{"suggestions": [{"name": "Pricing", "description": "Mentions of cost", "confidence": 85, "reasoning": "Frequent", "tags": ["cost"]}], "generalAdvice": "Merge overlapping labels"}"#;

    #[test]
    fn test_parse_is_idempotent() {
        let parser = ResponseParser::new();
        let template = TaskType::LabelGeneration.template();
        let raw = format!("Sure, here are some labels:\n```json\n{}\n```", LABELS_JSON);

        let first = parser.parse(&raw, template).unwrap();
        let second = parser.parse(&raw, template).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_fenced_json_is_recovered_by_fence_strategies() {
        let parser = ResponseParser::new();
        let template = TaskType::LabelGeneration.template();

        for raw in [
            format!("```json\n{}\n```", LABELS_JSON),
            format!("```\n\n{}\n```", LABELS_JSON),
            format!("Here you go!\n```json\n{}\n```\nAnything else?", LABELS_JSON),
        ] {
            let recovered = parser.parse(&raw, template).unwrap();
            assert!(
                matches!(
                    recovered.strategy,
                    RecoveryStrategy::FenceStripping | RecoveryStrategy::CleanedBalancedExtraction
                ),
                "unexpected strategy {:?} for {:?}",
                recovered.strategy,
                raw
            );
        }
    }

    #[test]
    fn test_recovered_value_deserializes() {
        let raw = format!("I analysed the sample. {} Let me know if you need more.", LABELS_JSON);
        let recovered = ResponseParser::new()
            .parse(&raw, TaskType::LabelGeneration.template())
            .unwrap();

        let result: LabelGenerationResult = serde_json::from_value(recovered.value).unwrap();
        assert_eq!(result.suggestions[0].name, "Pricing");
        assert_eq!(result.suggestions[0].tags, vec!["cost".to_string()]);
        assert_eq!(result.general_advice, "Merge overlapping labels");
    }

    #[test]
    fn test_json_failing_rules_is_rejected_by_every_strategy() {
        // Valid JSON, but for the wrong task
        let raw = r#"{"themes": [{"name": "Cost", "summary": "People mention prices"}]}"#;
        let err = ResponseParser::new()
            .parse(raw, TaskType::LabelAssignment.template())
            .unwrap_err();

        assert_eq!(err.strategies_tried, RecoveryStrategy::ORDER.len());
        assert!(err.validation_error.is_some());
        assert!(err.preview.starts_with("{\"themes\""));
    }

    #[test]
    fn test_every_template_accepts_its_own_example() {
        let parser = ResponseParser::new();
        let examples = [
            (TaskType::LabelGeneration, json!({"suggestions": [{"name": "A", "description": "B"}]})),
            (TaskType::LabelAssignment, json!({"assignments": [{"label": "A", "confidence": 90}]})),
            (TaskType::ThemeSummary, json!({"themes": [{"name": "A", "summary": "B"}], "overview": "C"})),
        ];

        for (task, value) in examples {
            let recovered = parser.parse(&value.to_string(), task.template()).unwrap();
            assert_eq!(recovered.strategy, RecoveryStrategy::DirectParse);
            assert_eq!(recovered.value, value);
        }
    }
}
