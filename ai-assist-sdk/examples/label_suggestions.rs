//! Label Suggestion Example
//!
//! Asks the configured provider to propose labels for a handful of survey
//! answers and prints what came back, including how the answer was recovered.
//!
//! To run this example:
//! ```
//! LABELING_OPENAI_API_KEY=your_api_key cargo run --example label_suggestions
//! ```
//!
//! Set `LABELING_AI_PROVIDER=openrouter` and `LABELING_OPENROUTER_API_KEY`
//! to use OpenRouter instead.

use std::sync::Arc;

use ai_assist_sdk::{
    prompts::LabelGenerationResult, CompletionClient, Orchestrator, PromptData, RetryConfig,
    SettingsLoader, TaskType,
};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    println!("Label Suggestion Example");

    let client = CompletionClient::from_loader(SettingsLoader::from_env())?;
    let settings = client.settings().await;
    if !settings.active().has_credential() {
        eprintln!(
            "Please set LABELING_{}_API_KEY environment variable",
            settings.provider.as_str().to_uppercase()
        );
        std::process::exit(1);
    }

    let orchestrator = Orchestrator::new(Arc::new(client));

    let data = PromptData::new()
        .with("columnName", "What could we improve?")
        .with("projectContext", "Customer satisfaction survey for a meal-kit delivery service")
        .with("existingLabels", json!(["Delivery"]))
        .with("maxSuggestions", 4)
        .with(
            "sampleData",
            json!([
                "Boxes arrive late on Fridays",
                "Too expensive for two people",
                "Recipes repeat every few weeks",
                "Would love more vegetarian options",
                "Price went up again this month"
            ]),
        );

    println!("Requesting label suggestions from {}...", settings.provider);

    let result = orchestrator
        .process_task::<LabelGenerationResult>(
            TaskType::LabelGeneration,
            &data,
            Some(RetryConfig::new(2, 1000, true)),
        )
        .await;

    println!(
        "\nFinished after {} call(s), recovered via {}",
        result.attempts,
        result
            .strategy
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string())
    );

    match result.into_result() {
        Ok(labels) => {
            for suggestion in &labels.suggestions {
                println!(
                    "- {} ({:.0}%): {}",
                    suggestion.name, suggestion.confidence, suggestion.description
                );
            }
            if !labels.general_advice.is_empty() {
                println!("\nAdvice: {}", labels.general_advice);
            }
        }
        Err(error) => eprintln!("Could not get suggestions: {}", error),
    }

    Ok(())
}
