//! Prompt rendering for decision and tool calls.

use anyhow::{Context, Result};
use minijinja::Environment;
use serde::Serialize;

const DECISION_TEMPLATE: &str = include_str!("prompts/decision.md");
const ANALYZE_DOCUMENT_TEMPLATE: &str = include_str!("prompts/analyze_document.md");
const READ_SECTION_TEMPLATE: &str = include_str!("prompts/read_section.md");
const EXTRACTION_TEMPLATE: &str = include_str!("prompts/extraction.md");
const ENHANCE_FIELD_TEMPLATE: &str = include_str!("prompts/enhance_field.md");

/// Action line shown in the decision prompt.
#[derive(Debug, Clone, Serialize)]
pub struct ActionLine {
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionPrompt<'a> {
    pub role: &'a str,
    pub objective: &'a str,
    pub iteration: u32,
    pub max_iterations: u32,
    pub calls_remaining: u32,
    pub populated: usize,
    pub required: usize,
    pub last_score: Option<u32>,
    pub record_json: String,
    pub feedback: Option<String>,
    pub last_observation: Option<&'a str>,
    pub tools: Vec<ActionLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionPrompt<'a> {
    pub document_name: &'a str,
    pub categories: &'a [&'a str],
    pub current_record: Option<String>,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnhancePrompt<'a> {
    pub field_name: &'a str,
    pub current_value: String,
    pub record_json: String,
    /// Instruction describing the expected reply shape.
    pub shape: &'a str,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("decision", DECISION_TEMPLATE)
            .expect("decision template should be valid");
        env.add_template("analyze_document", ANALYZE_DOCUMENT_TEMPLATE)
            .expect("analyze_document template should be valid");
        env.add_template("read_section", READ_SECTION_TEMPLATE)
            .expect("read_section template should be valid");
        env.add_template("extraction", EXTRACTION_TEMPLATE)
            .expect("extraction template should be valid");
        env.add_template("enhance_field", ENHANCE_FIELD_TEMPLATE)
            .expect("enhance_field template should be valid");
        Self { env }
    }

    pub fn render_decision(&self, input: &DecisionPrompt<'_>) -> Result<String> {
        self.render("decision", input)
    }

    pub fn render_analyze_document(&self, document_name: &str, max_words: u32) -> Result<String> {
        self.render(
            "analyze_document",
            minijinja::context! { document_name, max_words },
        )
    }

    pub fn render_read_section(&self, document_name: &str, section_name: &str) -> Result<String> {
        self.render(
            "read_section",
            minijinja::context! { document_name, section_name },
        )
    }

    pub fn render_extraction(&self, input: &ExtractionPrompt<'_>) -> Result<String> {
        self.render("extraction", input)
    }

    pub fn render_enhance_field(&self, input: &EnhancePrompt<'_>) -> Result<String> {
        self.render("enhance_field", input)
    }

    fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<String> {
        let template = self.env.get_template(name)?;
        template
            .render(ctx)
            .with_context(|| format!("render {name} prompt"))
    }
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision_input() -> DecisionPrompt<'static> {
        DecisionPrompt {
            role: "validator",
            objective: "Score the record.",
            iteration: 1,
            max_iterations: 2,
            calls_remaining: 7,
            populated: 4,
            required: 10,
            last_score: None,
            record_json: "{\"invention_id\": \"INV-1\"}".to_string(),
            feedback: None,
            last_observation: None,
            tools: vec![
                ActionLine {
                    name: "validate",
                    description: "score it",
                },
                ActionLine {
                    name: "count_fields",
                    description: "count it",
                },
            ],
        }
    }

    #[test]
    fn decision_prompt_lists_actions_and_contract() {
        let rendered = PromptEngine::new()
            .render_decision(&decision_input())
            .expect("render");

        assert!(rendered.contains("You are the validator agent"));
        assert!(rendered.contains("- `validate`: score it"));
        assert!(rendered.contains("- `count_fields`: count it"));
        assert!(rendered.contains("- `complete`: finish this phase."));
        assert!(rendered.contains("Step 1 of 2"));
        assert!(rendered.contains("\"action\": \"<action name>\""));
        assert!(!rendered.contains("Last validation score"));
        assert!(!rendered.contains("<feedback>"));
    }

    #[test]
    fn decision_prompt_includes_optional_sections() {
        let mut input = decision_input();
        input.last_score = Some(62);
        input.feedback = Some("Insufficient keywords (need 5+)".to_string());
        input.last_observation = Some("error: unknown action 'web_search'");

        let rendered = PromptEngine::new().render_decision(&input).expect("render");
        assert!(rendered.contains("Last validation score: 62 / 100."));
        assert!(rendered.contains("<feedback>\nInsufficient keywords (need 5+)\n</feedback>"));
        assert!(rendered.contains("unknown action 'web_search'"));
    }

    #[test]
    fn extraction_prompt_lists_categories_and_feedback() {
        let rendered = PromptEngine::new()
            .render_extraction(&ExtractionPrompt {
                document_name: "disclosure.pdf",
                categories: &["Process", "Machine"],
                current_record: None,
                feedback: Some("Technical description too brief".to_string()),
            })
            .expect("render");

        assert!(rendered.contains("`disclosure.pdf`"));
        assert!(rendered.contains("one of \"Process\", \"Machine\""));
        assert!(rendered.contains("Technical description too brief"));
        assert!(!rendered.contains("### Current Record"));
    }

    #[test]
    fn tool_prompts_render() {
        let engine = PromptEngine::new();
        let section = engine
            .render_read_section("doc.pdf", "Claims")
            .expect("render");
        assert!(section.contains("\"Claims\""));

        let survey = engine.render_analyze_document("doc.pdf", 400).expect("render");
        assert!(survey.contains("under 400 words"));

        let enhance = engine
            .render_enhance_field(&EnhancePrompt {
                field_name: "inventor_keywords",
                current_value: "[\"pump\"]".to_string(),
                record_json: "{}".to_string(),
                shape: "Reply with a JSON array of strings.",
            })
            .expect("render");
        assert!(enhance.contains("`inventor_keywords`"));
        assert!(enhance.contains("JSON array of strings"));
    }
}
