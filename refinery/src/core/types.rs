//! Shared deterministic types for phase decisions and tool identity.
//!
//! These types are the contract between the agent loop, the interpreter and the
//! tool set. They carry no I/O.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which phase policy an agent run is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseRole {
    Extractor,
    Validator,
    Refiner,
}

impl PhaseRole {
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseRole::Extractor => "extractor",
            PhaseRole::Validator => "validator",
            PhaseRole::Refiner => "refiner",
        }
    }
}

impl fmt::Display for PhaseRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed set of actions a phase may pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolId {
    AnalyzeDocument,
    ReadSection,
    RunExtraction,
    Validate,
    CheckFields,
    CountFields,
    EnhanceField,
}

impl ToolId {
    pub const ALL: [ToolId; 7] = [
        ToolId::AnalyzeDocument,
        ToolId::ReadSection,
        ToolId::RunExtraction,
        ToolId::Validate,
        ToolId::CheckFields,
        ToolId::CountFields,
        ToolId::EnhanceField,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolId::AnalyzeDocument => "analyze_document",
            ToolId::ReadSection => "read_section",
            ToolId::RunExtraction => "run_extraction",
            ToolId::Validate => "validate",
            ToolId::CheckFields => "check_fields",
            ToolId::CountFields => "count_fields",
            ToolId::EnhanceField => "enhance_field",
        }
    }

    /// Resolve an action name, accepting the older tool names as aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        let tool = match name.as_str() {
            "analyze_document" | "pdf_reader" => ToolId::AnalyzeDocument,
            "read_section" | "section_reader" => ToolId::ReadSection,
            "run_extraction" | "llm_extractor" => ToolId::RunExtraction,
            "validate" | "validator" => ToolId::Validate,
            "check_fields" | "quick_validator" => ToolId::CheckFields,
            "count_fields" | "field_counter" => ToolId::CountFields,
            "enhance_field" | "field_enhancer" => ToolId::EnhanceField,
            _ => return None,
        };
        Some(tool)
    }

    /// One-line description shown to the deciding oracle.
    pub fn description(self) -> &'static str {
        match self {
            ToolId::AnalyzeDocument => {
                "survey the source document and summarize its sections and invention content"
            }
            ToolId::ReadSection => {
                "read one named section of the source document (parameters: section_name)"
            }
            ToolId::RunExtraction => {
                "extract a structured invention record from the source document (optional parameters: feedback)"
            }
            ToolId::Validate => "score the working record and list its issues",
            ToolId::CheckFields => "check which required fields are missing from the working record",
            ToolId::CountFields => "count features, keywords and prose lengths in the working record",
            ToolId::EnhanceField => {
                "rewrite one field of the working record (parameters: field_name, optional current_value)"
            }
        }
    }

    /// Whether executing the tool spends an oracle call.
    pub fn uses_oracle(self) -> bool {
        matches!(
            self,
            ToolId::AnalyzeDocument
                | ToolId::ReadSection
                | ToolId::RunExtraction
                | ToolId::EnhanceField
        )
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Action name that ends a phase.
pub const COMPLETE_ACTION: &str = "complete";

/// One oracle-chosen step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub thought: String,
    pub action: String,
    #[serde(default, alias = "tool_params")]
    pub parameters: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Decision {
    /// Decision substituted when the oracle's reply cannot be understood.
    pub fn sentinel() -> Self {
        Self {
            thought: "Parse error".to_string(),
            action: COMPLETE_ACTION.to_string(),
            parameters: Map::new(),
            reason: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.action.trim().eq_ignore_ascii_case(COMPLETE_ACTION)
    }
}

/// Outcome of one executed (or rejected) action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_names_round_trip() {
        for tool in ToolId::ALL {
            assert_eq!(ToolId::from_name(tool.name()), Some(tool));
        }
    }

    #[test]
    fn legacy_names_resolve() {
        assert_eq!(ToolId::from_name("pdf_reader"), Some(ToolId::AnalyzeDocument));
        assert_eq!(ToolId::from_name(" LLM_Extractor "), Some(ToolId::RunExtraction));
        assert_eq!(ToolId::from_name("quick_validator"), Some(ToolId::CheckFields));
        assert_eq!(ToolId::from_name("field_enhancer"), Some(ToolId::EnhanceField));
        assert_eq!(ToolId::from_name("web_search"), None);
        assert_eq!(ToolId::from_name("complete"), None);
    }

    #[test]
    fn decision_accepts_tool_params_alias() {
        let decision: Decision = serde_json::from_value(json!({
            "thought": "t",
            "action": "read_section",
            "tool_params": {"section_name": "Claims"},
        }))
        .expect("decision");
        assert_eq!(decision.parameters["section_name"], "Claims");
        assert_eq!(decision.reason, None);
    }

    #[test]
    fn sentinel_completes() {
        let sentinel = Decision::sentinel();
        assert!(sentinel.is_complete());
        assert_eq!(sentinel.thought, "Parse error");
        assert!(sentinel.parameters.is_empty());
    }
}
