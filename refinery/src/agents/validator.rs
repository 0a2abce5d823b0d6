//! Validation phase: score the record and report its issues.

use crate::agents::session::{AgentState, PhasePolicy, record_validation};
use crate::agents::tools::ToolOutput;
use crate::core::types::{PhaseRole, ToolId};

const TOOLS: [ToolId; 3] = [ToolId::Validate, ToolId::CheckFields, ToolId::CountFields];

#[derive(Debug, Clone, Copy, Default)]
pub struct Validator;

impl PhasePolicy for Validator {
    fn role(&self) -> PhaseRole {
        PhaseRole::Validator
    }

    fn objective(&self) -> &'static str {
        "Score the working record with `validate` and report its issues. \
         Field checks and counts are available for a closer look."
    }

    fn tools(&self) -> &'static [ToolId] {
        &TOOLS
    }

    fn fold(&self, tool: ToolId, output: &ToolOutput, state: &mut AgentState) {
        if tool == ToolId::Validate {
            record_validation(output, state);
        }
    }

    /// One successful validation is enough.
    fn is_done(&self, state: &AgentState) -> bool {
        state.last_score.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use serde_json::json;

    use crate::core::record::Record;

    #[test]
    fn done_after_a_validation_result() {
        let mut state = AgentState::new(PhaseRole::Validator, Record::new(), PathBuf::from("d"));
        assert!(!Validator.is_done(&state));

        Validator.fold(
            ToolId::Validate,
            &ToolOutput::Structured(json!({"score": 72, "valid": false})),
            &mut state,
        );
        assert_eq!(state.last_score, Some(72));
        assert!(Validator.is_done(&state));
    }

    #[test]
    fn validator_never_mutates_the_record() {
        let mut state = AgentState::new(PhaseRole::Validator, Record::new(), PathBuf::from("d"));
        Validator.fold(
            ToolId::CountFields,
            &ToolOutput::Structured(json!({"invention_id": "x"})),
            &mut state,
        );
        assert!(state.record.is_empty());
        assert_eq!(state.last_score, None);
    }
}
