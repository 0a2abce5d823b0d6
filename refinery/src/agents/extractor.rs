//! Extraction phase: build a first record from the source document.

use crate::agents::session::{AgentState, PhasePolicy, merge_extraction};
use crate::agents::tools::ToolOutput;
use crate::core::types::{PhaseRole, ToolId};

/// Populated-field count at which extraction stops early.
pub const EARLY_EXIT_FIELDS: usize = 8;

const TOOLS: [ToolId; 5] = [
    ToolId::AnalyzeDocument,
    ToolId::ReadSection,
    ToolId::RunExtraction,
    ToolId::CheckFields,
    ToolId::CountFields,
];

#[derive(Debug, Clone, Copy, Default)]
pub struct Extractor;

impl PhasePolicy for Extractor {
    fn role(&self) -> PhaseRole {
        PhaseRole::Extractor
    }

    fn objective(&self) -> &'static str {
        "Extract one complete invention record from the attached source document. \
         Survey or read sections when the document structure is unclear, run the extraction, \
         and check which fields are still missing."
    }

    fn tools(&self) -> &'static [ToolId] {
        &TOOLS
    }

    fn fold(&self, tool: ToolId, output: &ToolOutput, state: &mut AgentState) {
        if tool == ToolId::RunExtraction {
            merge_extraction(output, state);
        }
    }

    fn is_done(&self, state: &AgentState) -> bool {
        state.record.populated_fields() >= EARLY_EXIT_FIELDS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use serde_json::json;

    use crate::core::record::Record;
    use crate::test_support::perfect_record;

    #[test]
    fn stops_once_most_fields_are_populated() {
        let mut state = AgentState::new(PhaseRole::Extractor, Record::new(), PathBuf::from("d"));
        assert!(!Extractor.is_done(&state));

        state.record = perfect_record();
        assert!(Extractor.is_done(&state));
    }

    #[test]
    fn only_extraction_changes_the_record() {
        let mut state = AgentState::new(PhaseRole::Extractor, Record::new(), PathBuf::from("d"));
        let output = ToolOutput::Structured(json!({"invention_id": "INV-1"}));

        Extractor.fold(ToolId::CheckFields, &output, &mut state);
        assert!(state.record.is_empty());

        Extractor.fold(ToolId::RunExtraction, &output, &mut state);
        assert_eq!(state.record.text("invention_id"), "INV-1");
    }

    #[test]
    fn cannot_validate_or_enhance() {
        assert!(!Extractor.tools().contains(&ToolId::Validate));
        assert!(!Extractor.tools().contains(&ToolId::EnhanceField));
    }
}
