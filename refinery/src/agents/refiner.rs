//! Refinement phase: address validator feedback field by field.

use crate::agents::session::{AgentState, PhasePolicy, apply_enhancement, merge_extraction};
use crate::agents::tools::ToolOutput;
use crate::core::types::{PhaseRole, ToolId};

const TOOLS: [ToolId; 5] = [
    ToolId::RunExtraction,
    ToolId::EnhanceField,
    ToolId::ReadSection,
    ToolId::CountFields,
    ToolId::CheckFields,
];

#[derive(Debug, Clone, Copy, Default)]
pub struct Refiner;

impl PhasePolicy for Refiner {
    fn role(&self) -> PhaseRole {
        PhaseRole::Refiner
    }

    fn objective(&self) -> &'static str {
        "Improve the working record until the validator feedback is resolved. \
         Prefer `enhance_field` for individual weak fields and `run_extraction` \
         when several fields are missing. Re-read document sections for missing detail."
    }

    fn tools(&self) -> &'static [ToolId] {
        &TOOLS
    }

    fn fold(&self, tool: ToolId, output: &ToolOutput, state: &mut AgentState) {
        match tool {
            ToolId::RunExtraction => merge_extraction(output, state),
            ToolId::EnhanceField => apply_enhancement(output, state),
            _ => {}
        }
    }
}
