//! Budgeted extraction → validation → refinement orchestration.
//!
//! [`Orchestrator::run`] drives the three phases in sequence for one document,
//! charging every oracle call against a single [`Budget`] and repeating
//! refine/validate rounds until the score threshold is met, the round limit is
//! reached, or the budget runs out.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

use crate::agents::extractor::Extractor;
use crate::agents::refiner::Refiner;
use crate::agents::session::{
    AgentRun, AgentState, PhaseEnv, PhaseLimits, PhasePolicy, PhaseStop, StepRecord, run_phase,
};
use crate::agents::tools::{GenerationSettings, ToolSettings};
use crate::agents::validator::Validator;
use crate::core::budget::{Budget, extractor_cap, refiner_cap, validator_cap};
use crate::core::record::Record;
use crate::core::scoring::{self, ScoreResult};
use crate::core::types::{PhaseRole, ToolId};
use crate::io::gateway::Gateway;
use crate::io::pacer::Pacer;
use crate::io::prompt::PromptEngine;

/// Immutable orchestration settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub max_calls: u32,
    pub score_threshold: u32,
    pub max_refinement_rounds: u32,
    pub extractor_max_iterations: u32,
    pub validator_max_iterations: u32,
    pub refiner_max_iterations: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_calls: 24,
            score_threshold: 85,
            max_refinement_rounds: 3,
            extractor_max_iterations: 8,
            validator_max_iterations: 2,
            refiner_max_iterations: 5,
        }
    }
}

/// Final artifact of one orchestration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub record: Record,
    pub score: ScoreResult,
    pub total_calls: u32,
    pub threshold_met: bool,
    pub budget_exceeded: bool,
}

/// What one phase run did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseReport {
    pub role: PhaseRole,
    /// 0 for the initial extraction and validation, then 1.. per refinement round.
    pub round: u32,
    pub limits: PhaseLimits,
    pub iterations: u32,
    pub oracle_calls: u32,
    pub stop: PhaseStop,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    pub steps: Vec<StepRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Orchestration {
    pub result: OrchestrationResult,
    pub phases: Vec<PhaseReport>,
}

impl Orchestration {
    pub fn refinement_rounds(&self) -> u32 {
        self.phases
            .iter()
            .filter(|phase| phase.role == PhaseRole::Refiner)
            .count() as u32
    }

    pub fn runs_of(&self, role: PhaseRole) -> usize {
        self.phases.iter().filter(|phase| phase.role == role).count()
    }
}

pub struct Orchestrator<'g> {
    gateway: &'g dyn Gateway,
    pacer: Pacer,
    prompts: PromptEngine,
    generation: GenerationSettings,
    config: OrchestratorConfig,
}

/// Mutable bookkeeping for one `run`.
struct RunLedger {
    budget: Budget,
    phases: Vec<PhaseReport>,
}

impl<'g> Orchestrator<'g> {
    pub fn new(gateway: &'g dyn Gateway, pacer: Pacer, config: OrchestratorConfig) -> Self {
        Self {
            gateway,
            pacer,
            prompts: PromptEngine::new(),
            generation: GenerationSettings::default(),
            config,
        }
    }

    pub fn with_generation(mut self, generation: GenerationSettings) -> Self {
        self.generation = generation;
        self
    }

    pub fn config(&self) -> OrchestratorConfig {
        self.config
    }

    pub fn pacer(&self) -> &Pacer {
        &self.pacer
    }

    /// Refine `document` into a scored record.
    #[instrument(skip_all, fields(document = %document.display(), max_calls = self.config.max_calls))]
    pub fn run(&mut self, document: &Path) -> Result<Orchestration> {
        let cfg = self.config;
        let mut ledger = RunLedger {
            budget: Budget::new(cfg.max_calls),
            phases: Vec::new(),
        };

        let extraction = self.run_phase(
            &Extractor,
            AgentState::new(PhaseRole::Extractor, Record::new(), document.to_path_buf()),
            extractor_cap(cfg.max_calls, cfg.extractor_max_iterations),
            0,
            &mut ledger,
        )?;
        let mut record = extraction.state.record;
        if record.is_empty() || ledger.budget.is_exhausted() {
            info!(empty = record.is_empty(), "finalizing after extraction");
            return Ok(self.finalize(record, ledger));
        }

        let cap = validator_cap(ledger.budget.remaining(), cfg.validator_max_iterations);
        if cap == 0 {
            return Ok(self.finalize(record, ledger));
        }
        let (validated, mut score, mut feedback) =
            self.validate(record, document, cap, 0, &mut ledger)?;
        record = validated;

        for round in 1..=cfg.max_refinement_rounds {
            if score >= cfg.score_threshold || ledger.budget.is_exhausted() {
                break;
            }
            let cap = refiner_cap(ledger.budget.remaining(), cfg.refiner_max_iterations);
            if cap == 0 {
                break;
            }
            info!(round, score, "starting refinement round");
            let refined = self.run_phase(
                &Refiner,
                AgentState::new(PhaseRole::Refiner, record, document.to_path_buf())
                    .with_feedback(Some(feedback)),
                cap,
                round,
                &mut ledger,
            )?;
            record = refined.state.record;

            let cap = validator_cap(ledger.budget.remaining(), cfg.validator_max_iterations);
            if cap == 0 {
                break;
            }
            let (validated, next_score, next_feedback) =
                self.validate(record, document, cap, round, &mut ledger)?;
            record = validated;
            score = next_score;
            feedback = next_feedback;
        }

        Ok(self.finalize(record, ledger))
    }

    /// Run the validator and derive the loop score and the refiner's feedback.
    fn validate(
        &mut self,
        record: Record,
        document: &Path,
        cap: u32,
        round: u32,
        ledger: &mut RunLedger,
    ) -> Result<(Record, u32, Value)> {
        let run = self.run_phase(
            &Validator,
            AgentState::new(PhaseRole::Validator, record, document.to_path_buf()),
            cap,
            round,
            ledger,
        )?;
        let mut state = run.state;
        let feedback = match state.artifacts.remove(&ToolId::Validate) {
            Some(report) => report,
            None => serde_json::to_value(scoring::score(&state.record))?,
        };
        let score = state
            .last_score
            .unwrap_or_else(|| scoring::score(&state.record).total_score);
        Ok((state.record, score, feedback))
    }

    fn run_phase(
        &mut self,
        policy: &dyn PhasePolicy,
        state: AgentState,
        max_iterations: u32,
        round: u32,
        ledger: &mut RunLedger,
    ) -> Result<AgentRun> {
        let limits = PhaseLimits {
            max_iterations,
            call_allowance: ledger.budget.remaining(),
        };
        let settings = ToolSettings {
            generation: self.generation,
            score_threshold: self.config.score_threshold,
        };
        let mut env = PhaseEnv {
            gateway: self.gateway,
            pacer: &mut self.pacer,
            prompts: &self.prompts,
            settings: &settings,
        };
        let run = run_phase(policy, state, limits, &mut env)?;
        ledger.budget.charge(run.oracle_calls);

        info!(
            role = %policy.role(),
            round,
            oracle_calls = run.oracle_calls,
            used = ledger.budget.used(),
            remaining = ledger.budget.remaining(),
            "phase charged"
        );
        ledger.phases.push(PhaseReport {
            role: policy.role(),
            round,
            limits,
            iterations: run.iterations,
            oracle_calls: run.oracle_calls,
            stop: run.stop,
            score: run.state.last_score,
            steps: run.steps.clone(),
        });
        Ok(run)
    }

    fn finalize(&self, record: Record, ledger: RunLedger) -> Orchestration {
        let score = if record.is_empty() {
            ScoreResult::empty()
        } else {
            scoring::score(&record)
        };
        let result = OrchestrationResult {
            threshold_met: score.meets(self.config.score_threshold),
            budget_exceeded: ledger.budget.is_exhausted(),
            total_calls: ledger.budget.used(),
            record,
            score,
        };
        info!(
            score = result.score.total_score,
            total_calls = result.total_calls,
            threshold_met = result.threshold_met,
            budget_exceeded = result.budget_exceeded,
            "orchestration finished"
        );
        Orchestration {
            result,
            phases: ledger.phases,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::test_support::{ScriptedGateway, decision, manual_pacer, perfect_record};

    fn extraction_reply(record: &Record) -> String {
        format!("```json\n{}\n```", record.to_value())
    }

    #[test]
    fn zero_budget_makes_no_calls() {
        let gateway = ScriptedGateway::new(Vec::<String>::new());
        let (pacer, _clock) = manual_pacer();
        let config = OrchestratorConfig {
            max_calls: 0,
            ..OrchestratorConfig::default()
        };
        let outcome = Orchestrator::new(&gateway, pacer, config)
            .run(Path::new("doc.pdf"))
            .expect("run");

        assert_eq!(outcome.result.total_calls, 0);
        assert!(outcome.result.budget_exceeded);
        assert_eq!(outcome.result.score, ScoreResult::empty());
        assert!(gateway.requests().is_empty());
    }

    /// Verifies the validator falls back to the scorer when it never validates.
    #[test]
    fn validator_without_validate_uses_recomputed_score() {
        let mut sparse = perfect_record();
        sparse.set_field("statutory_category", json!("Software"));
        let gateway = ScriptedGateway::new([
            decision("run_extraction", json!({})),
            extraction_reply(&sparse),
            // Validator gives up immediately; its score is recomputed (95).
            decision("complete", json!({})),
        ]);
        let (pacer, _clock) = manual_pacer();
        let outcome = Orchestrator::new(&gateway, pacer, OrchestratorConfig::default())
            .run(Path::new("doc.pdf"))
            .expect("run");

        assert_eq!(outcome.result.score.total_score, 95);
        assert!(outcome.result.threshold_met);
        assert_eq!(outcome.refinement_rounds(), 0);
        assert_eq!(outcome.result.total_calls, 3);
        assert!(!outcome.result.budget_exceeded);
    }

    #[test]
    fn rounds_stop_at_the_configured_limit() {
        let mut weak = Record::new();
        weak.set_field("invention_id", json!("INV-9"));
        let mut replies = vec![
            decision("run_extraction", json!({})),
            extraction_reply(&weak),
            decision("complete", json!({})),
            decision("validate", json!({})),
        ];
        for _ in 0..2 {
            replies.push(decision("complete", json!({})));
            replies.push(decision("validate", json!({})));
        }
        let gateway = ScriptedGateway::new(replies);
        let (pacer, _clock) = manual_pacer();
        let config = OrchestratorConfig {
            max_refinement_rounds: 2,
            ..OrchestratorConfig::default()
        };
        let outcome = Orchestrator::new(&gateway, pacer, config)
            .run(Path::new("doc.pdf"))
            .expect("run");

        assert_eq!(outcome.refinement_rounds(), 2);
        assert_eq!(outcome.runs_of(PhaseRole::Validator), 3);
        assert!(!outcome.result.threshold_met);
        assert_eq!(outcome.result.total_calls, 8);
        assert_eq!(outcome.result.record.text("invention_id"), "INV-9");
        assert_eq!(gateway.remaining(), 0);
    }
}
