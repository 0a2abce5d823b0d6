//! Generic decide/execute loop shared by every phase agent.
//!
//! Each pass asks the oracle for one [`Decision`], executes the chosen tool (if
//! it is in the phase's subset) and folds the result into the phase-owned
//! [`AgentState`]. The loop ends on `complete`, on the iteration cap, when the
//! policy's early-exit predicate holds, or when the phase call allowance runs
//! out. Only gateway failures escape as errors.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::agents::oracle::{CallAllowanceExhausted, GatewayFailure, Oracle};
use crate::agents::tools::{self, ToolEnv, ToolOutput, ToolSettings, truncate_chars};
use crate::core::interpret::interpret_decision;
use crate::core::record::{REQUIRED_FIELDS, Record};
use crate::core::types::{Decision, PhaseRole, ToolId, ToolStatus};
use crate::io::gateway::{Gateway, GenerationRequest};
use crate::io::pacer::Pacer;
use crate::io::prompt::{ActionLine, DecisionPrompt, PromptEngine};

const STEP_PREVIEW_CHARS: usize = 2000;
const PROMPT_OBSERVATION_CHARS: usize = 1500;

/// Behaviour that distinguishes one phase from another.
pub trait PhasePolicy {
    fn role(&self) -> PhaseRole;

    /// Goal statement shown to the deciding oracle.
    fn objective(&self) -> &'static str;

    /// Tools the phase may use.
    fn tools(&self) -> &'static [ToolId];

    /// Fold a successful tool result into the state.
    fn fold(&self, tool: ToolId, output: &ToolOutput, state: &mut AgentState);

    /// Early-exit predicate checked before every decision.
    fn is_done(&self, _state: &AgentState) -> bool {
        false
    }

    /// Fill parameters the oracle is not expected to supply.
    fn fill_defaults(&self, tool: ToolId, params: &mut Map<String, Value>, state: &AgentState) {
        inject_defaults(tool, params, state);
    }
}

/// State owned by one phase run.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentState {
    pub role: PhaseRole,
    pub record: Record,
    pub iteration: u32,
    pub document: PathBuf,
    /// Latest successful result per tool.
    pub artifacts: BTreeMap<ToolId, Value>,
    pub last_score: Option<u32>,
    pub refined_fields: Vec<String>,
    /// Validator output the refiner is working against.
    pub feedback: Option<Value>,
    pub last_observation: Option<String>,
}

impl AgentState {
    pub fn new(role: PhaseRole, record: Record, document: PathBuf) -> Self {
        Self {
            role,
            record,
            iteration: 0,
            document,
            artifacts: BTreeMap::new(),
            last_score: None,
            refined_fields: Vec::new(),
            feedback: None,
            last_observation: None,
        }
    }

    pub fn with_feedback(mut self, feedback: Option<Value>) -> Self {
        self.feedback = feedback;
        self
    }
}

/// Per-phase limits computed by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseLimits {
    pub max_iterations: u32,
    pub call_allowance: u32,
}

/// Why a phase run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStop {
    /// The oracle chose `complete` (or its reply could not be understood).
    Completed,
    IterationCap,
    EarlyExit,
    AllowanceExhausted,
}

/// One decision and what came of it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub iteration: u32,
    pub thought: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub status: ToolStatus,
    pub observation: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentRun {
    pub state: AgentState,
    pub iterations: u32,
    pub oracle_calls: u32,
    pub stop: PhaseStop,
    pub steps: Vec<StepRecord>,
}

/// Shared collaborators a phase run borrows.
pub struct PhaseEnv<'a> {
    pub gateway: &'a dyn Gateway,
    pub pacer: &'a mut Pacer,
    pub prompts: &'a PromptEngine,
    pub settings: &'a ToolSettings,
}

/// Run one phase to completion.
#[instrument(skip_all, fields(role = %policy.role(), max_iterations = limits.max_iterations, allowance = limits.call_allowance))]
pub fn run_phase<P: PhasePolicy + ?Sized>(
    policy: &P,
    mut state: AgentState,
    limits: PhaseLimits,
    env: &mut PhaseEnv<'_>,
) -> Result<AgentRun> {
    let mut oracle = Oracle::new(env.gateway, &mut *env.pacer, limits.call_allowance);
    let mut steps = Vec::new();

    let stop = loop {
        if state.iteration >= limits.max_iterations {
            break PhaseStop::IterationCap;
        }
        if policy.is_done(&state) {
            break PhaseStop::EarlyExit;
        }
        if oracle.is_exhausted() {
            break PhaseStop::AllowanceExhausted;
        }
        state.iteration += 1;

        let prompt = env
            .prompts
            .render_decision(&decision_prompt(policy, &state, limits, oracle.remaining()))?;
        let request = GenerationRequest {
            prompt,
            attachments: Vec::new(),
            max_output: env.settings.generation.decision.max_output,
            temperature: env.settings.generation.decision.temperature,
        };
        let raw = oracle.generate("decision", &request)?;
        let decision = interpret_decision(&raw);
        debug!(iteration = state.iteration, action = %decision.action, "decision");

        if decision.is_complete() {
            steps.push(step(&state, &decision, ToolStatus::Success, "phase complete".to_string()));
            break PhaseStop::Completed;
        }

        let Some(tool) = ToolId::from_name(&decision.action) else {
            let message = format!("unknown action '{}'", decision.action);
            reject(&mut state, &mut steps, &decision, message);
            continue;
        };
        if !policy.tools().contains(&tool) {
            let message = format!(
                "action '{}' is not available to the {} phase",
                tool,
                policy.role()
            );
            reject(&mut state, &mut steps, &decision, message);
            continue;
        }

        let mut params = decision.parameters.clone();
        policy.fill_defaults(tool, &mut params, &state);
        let outcome = {
            let mut tool_env = ToolEnv {
                oracle: &mut oracle,
                prompts: env.prompts,
                settings: env.settings,
            };
            tools::execute(tool, &params, &mut tool_env)
        };

        match outcome {
            Ok(output) => {
                policy.fold(tool, &output, &mut state);
                state.artifacts.insert(tool, output.to_value());
                let preview = output.preview(STEP_PREVIEW_CHARS);
                state.last_observation = Some(truncate_chars(&preview, PROMPT_OBSERVATION_CHARS));
                steps.push(step(&state, &decision, ToolStatus::Success, preview));
            }
            Err(err) if err.is::<GatewayFailure>() => return Err(err),
            Err(err) => {
                if err.is::<CallAllowanceExhausted>() {
                    debug!(%tool, "tool skipped, allowance exhausted");
                } else {
                    warn!(%tool, err = %format!("{err:#}"), "tool failed");
                }
                let message = format!("error: {err:#}");
                state.last_observation = Some(truncate_chars(&message, PROMPT_OBSERVATION_CHARS));
                steps.push(step(&state, &decision, ToolStatus::Error, message));
            }
        }
    };

    info!(
        iterations = state.iteration,
        oracle_calls = oracle.calls(),
        ?stop,
        "phase finished"
    );
    Ok(AgentRun {
        iterations: state.iteration,
        oracle_calls: oracle.calls(),
        stop,
        steps,
        state,
    })
}

/// Default parameter injection: source document for document tools, the working
/// record for record tools, and validator feedback for extraction.
///
/// The document and the record always come from the state, whatever the oracle
/// supplied.
pub fn inject_defaults(tool: ToolId, params: &mut Map<String, Value>, state: &AgentState) {
    match tool {
        ToolId::AnalyzeDocument | ToolId::ReadSection => {
            insert_document(params, state);
        }
        ToolId::RunExtraction => {
            insert_document(params, state);
            if !state.record.is_empty() && !params.contains_key("record") {
                params.insert("record".to_string(), state.record.to_value());
            }
            if let Some(feedback) = &state.feedback
                && !params.contains_key("feedback")
            {
                params.insert("feedback".to_string(), feedback.clone());
            }
        }
        ToolId::Validate | ToolId::CheckFields | ToolId::CountFields | ToolId::EnhanceField => {
            // The working record is authoritative for record tools.
            params.insert("record".to_string(), state.record.to_value());
        }
    }
}

fn insert_document(params: &mut Map<String, Value>, state: &AgentState) {
    params.insert(
        "document".to_string(),
        Value::String(state.document.display().to_string()),
    );
}

fn decision_prompt<'s, P: PhasePolicy + ?Sized>(
    policy: &P,
    state: &'s AgentState,
    limits: PhaseLimits,
    calls_remaining: u32,
) -> DecisionPrompt<'s> {
    DecisionPrompt {
        role: state.role.as_str(),
        objective: policy.objective(),
        iteration: state.iteration,
        max_iterations: limits.max_iterations,
        calls_remaining,
        populated: state.record.populated_fields(),
        required: REQUIRED_FIELDS.len(),
        last_score: state.last_score,
        record_json: serde_json::to_string_pretty(&state.record)
            .unwrap_or_else(|_| state.record.to_value().to_string()),
        feedback: state.feedback.as_ref().map(|value| {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }),
        last_observation: state.last_observation.as_deref(),
        tools: policy
            .tools()
            .iter()
            .map(|tool| ActionLine {
                name: tool.name(),
                description: tool.description(),
            })
            .collect(),
    }
}

fn reject(state: &mut AgentState, steps: &mut Vec<StepRecord>, decision: &Decision, message: String) {
    debug!(%message, "action rejected");
    state.last_observation = Some(message.clone());
    steps.push(step(state, decision, ToolStatus::Error, message));
}

fn step(state: &AgentState, decision: &Decision, status: ToolStatus, observation: String) -> StepRecord {
    StepRecord {
        iteration: state.iteration,
        thought: decision.thought.clone(),
        action: decision.action.clone(),
        reason: decision.reason.clone(),
        status,
        observation,
    }
}

/// Merge a structured extraction result into the working record.
pub(crate) fn merge_extraction(output: &ToolOutput, state: &mut AgentState) {
    if let Some(record) = output.as_structured().cloned().and_then(Record::from_value) {
        state.record.merge(record);
    }
}

/// Apply an `enhance_field` result to the working record.
pub(crate) fn apply_enhancement(output: &ToolOutput, state: &mut AgentState) {
    let Some(value) = output.as_structured() else {
        return;
    };
    let (Some(field), Some(new_value)) = (value["field_name"].as_str(), value.get("value")) else {
        return;
    };
    if state.record.set_field(field, new_value.clone()) {
        state.refined_fields.push(field.to_string());
    }
}

/// Remember the score a `validate` call reported.
pub(crate) fn record_validation(output: &ToolOutput, state: &mut AgentState) {
    if let Some(score) = output
        .as_structured()
        .and_then(|value| value["score"].as_u64())
    {
        state.last_score = Some(u32::try_from(score).unwrap_or(u32::MAX));
    }
}
