//! The fixed tool set available to phase agents.
//!
//! Tools take a JSON parameter object and return a [`ToolOutput`]. Errors are
//! plain `anyhow` errors; the agent loop turns them into error observations
//! unless they carry a [`GatewayFailure`](crate::agents::oracle::GatewayFailure).

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use crate::agents::oracle::Oracle;
use crate::core::interpret::{interpret, is_sentinel};
use crate::core::record::{LIST_FIELDS, REQUIRED_FIELDS, Record, STATUTORY_CATEGORIES};
use crate::core::scoring;
use crate::core::types::ToolId;
use crate::io::gateway::GenerationRequest;
use crate::io::prompt::{EnhancePrompt, ExtractionPrompt, PromptEngine};

static LIST_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s*").expect("list marker regex should compile")
});

const SURVEY_MAX_WORDS: u32 = 400;

/// Sampling knobs for one kind of oracle call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingSettings {
    pub temperature: f32,
    pub max_output: u32,
}

/// Sampling knobs per call kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub decision: SamplingSettings,
    pub extraction: SamplingSettings,
    pub reading: SamplingSettings,
    pub enhancement: SamplingSettings,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            decision: SamplingSettings {
                temperature: 0.5,
                max_output: 1000,
            },
            extraction: SamplingSettings {
                temperature: 0.3,
                max_output: 4000,
            },
            reading: SamplingSettings {
                temperature: 0.3,
                max_output: 2000,
            },
            enhancement: SamplingSettings {
                temperature: 0.3,
                max_output: 1000,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolSettings {
    pub generation: GenerationSettings,
    /// Score at which `validate` reports the record as valid.
    pub score_threshold: u32,
}

/// Result of a successful tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Structured(Value),
    Text(String),
}

impl ToolOutput {
    pub fn to_value(&self) -> Value {
        match self {
            ToolOutput::Structured(value) => value.clone(),
            ToolOutput::Text(text) => Value::String(text.clone()),
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            ToolOutput::Structured(value) => Some(value),
            ToolOutput::Text(_) => None,
        }
    }

    /// Compact rendering truncated to `max_chars`.
    pub fn preview(&self, max_chars: usize) -> String {
        let text = match self {
            ToolOutput::Structured(value) => value.to_string(),
            ToolOutput::Text(text) => text.clone(),
        };
        truncate_chars(&text, max_chars)
    }
}

/// What a tool may use while it runs.
pub struct ToolEnv<'e, 'o> {
    pub oracle: &'e mut Oracle<'o>,
    pub prompts: &'e PromptEngine,
    pub settings: &'e ToolSettings,
}

/// Run `tool` with `params`.
#[instrument(skip_all, fields(tool = tool.name()))]
pub fn execute(
    tool: ToolId,
    params: &Map<String, Value>,
    env: &mut ToolEnv<'_, '_>,
) -> Result<ToolOutput> {
    match tool {
        ToolId::AnalyzeDocument => analyze_document(params, env),
        ToolId::ReadSection => read_section(params, env),
        ToolId::RunExtraction => run_extraction(params, env),
        ToolId::Validate => validate(params, env.settings),
        ToolId::CheckFields => check_fields(params),
        ToolId::CountFields => count_fields(params),
        ToolId::EnhanceField => enhance_field(params, env),
    }
}

fn analyze_document(params: &Map<String, Value>, env: &mut ToolEnv<'_, '_>) -> Result<ToolOutput> {
    let document = document_param(params)?;
    let prompt = env
        .prompts
        .render_analyze_document(&document_name(&document), SURVEY_MAX_WORDS)?;
    let reply = env.oracle.generate(
        ToolId::AnalyzeDocument.name(),
        &request(prompt, Some(document), env.settings.generation.reading),
    )?;
    Ok(ToolOutput::Text(reply.trim().to_string()))
}

fn read_section(params: &Map<String, Value>, env: &mut ToolEnv<'_, '_>) -> Result<ToolOutput> {
    let document = document_param(params)?;
    let section = str_param(params, "section_name")?;
    let prompt = env
        .prompts
        .render_read_section(&document_name(&document), section)?;
    let reply = env.oracle.generate(
        ToolId::ReadSection.name(),
        &request(prompt, Some(document), env.settings.generation.reading),
    )?;
    Ok(ToolOutput::Text(reply.trim().to_string()))
}

fn run_extraction(params: &Map<String, Value>, env: &mut ToolEnv<'_, '_>) -> Result<ToolOutput> {
    let document = document_param(params)?;
    let current_record = params
        .get("record")
        .filter(|v| v.as_object().is_some_and(|m| !m.is_empty()))
        .map(pretty);
    let feedback = params.get("feedback").filter(|v| !v.is_null()).map(pretty);

    let name = document_name(&document);
    let prompt = env.prompts.render_extraction(&ExtractionPrompt {
        document_name: &name,
        categories: &STATUTORY_CATEGORIES,
        current_record,
        feedback,
    })?;
    let reply = env.oracle.generate(
        ToolId::RunExtraction.name(),
        &request(prompt, Some(document), env.settings.generation.extraction),
    )?;

    let value = interpret(&reply);
    if is_sentinel(&value) {
        bail!("extraction reply held no JSON object");
    }
    let object = match value {
        Value::Object(_) => value,
        Value::Array(items) => items
            .into_iter()
            .find(Value::is_object)
            .ok_or_else(|| anyhow!("extraction reply array held no object"))?,
        _ => bail!("extraction reply was not an object"),
    };
    debug!(
        keys = object.as_object().map_or(0, Map::len),
        "extraction parsed"
    );
    Ok(ToolOutput::Structured(object))
}

fn validate(params: &Map<String, Value>, settings: &ToolSettings) -> Result<ToolOutput> {
    let record = record_param(params)?;
    let result = scoring::score(&record);
    Ok(ToolOutput::Structured(json!({
        "score": result.total_score,
        "rating": result.rating.as_str(),
        "valid": result.meets(settings.score_threshold),
        "issues": result.issues,
        "recommendations": result.recommendations,
        "breakdown": serde_json::to_value(&result.breakdown).context("serialize breakdown")?,
    })))
}

fn check_fields(params: &Map<String, Value>) -> Result<ToolOutput> {
    let record = record_param(params)?;
    let missing = record.missing_fields();
    Ok(ToolOutput::Structured(json!({
        "complete": missing.is_empty(),
        "missing_fields": missing,
        "field_count": record.len(),
    })))
}

fn count_fields(params: &Map<String, Value>) -> Result<ToolOutput> {
    let record = record_param(params)?;
    let lengths: Vec<usize> = ["technical_description", "problem_statement", "solution_approach"]
        .iter()
        .map(|field| record.text(field).chars().count())
        .collect();
    Ok(ToolOutput::Structured(json!({
        "feature_count": record.list_len("key_technical_features"),
        "keyword_count": record.list_len("inventor_keywords"),
        "description_length": lengths[0],
        "problem_length": lengths[1],
        "solution_length": lengths[2],
        "total_content_length": lengths.iter().sum::<usize>(),
    })))
}

fn enhance_field(params: &Map<String, Value>, env: &mut ToolEnv<'_, '_>) -> Result<ToolOutput> {
    let field = str_param(params, "field_name")?;
    if !REQUIRED_FIELDS.contains(&field) {
        bail!("cannot enhance unknown field '{field}'");
    }
    let record = record_param(params)?;
    let current = params
        .get("current_value")
        .or_else(|| record.get(field))
        .map(|value| match value {
            Value::String(text) => text.clone(),
            other => pretty(other),
        })
        .unwrap_or_default();

    let prompt = env.prompts.render_enhance_field(&EnhancePrompt {
        field_name: field,
        current_value: current,
        record_json: pretty(&record.to_value()),
        shape: reply_shape(field),
    })?;
    let reply = env.oracle.generate(
        ToolId::EnhanceField.name(),
        &request(prompt, None, env.settings.generation.enhancement),
    )?;

    let value = coerce_field(field, &reply)?;
    Ok(ToolOutput::Structured(json!({
        "field_name": field,
        "value": value,
    })))
}

fn reply_shape(field: &str) -> &'static str {
    if LIST_FIELDS.contains(&field) {
        "Reply with a JSON array of strings, at least 5 entries."
    } else if field == "context" {
        "Reply with a JSON object holding `document_section` (string) and `confidence_score` (0.0 to 1.0)."
    } else if field == "statutory_category" {
        "Reply with exactly one of: Process, Machine, Manufacture, Composition of Matter."
    } else {
        "Reply with plain text."
    }
}

/// Turn an enhancement reply into a value of the field's shape.
fn coerce_field(field: &str, reply: &str) -> Result<Value> {
    let parsed = interpret(reply);
    // Accept `{"<field>": value}` wrappers around any shape.
    let parsed = match parsed {
        Value::Object(mut map) if map.contains_key(field) => map.remove(field).unwrap_or_default(),
        other => other,
    };

    if LIST_FIELDS.contains(&field) {
        let items: Vec<Value> = match &parsed {
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect(),
            _ if is_sentinel(&parsed) => reply
                .lines()
                .map(|line| LIST_MARKER_RE.replace(line, "").trim().to_string())
                .filter(|s| !s.is_empty())
                .map(Value::String)
                .collect(),
            _ => Vec::new(),
        };
        if items.is_empty() {
            bail!("enhancement for '{field}' produced no list entries");
        }
        return Ok(Value::Array(items));
    }

    if field == "context" {
        if is_sentinel(&parsed) || !parsed.as_object().is_some_and(|map| !map.is_empty()) {
            bail!("enhancement for 'context' was not an object");
        }
        return Ok(parsed);
    }

    let text = match &parsed {
        Value::String(text) => text.trim().to_string(),
        _ => reply.trim().trim_matches('"').trim().to_string(),
    };
    if text.is_empty() {
        bail!("enhancement for '{field}' was empty");
    }
    Ok(Value::String(text))
}

fn request(prompt: String, document: Option<PathBuf>, sampling: SamplingSettings) -> GenerationRequest {
    GenerationRequest {
        prompt,
        attachments: document.into_iter().collect(),
        max_output: sampling.max_output,
        temperature: sampling.temperature,
    }
}

fn str_param<'p>(params: &'p Map<String, Value>, key: &str) -> Result<&'p str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("missing parameter '{key}'"))
}

fn document_param(params: &Map<String, Value>) -> Result<PathBuf> {
    str_param(params, "document").map(PathBuf::from)
}

fn record_param(params: &Map<String, Value>) -> Result<Record> {
    let value = params
        .get("record")
        .cloned()
        .ok_or_else(|| anyhow!("missing parameter 'record'"))?;
    Record::from_value(value).ok_or_else(|| anyhow!("parameter 'record' must be an object"))
}

fn document_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn pretty(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}
