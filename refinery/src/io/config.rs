//! Refinery configuration stored in `refinery.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::agents::tools::{GenerationSettings, SamplingSettings};
use crate::io::pacer::PacerConfig;
use crate::orchestrate::OrchestratorConfig;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "refinery.toml";

/// Refinery configuration (TOML).
///
/// Missing sections and fields fall back to the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RefineryConfig {
    pub budget: BudgetConfig,
    pub pacing: PacingConfig,
    pub gateway: GatewayConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BudgetConfig {
    /// Oracle calls allowed for one document.
    pub max_calls: u32,
    /// Score at which refinement stops.
    pub score_threshold: u32,
    pub max_refinement_rounds: u32,
    pub extractor_max_iterations: u32,
    pub validator_max_iterations: u32,
    pub refiner_max_iterations: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        let defaults = OrchestratorConfig::default();
        Self {
            max_calls: defaults.max_calls,
            score_threshold: defaults.score_threshold,
            max_refinement_rounds: defaults.max_refinement_rounds,
            extractor_max_iterations: defaults.extractor_max_iterations,
            validator_max_iterations: defaults.validator_max_iterations,
            refiner_max_iterations: defaults.refiner_max_iterations,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PacingConfig {
    /// Minimum spacing between two oracle calls.
    pub min_interval_secs: f64,
    pub max_calls_per_window: usize,
    pub window_secs: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: 6.0,
            max_calls_per_window: 10,
            window_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Command that reads a prompt on stdin and prints the reply (e.g. `["llm"]`).
    pub command: Vec<String>,
    /// Flag placed before each attachment path.
    pub attachment_flag: String,
    pub timeout_secs: u64,
    /// Truncate command stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            command: vec!["llm".to_string()],
            attachment_flag: "-a".to_string(),
            timeout_secs: 5 * 60,
            output_limit_bytes: 200_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub decision: SamplingConfig,
    pub extraction: SamplingConfig,
    pub reading: SamplingConfig,
    pub enhancement: SamplingConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let defaults = GenerationSettings::default();
        Self {
            decision: defaults.decision.into(),
            extraction: defaults.extraction.into(),
            reading: defaults.reading.into(),
            enhancement: defaults.enhancement.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub max_output: u32,
}

impl From<SamplingSettings> for SamplingConfig {
    fn from(settings: SamplingSettings) -> Self {
        Self {
            temperature: settings.temperature,
            max_output: settings.max_output,
        }
    }
}

impl From<SamplingConfig> for SamplingSettings {
    fn from(config: SamplingConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_output: config.max_output,
        }
    }
}

impl RefineryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.budget.score_threshold > 100 {
            return Err(anyhow!("budget.score_threshold must be <= 100"));
        }
        if !self.pacing.min_interval_secs.is_finite() || self.pacing.min_interval_secs < 0.0 {
            return Err(anyhow!("pacing.min_interval_secs must be a non-negative number"));
        }
        if self.pacing.max_calls_per_window == 0 {
            return Err(anyhow!("pacing.max_calls_per_window must be > 0"));
        }
        if self.pacing.window_secs == 0 {
            return Err(anyhow!("pacing.window_secs must be > 0"));
        }
        if self.gateway.command.is_empty() || self.gateway.command[0].trim().is_empty() {
            return Err(anyhow!("gateway.command must be a non-empty array"));
        }
        if self.gateway.timeout_secs == 0 {
            return Err(anyhow!("gateway.timeout_secs must be > 0"));
        }
        if self.gateway.output_limit_bytes == 0 {
            return Err(anyhow!("gateway.output_limit_bytes must be > 0"));
        }
        for (name, sampling) in [
            ("decision", &self.generation.decision),
            ("extraction", &self.generation.extraction),
            ("reading", &self.generation.reading),
            ("enhancement", &self.generation.enhancement),
        ] {
            if !(0.0..=1.0).contains(&sampling.temperature) {
                return Err(anyhow!("generation.{name}.temperature must be within 0..=1"));
            }
            if sampling.max_output == 0 {
                return Err(anyhow!("generation.{name}.max_output must be > 0"));
            }
        }
        Ok(())
    }

    pub fn pacer_config(&self) -> PacerConfig {
        PacerConfig {
            min_interval: Duration::from_secs_f64(self.pacing.min_interval_secs),
            max_calls_per_window: self.pacing.max_calls_per_window,
            window: Duration::from_secs(self.pacing.window_secs),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_calls: self.budget.max_calls,
            score_threshold: self.budget.score_threshold,
            max_refinement_rounds: self.budget.max_refinement_rounds,
            extractor_max_iterations: self.budget.extractor_max_iterations,
            validator_max_iterations: self.budget.validator_max_iterations,
            refiner_max_iterations: self.budget.refiner_max_iterations,
        }
    }

    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            decision: self.generation.decision.into(),
            extraction: self.generation.extraction.into(),
            reading: self.generation.reading.into(),
            enhancement: self.generation.enhancement.into(),
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RefineryConfig::default()`.
pub fn load_config(path: &Path) -> Result<RefineryConfig> {
    if !path.exists() {
        let cfg = RefineryConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RefineryConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RefineryConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');

    let tmp_path = path.with_extension("toml.tmp");
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(&tmp_path, buf).with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
