//! Generation gateway abstraction.
//!
//! The [`Gateway`] trait decouples the pipeline from the text-generation backend.
//! Production runs use [`CommandGateway`], which pipes each prompt into an
//! external CLI; tests use scripted gateways that replay canned replies.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument, warn};

use crate::io::config::GatewayConfig;
use crate::io::process::{RunLimits, run_with_input};

/// One generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Files the backend should read alongside the prompt (the source document).
    pub attachments: Vec<PathBuf>,
    pub max_output: u32,
    pub temperature: f32,
}

/// Abstraction over generation backends.
pub trait Gateway {
    /// Generate a reply. Any error is treated as fatal by the caller.
    fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Gateway that spawns a configured command per call.
///
/// The prompt goes to stdin, each attachment is passed as
/// `<attachment_flag> <path>`, and the generation knobs are exported as
/// `REFINERY_MAX_OUTPUT` and `REFINERY_TEMPERATURE`. Stdout is the reply.
#[derive(Debug, Clone)]
pub struct CommandGateway {
    command: Vec<String>,
    attachment_flag: String,
    limits: RunLimits,
}

impl CommandGateway {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            command: config.command.clone(),
            attachment_flag: config.attachment_flag.clone(),
            limits: RunLimits {
                timeout: Duration::from_secs(config.timeout_secs),
                output_limit_bytes: config.output_limit_bytes,
            },
        }
    }

    fn build_command(&self, request: &GenerationRequest) -> Result<Command> {
        let Some((program, args)) = self.command.split_first() else {
            bail!("gateway command is empty");
        };
        let mut cmd = Command::new(program);
        cmd.args(args);
        for path in &request.attachments {
            cmd.arg(&self.attachment_flag).arg(path);
        }
        cmd.env("REFINERY_MAX_OUTPUT", request.max_output.to_string())
            .env("REFINERY_TEMPERATURE", request.temperature.to_string());
        Ok(cmd)
    }
}

impl Gateway for CommandGateway {
    #[instrument(skip_all, fields(program = self.command.first().map(String::as_str), attachments = request.attachments.len()))]
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        info!(prompt_bytes = request.prompt.len(), "invoking generation command");
        let cmd = self.build_command(request)?;
        let output = run_with_input(cmd, request.prompt.as_bytes(), self.limits)
            .context("run generation command")?;

        if output.timed_out {
            warn!("generation command timed out");
            bail!(
                "generation command timed out after {}s",
                self.limits.timeout.as_secs()
            );
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "generation command failed");
            bail!(
                "generation command failed with status {:?}: {}",
                output.status.code(),
                output.stderr_tail(500)
            );
        }

        let reply = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(reply_bytes = reply.len(), "generation command completed");
        Ok(reply)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;

    fn gateway(command: &[&str]) -> CommandGateway {
        CommandGateway::from_config(&GatewayConfig {
            command: command.iter().map(|s| s.to_string()).collect(),
            attachment_flag: "--attach".to_string(),
            timeout_secs: 10,
            output_limit_bytes: 10_000,
        })
    }

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.to_string(),
            attachments: Vec::new(),
            max_output: 1000,
            temperature: 0.5,
        }
    }

    #[test]
    fn returns_command_stdout() {
        let reply = gateway(&["cat"]).generate(&request("hello")).expect("generate");
        assert_eq!(reply, "hello");
    }

    /// Verifies attachments arrive as flag/path argument pairs.
    #[test]
    fn passes_attachments_as_arguments() {
        let temp = tempfile::tempdir().expect("tempdir");
        let doc = temp.path().join("doc.txt");
        fs::write(&doc, "document body").expect("write doc");

        let gateway = gateway(&["sh", "-c", "test \"$1\" = --attach && cat \"$2\"", "sh"]);
        let mut req = request("ignored");
        req.attachments.push(doc);
        let reply = gateway.generate(&req).expect("generate");
        assert_eq!(reply, "document body");
    }

    #[test]
    fn exports_generation_settings() {
        let gateway = gateway(&["sh", "-c", "echo $REFINERY_MAX_OUTPUT $REFINERY_TEMPERATURE"]);
        let reply = gateway.generate(&request("x")).expect("generate");
        assert_eq!(reply.trim(), "1000 0.5");
    }

    #[test]
    fn non_zero_exit_is_an_error() {
        let gateway = gateway(&["sh", "-c", "echo quota exceeded >&2; exit 1"]);
        let err = gateway.generate(&request("x")).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("failed with status"), "{message}");
        assert!(message.contains("quota exceeded"), "{message}");
    }

    #[test]
    fn missing_program_is_an_error() {
        let err = gateway(&["refinery-no-such-program"])
            .generate(&request("x"))
            .unwrap_err();
        assert!(format!("{err:#}").contains("spawn command"));
    }
}
