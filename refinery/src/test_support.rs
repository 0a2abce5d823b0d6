//! Test-only helpers: scripted gateway, manual clock and record fixtures.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::core::record::Record;
use crate::io::gateway::{Gateway, GenerationRequest};
use crate::io::pacer::{Clock, Pacer, PacerConfig};

/// Gateway that replays replies in order and records every request.
///
/// Running out of replies is a gateway error.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    replies: RefCell<VecDeque<String>>,
    requests: RefCell<Vec<GenerationRequest>>,
}

impl ScriptedGateway {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: RefCell::new(replies.into_iter().map(Into::into).collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.borrow().clone()
    }

    /// Replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.replies.borrow().len()
    }
}

impl Gateway for ScriptedGateway {
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        self.replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted gateway has no reply left"))
    }
}

/// Clock that only moves when slept on or advanced. Clones share one timeline.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn elapsed(&self) -> Duration {
        self.now.get()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Default-configured pacer on a manual clock.
pub fn manual_pacer() -> (Pacer, ManualClock) {
    let clock = ManualClock::new();
    let pacer = Pacer::with_clock(PacerConfig::default(), Box::new(clock.clone()));
    (pacer, clock)
}

/// Decision reply choosing `action`.
pub fn decision(action: &str, parameters: Value) -> String {
    json!({
        "thought": format!("next: {action}"),
        "action": action,
        "parameters": parameters,
        "reason": "scripted",
    })
    .to_string()
}

/// A record that earns every available point.
pub fn perfect_record() -> Record {
    let value = json!({
        "invention_id": "INV-2024-017",
        "invention_name": "Adaptive Request Pacing Gateway",
        "technical_description": "A request pacing gateway that enforces a minimum spacing between outbound calls and a sliding-window cap on call volume, admitting each call only when both constraints allow it.",
        "problem_statement": "Clients of metered language services exceed provider quotas. The challenge is that bursts trigger throttling and wasted spend.",
        "solution_approach": "The solution tracks recent call timestamps in a bounded queue. Each call waits for the larger of the spacing and window delays, which is the core approach.",
        "key_technical_features": [
            "sliding window rate limiting",
            "minimum inter-call interval",
            "bounded timestamp history",
            "deterministic admission algorithm",
            "per-run budget accounting"
        ],
        "statutory_category": "Process",
        "domain_classification": "Distributed Systems",
        "inventor_keywords": ["rate limiting", "pacing", "protocol", "quota", "scheduling"],
        "context": {
            "document_section": "Detailed Description",
            "confidence_score": 0.92
        }
    });
    Record::from_value(value).unwrap_or_default()
}

/// Temporary directory holding a source document and an output directory.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir().context("create temp workspace")?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a small disclosure document and return its path.
    pub fn document(&self) -> Result<PathBuf> {
        let path = self.dir.path().join("disclosure.txt");
        fs::write(
            &path,
            "Abstract\nA pacing gateway for metered generation services.\n\n\
             Detailed Description\nCalls are admitted under a spacing and a window constraint.\n",
        )
        .with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    pub fn out_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }
}
