//! Run artifacts written under the output directory.
//!
//! Layout:
//!
//! ```text
//! <out>/result.json                      final record, score and budget flags
//! <out>/phases/01-extractor-r0.json      one file per phase run, in order
//! <out>/phases/02-validator-r0.json
//! ...
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::orchestrate::{Orchestration, PhaseReport};

#[derive(Debug, Clone)]
pub struct RunPaths {
    pub dir: PathBuf,
    pub result_path: PathBuf,
    pub phases_dir: PathBuf,
}

impl RunPaths {
    pub fn new(out_dir: &Path) -> Self {
        Self {
            dir: out_dir.to_path_buf(),
            result_path: out_dir.join("result.json"),
            phases_dir: out_dir.join("phases"),
        }
    }

    pub fn phase_path(&self, index: usize, phase: &PhaseReport) -> PathBuf {
        self.phases_dir
            .join(format!("{:02}-{}-r{}.json", index + 1, phase.role, phase.round))
    }
}

/// Write the result and every phase report. Returns the paths used.
pub fn write_run(out_dir: &Path, orchestration: &Orchestration) -> Result<RunPaths> {
    let paths = RunPaths::new(out_dir);
    fs::create_dir_all(&paths.phases_dir)
        .with_context(|| format!("create run dir {}", paths.phases_dir.display()))?;

    for (index, phase) in orchestration.phases.iter().enumerate() {
        write_json(&paths.phase_path(index, phase), phase)?;
    }
    write_json(&paths.result_path, &orchestration.result)?;
    Ok(paths)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value).context("serialize json")?;
    buf.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))
}
