//! Metered access to the generation gateway.
//!
//! Every oracle call in a phase goes through an [`Oracle`]: it refuses calls past
//! the phase allowance, waits for pacer admission, and tags gateway errors as
//! [`GatewayFailure`] so the loop can tell them apart from tool errors.

use anyhow::Result;
use thiserror::Error;
use tracing::debug;

use crate::io::gateway::{Gateway, GenerationRequest};
use crate::io::pacer::Pacer;

/// The gateway failed. Ends the orchestration.
#[derive(Debug, Error)]
#[error("generation gateway failed during {purpose}: {message}")]
pub struct GatewayFailure {
    pub purpose: String,
    pub message: String,
}

/// The phase has no oracle calls left.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("oracle call allowance of {allowance} exhausted")]
pub struct CallAllowanceExhausted {
    pub allowance: u32,
}

pub struct Oracle<'a> {
    gateway: &'a dyn Gateway,
    pacer: &'a mut Pacer,
    allowance: u32,
    calls: u32,
}

impl<'a> Oracle<'a> {
    pub fn new(gateway: &'a dyn Gateway, pacer: &'a mut Pacer, allowance: u32) -> Self {
        Self {
            gateway,
            pacer,
            allowance,
            calls: 0,
        }
    }

    /// Calls made so far, including failed ones.
    pub fn calls(&self) -> u32 {
        self.calls
    }

    pub fn remaining(&self) -> u32 {
        self.allowance.saturating_sub(self.calls)
    }

    pub fn is_exhausted(&self) -> bool {
        self.calls >= self.allowance
    }

    /// Admit through the pacer, then call the gateway.
    pub fn generate(&mut self, purpose: &str, request: &GenerationRequest) -> Result<String> {
        if self.is_exhausted() {
            return Err(CallAllowanceExhausted {
                allowance: self.allowance,
            }
            .into());
        }

        let waited = self.pacer.admit();
        self.calls += 1;
        debug!(
            purpose,
            call = self.calls,
            allowance = self.allowance,
            waited_ms = waited.as_millis() as u64,
            "oracle call"
        );

        self.gateway.generate(request).map_err(|err| {
            GatewayFailure {
                purpose: purpose.to_string(),
                message: format!("{err:#}"),
            }
            .into()
        })
    }
}
