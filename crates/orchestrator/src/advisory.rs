//! Advisory classifier seam.
//!
//! An advisor gives a second opinion on whether an action looks plausible.
//! Its answer is untrusted input: it can add a note to a team's feedback but
//! never changes which actions are approved.

use airline_core::{Action, Ledger, Money};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Plausible,
    Implausible,
    Uncertain,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Advice {
    pub verdict: Verdict,
    pub confidence: f64,
}

impl Advice {
    pub fn uncertain() -> Self {
        Self {
            verdict: Verdict::Uncertain,
            confidence: 0.0,
        }
    }

    /// Clamp confidence into [0, 1]; a non-numeric confidence makes the
    /// whole answer uncertain.
    pub fn sanitized(self) -> Self {
        if !self.confidence.is_finite() {
            return Self::uncertain();
        }
        Self {
            verdict: self.verdict,
            confidence: self.confidence.clamp(0.0, 1.0),
        }
    }
}

/// What the advisor gets to see besides the action itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdvisoryContext {
    pub team_id: String,
    pub round_id: String,
    pub cash: Money,
    pub fleet_size: u32,
    pub route_count: usize,
    pub reputation: f64,
}

impl AdvisoryContext {
    pub fn for_ledger(ledger: &Ledger, round_id: &str) -> Self {
        Self {
            team_id: ledger.team_id.clone(),
            round_id: round_id.to_string(),
            cash: ledger.cash,
            fleet_size: ledger.fleet_size,
            route_count: ledger.routes.len(),
            reputation: ledger.reputation,
        }
    }
}

#[derive(Debug, Error)]
pub enum AdvisoryError {
    #[error("Advisory call timed out after {0}ms")]
    Timeout(u64),

    #[error("Advisory HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Advisory service returned {status}: {message}")]
    Service { status: u16, message: String },
}

#[async_trait]
pub trait AdvisoryClassifier: Send + Sync {
    async fn classify(&self, action: &Action, context: &AdvisoryContext) -> Result<Advice, AdvisoryError>;
}

/// Advisor that never has an opinion.
#[derive(Debug, Clone, Default)]
pub struct NoAdvisor;

#[async_trait]
impl AdvisoryClassifier for NoAdvisor {
    async fn classify(&self, _action: &Action, _context: &AdvisoryContext) -> Result<Advice, AdvisoryError> {
        Ok(Advice::uncertain())
    }
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    action: &'a Action,
    context: &'a AdvisoryContext,
}

/// Advisor behind an HTTP endpoint: `POST {base_url}/classify` with the
/// action and context, answering `{"verdict": ..., "confidence": ...}`.
#[derive(Clone)]
pub struct HttpAdvisor {
    client: Client,
    base_url: String,
}

impl HttpAdvisor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AdvisoryClassifier for HttpAdvisor {
    async fn classify(&self, action: &Action, context: &AdvisoryContext) -> Result<Advice, AdvisoryError> {
        let response = self
            .client
            .post(format!("{}/classify", self.base_url))
            .json(&ClassifyRequest { action, context })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AdvisoryError::Service {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

/// Outcome of asking the advisor about one action.
#[derive(Debug, Clone, PartialEq)]
pub struct Consultation {
    pub advice: Advice,
    /// The advisor did not answer in time or failed; `advice` is uncertain.
    pub unavailable: bool,
}

/// Ask the advisor with a hard time bound. Timeouts and errors fall back to
/// an uncertain verdict.
pub async fn consult(
    advisor: &dyn AdvisoryClassifier,
    action: &Action,
    context: &AdvisoryContext,
    timeout: Duration,
) -> Consultation {
    let result = match tokio::time::timeout(timeout, advisor.classify(action, context)).await {
        Ok(result) => result,
        Err(_) => Err(AdvisoryError::Timeout(timeout.as_millis() as u64)),
    };

    match result {
        Ok(advice) => {
            debug!(team_id = %context.team_id, verdict = ?advice.verdict, "Advisor answered");
            Consultation {
                advice: advice.sanitized(),
                unavailable: false,
            }
        }
        Err(e) => {
            warn!(team_id = %context.team_id, error = %e, "Advisor unavailable, treating as uncertain");
            Consultation {
                advice: Advice::uncertain(),
                unavailable: true,
            }
        }
    }
}
