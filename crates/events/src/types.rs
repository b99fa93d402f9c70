use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    /// Position in the bus's publication order, starting at 1. Zero for
    /// envelopes built outside a bus.
    #[serde(default)]
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
}

impl EventEnvelope {
    pub fn new(event: Event) -> Self {
        Self::sequenced(event, 0)
    }

    pub fn sequenced(event: Event, sequence: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence,
            timestamp: Utc::now(),
            event,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    #[serde(rename = "team.registered")]
    TeamRegistered { team_id: String, name: String },

    #[serde(rename = "round.opened")]
    RoundOpened {
        round_id: String,
        deadline: DateTime<Utc>,
        participants: Vec<String>,
    },

    #[serde(rename = "round.status_changed")]
    RoundStatusChanged {
        round_id: String,
        from_status: String,
        to_status: String,
    },

    #[serde(rename = "plan.submitted")]
    PlanSubmitted {
        round_id: String,
        team_id: String,
        action_count: usize,
    },

    /// A team missed the deadline and was given the default plan.
    #[serde(rename = "plan.defaulted")]
    DefaultPlanAssigned {
        round_id: String,
        team_id: String,
        policy: String,
    },

    /// A team's pipeline reached the barrier.
    #[serde(rename = "pipeline.completed")]
    TeamPipelineCompleted {
        round_id: String,
        team_id: String,
        approved: usize,
        rejected: usize,
        substituted: bool,
    },

    #[serde(rename = "execution.inconsistent")]
    InconsistentExecution {
        round_id: String,
        team_id: String,
        action_index: usize,
        detail: String,
    },

    #[serde(rename = "market.updated")]
    MarketUpdated {
        round_id: String,
        version: u64,
        events: Vec<String>,
    },

    #[serde(rename = "evaluation.recorded")]
    EvaluationRecorded {
        round_id: String,
        team_id: String,
        score: f64,
    },

    #[serde(rename = "round.aborted")]
    RoundAborted { round_id: String, reason: String },

    #[serde(rename = "simulation.reset")]
    SimulationReset { teams: usize },

    #[serde(rename = "error")]
    Error {
        message: String,
        context: Option<String>,
    },
}

impl Event {
    /// Round this event belongs to, if any
    pub fn round_id(&self) -> Option<&str> {
        match self {
            Event::RoundOpened { round_id, .. }
            | Event::RoundStatusChanged { round_id, .. }
            | Event::PlanSubmitted { round_id, .. }
            | Event::DefaultPlanAssigned { round_id, .. }
            | Event::TeamPipelineCompleted { round_id, .. }
            | Event::InconsistentExecution { round_id, .. }
            | Event::MarketUpdated { round_id, .. }
            | Event::EvaluationRecorded { round_id, .. }
            | Event::RoundAborted { round_id, .. } => Some(round_id),
            Event::TeamRegistered { .. } | Event::SimulationReset { .. } | Event::Error { .. } => {
                None
            }
        }
    }

    pub fn team_id(&self) -> Option<&str> {
        match self {
            Event::TeamRegistered { team_id, .. }
            | Event::PlanSubmitted { team_id, .. }
            | Event::DefaultPlanAssigned { team_id, .. }
            | Event::TeamPipelineCompleted { team_id, .. }
            | Event::InconsistentExecution { team_id, .. }
            | Event::EvaluationRecorded { team_id, .. } => Some(team_id),
            _ => None,
        }
    }

    /// Wire name, matching the serialized `type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::TeamRegistered { .. } => "team.registered",
            Event::RoundOpened { .. } => "round.opened",
            Event::RoundStatusChanged { .. } => "round.status_changed",
            Event::PlanSubmitted { .. } => "plan.submitted",
            Event::DefaultPlanAssigned { .. } => "plan.defaulted",
            Event::TeamPipelineCompleted { .. } => "pipeline.completed",
            Event::InconsistentExecution { .. } => "execution.inconsistent",
            Event::MarketUpdated { .. } => "market.updated",
            Event::EvaluationRecorded { .. } => "evaluation.recorded",
            Event::RoundAborted { .. } => "round.aborted",
            Event::SimulationReset { .. } => "simulation.reset",
            Event::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_envelope_creation() {
        let envelope = EventEnvelope::new(Event::RoundAborted {
            round_id: "R1".to_string(),
            reason: "instructor".to_string(),
        });

        assert!(!envelope.id.is_nil());
        assert!(envelope.timestamp <= Utc::now());
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::RoundStatusChanged {
            round_id: "R1".to_string(),
            from_status: "awaiting_barrier".to_string(),
            to_status: "market_updating".to_string(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("round.status_changed"));
        assert!(json.contains("from_status"));
        assert!(json.contains("market_updating"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"plan.submitted","round_id":"R1","team_id":"T1","action_count":3}"#;
        let event: Event = serde_json::from_str(json).unwrap();

        assert_eq!(
            event,
            Event::PlanSubmitted {
                round_id: "R1".to_string(),
                team_id: "T1".to_string(),
                action_count: 3,
            }
        );
    }

    #[test]
    fn test_event_ids() {
        let event = Event::EvaluationRecorded {
            round_id: "R2".to_string(),
            team_id: "T1".to_string(),
            score: 72.5,
        };
        assert_eq!(event.round_id(), Some("R2"));
        assert_eq!(event.team_id(), Some("T1"));

        let reset = Event::SimulationReset { teams: 3 };
        assert_eq!(reset.round_id(), None);
        assert_eq!(reset.team_id(), None);
    }

    #[test]
    fn test_event_type_matches_tag() {
        let events = [
            Event::SimulationReset { teams: 1 },
            Event::MarketUpdated {
                round_id: "R1".to_string(),
                version: 1,
                events: vec!["fuel_spike".to_string()],
            },
            Event::DefaultPlanAssigned {
                round_id: "R1".to_string(),
                team_id: "T1".to_string(),
                policy: "empty".to_string(),
            },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.event_type());
        }
    }
}
