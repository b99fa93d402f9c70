use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::money::Money;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    PurchaseAircraft,
    AddRoute,
    MarketingCampaign,
    StaffTraining,
    MaintenanceUpgrade,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PurchaseAircraft => "purchase_aircraft",
            Self::AddRoute => "add_route",
            Self::MarketingCampaign => "marketing_campaign",
            Self::StaffTraining => "staff_training",
            Self::MaintenanceUpgrade => "maintenance_upgrade",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "purchase_aircraft" => Some(Self::PurchaseAircraft),
            "add_route" => Some(Self::AddRoute),
            "marketing_campaign" => Some(Self::MarketingCampaign),
            "staff_training" => Some(Self::StaffTraining),
            "maintenance_upgrade" => Some(Self::MaintenanceUpgrade),
            _ => None,
        }
    }
}

/// One intended action inside a semester plan. Immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    pub action_type: ActionType,
    pub description: String,
    pub cost: Money,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// Parameters of an action, typed per action type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionParameters {
    PurchaseAircraft { count: u32 },
    AddRoute { route: String },
    MarketingCampaign { reputation_impact: u8 },
    StaffTraining,
    MaintenanceUpgrade,
}

const DEFAULT_AIRCRAFT_COUNT: u64 = 1;
const DEFAULT_REPUTATION_IMPACT: u64 = 5;
const MAX_REPUTATION_IMPACT: u64 = 10;

impl Action {
    pub fn new(action_type: ActionType, description: impl Into<String>, cost: Money) -> Self {
        Self {
            action_type,
            description: description.into(),
            cost,
            parameters: Map::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Interpret the raw parameter object for this action's type.
    ///
    /// Returns a human-readable reason when the parameters are malformed.
    pub fn parameters(&self) -> Result<ActionParameters, String> {
        match self.action_type {
            ActionType::PurchaseAircraft => {
                let count = self.integer_param("count", DEFAULT_AIRCRAFT_COUNT)?;
                if count == 0 {
                    return Err("count must be at least 1".to_string());
                }
                let count = u32::try_from(count).map_err(|_| "count is too large".to_string())?;
                Ok(ActionParameters::PurchaseAircraft { count })
            }
            ActionType::AddRoute => {
                let route = match self.parameters.get("route") {
                    Some(Value::String(route)) => route.trim().to_string(),
                    Some(_) => return Err("route must be a string".to_string()),
                    None => return Err("route is required".to_string()),
                };
                validate_route(&route)?;
                Ok(ActionParameters::AddRoute { route })
            }
            ActionType::MarketingCampaign => {
                let impact = self.integer_param("reputation_impact", DEFAULT_REPUTATION_IMPACT)?;
                if !(1..=MAX_REPUTATION_IMPACT).contains(&impact) {
                    return Err(format!(
                        "reputation_impact must be between 1 and {}",
                        MAX_REPUTATION_IMPACT
                    ));
                }
                Ok(ActionParameters::MarketingCampaign {
                    reputation_impact: impact as u8,
                })
            }
            ActionType::StaffTraining => Ok(ActionParameters::StaffTraining),
            ActionType::MaintenanceUpgrade => Ok(ActionParameters::MaintenanceUpgrade),
        }
    }

    fn integer_param(&self, key: &str, default: u64) -> Result<u64, String> {
        match self.parameters.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Number(n)) => n
                .as_u64()
                .ok_or_else(|| format!("{} must be a non-negative integer", key)),
            Some(_) => Err(format!("{} must be an integer", key)),
        }
    }
}

/// Routes are written as two distinct IATA-style codes, e.g. `PRG-LHR`.
fn validate_route(route: &str) -> Result<(), String> {
    let malformed = || format!("route {:?} must look like PRG-LHR", route);
    let (from, to) = route.split_once('-').ok_or_else(malformed)?;
    let is_code = |code: &str| code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase());
    if !is_code(from) || !is_code(to) {
        return Err(malformed());
    }
    if from == to {
        return Err(format!("route {:?} must connect two different airports", route));
    }
    Ok(())
}

/// Why an action ended up in the rejected set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    BudgetExceeded { cost: Money, remaining: Money },
    CapacityExceeded { detail: String },
    InvalidParameters { detail: String },
    /// The executor's re-check disagreed with the validator.
    InconsistentExecution { detail: String },
}

impl RejectionReason {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::BudgetExceeded { .. } => "BudgetExceeded",
            Self::CapacityExceeded { .. } => "CapacityExceeded",
            Self::InvalidParameters { .. } => "InvalidParameters",
            Self::InconsistentExecution { .. } => "InconsistentExecution",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::BudgetExceeded { cost, remaining } => {
                format!("costs {} but only {} remained", cost, remaining)
            }
            Self::CapacityExceeded { detail }
            | Self::InvalidParameters { detail }
            | Self::InconsistentExecution { detail } => detail.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RejectedAction {
    /// Position of the action in the submitted plan.
    pub index: usize,
    pub action: Action,
    pub reason: RejectionReason,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovedAction {
    pub index: usize,
    pub action: Action,
}
