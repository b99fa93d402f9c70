//! Capacity and parameter rules shared by the validator and the executor.

use airline_core::{ActionParameters, Ledger, ValidationRules};
use std::collections::BTreeSet;

/// Resources of one airline while a plan is walked action by action.
///
/// Starts from the ledger and absorbs each accepted action, so later
/// actions see the effect of earlier ones (aircraft bought first count
/// toward route slots of routes added later).
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedState {
    pub fleet_size: u32,
    pub routes: BTreeSet<String>,
    pub maintenance_level: u32,
    pub campaigns: u32,
    pub trainings: u32,
}

impl ProjectedState {
    pub fn from_ledger(ledger: &Ledger) -> Self {
        Self {
            fleet_size: ledger.fleet_size,
            routes: ledger.routes.clone(),
            maintenance_level: ledger.maintenance_level,
            campaigns: 0,
            trainings: 0,
        }
    }

    pub fn route_slots(&self, rules: &ValidationRules) -> u64 {
        self.fleet_size as u64 * rules.routes_per_aircraft as u64
    }

    pub fn check_capacity(&self, params: &ActionParameters, rules: &ValidationRules) -> Result<(), String> {
        match params {
            ActionParameters::PurchaseAircraft { count } => {
                let projected = self.fleet_size as u64 + *count as u64;
                if projected > rules.max_fleet_size as u64 {
                    return Err(format!(
                        "fleet of {} would exceed the limit of {} aircraft",
                        projected, rules.max_fleet_size
                    ));
                }
            }
            ActionParameters::AddRoute { .. } => {
                let slots = self.route_slots(rules);
                if self.routes.len() as u64 + 1 > slots {
                    return Err(format!(
                        "{} aircraft can serve {} routes and {} are already planned",
                        self.fleet_size,
                        slots,
                        self.routes.len()
                    ));
                }
            }
            ActionParameters::MarketingCampaign { .. } => {
                if self.campaigns >= rules.max_campaigns_per_round {
                    return Err(format!(
                        "at most {} marketing campaigns per round",
                        rules.max_campaigns_per_round
                    ));
                }
            }
            ActionParameters::StaffTraining => {
                if self.trainings >= rules.max_trainings_per_round {
                    return Err(format!(
                        "at most {} staff trainings per round",
                        rules.max_trainings_per_round
                    ));
                }
            }
            ActionParameters::MaintenanceUpgrade => {
                if self.fleet_size == 0 {
                    return Err("maintenance needs at least one aircraft".to_string());
                }
                if self.maintenance_level >= rules.max_maintenance_level {
                    return Err(format!(
                        "maintenance is already at the maximum level {}",
                        rules.max_maintenance_level
                    ));
                }
            }
        }
        Ok(())
    }

    /// Checks that depend on the projected state rather than on the
    /// parameters alone.
    pub fn check_parameters(&self, params: &ActionParameters) -> Result<(), String> {
        if let ActionParameters::AddRoute { route } = params {
            if self.routes.contains(route) {
                return Err(format!("route {} is already served or planned", route));
            }
        }
        Ok(())
    }

    pub fn apply(&mut self, params: &ActionParameters) {
        match params {
            ActionParameters::PurchaseAircraft { count } => {
                self.fleet_size = self.fleet_size.saturating_add(*count);
            }
            ActionParameters::AddRoute { route } => {
                self.routes.insert(route.clone());
            }
            ActionParameters::MarketingCampaign { .. } => self.campaigns += 1,
            ActionParameters::StaffTraining => self.trainings += 1,
            ActionParameters::MaintenanceUpgrade => self.maintenance_level += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airline_core::Money;

    fn state(fleet: u32) -> ProjectedState {
        let rules = ValidationRules::default();
        ProjectedState::from_ledger(&Ledger::new("T1", "Airline", Money::ZERO).with_fleet(fleet, &rules))
    }

    #[test]
    fn test_route_needs_aircraft() {
        let rules = ValidationRules::default();
        let route = ActionParameters::AddRoute {
            route: "PRG-LHR".to_string(),
        };

        let mut projected = state(0);
        assert!(projected.check_capacity(&route, &rules).is_err());

        projected.apply(&ActionParameters::PurchaseAircraft { count: 1 });
        assert!(projected.check_capacity(&route, &rules).is_ok());

        projected.apply(&route);
        let second = ActionParameters::AddRoute {
            route: "PRG-CDG".to_string(),
        };
        assert!(projected.check_capacity(&second, &rules).is_err());
    }

    #[test]
    fn test_fleet_limit() {
        let rules = ValidationRules::default();
        let projected = state(49);
        assert!(projected
            .check_capacity(&ActionParameters::PurchaseAircraft { count: 1 }, &rules)
            .is_ok());
        assert!(projected
            .check_capacity(&ActionParameters::PurchaseAircraft { count: 2 }, &rules)
            .is_err());
    }

    #[test]
    fn test_per_round_limits() {
        let rules = ValidationRules::default();
        let mut projected = state(1);
        let campaign = ActionParameters::MarketingCampaign {
            reputation_impact: 5,
        };
        for _ in 0..rules.max_campaigns_per_round {
            assert!(projected.check_capacity(&campaign, &rules).is_ok());
            projected.apply(&campaign);
        }
        assert!(projected.check_capacity(&campaign, &rules).is_err());
    }

    #[test]
    fn test_maintenance_requires_fleet() {
        let rules = ValidationRules::default();
        assert!(state(0)
            .check_capacity(&ActionParameters::MaintenanceUpgrade, &rules)
            .is_err());
        assert!(state(2)
            .check_capacity(&ActionParameters::MaintenanceUpgrade, &rules)
            .is_ok());
    }

    #[test]
    fn test_duplicate_route_parameters() {
        let mut projected = state(3);
        let route = ActionParameters::AddRoute {
            route: "PRG-LHR".to_string(),
        };
        assert!(projected.check_parameters(&route).is_ok());
        projected.apply(&route);
        assert!(projected.check_parameters(&route).is_err());
    }
}
