use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFCON_MAX, DEFCON_MIN, POLICY_THRESHOLD};
use crate::error::PolicyConfigError;
use crate::sentinel::{Severity, ThreatKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    NoAction,
    Notify,
    TemporalBrake,
    Stabilize,
    DeployScout,
    DeployInterceptor,
    Lockdown,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::NoAction => "NO_ACTION",
            ActionKind::Notify => "NOTIFY",
            ActionKind::TemporalBrake => "TEMPORAL_BRAKE",
            ActionKind::Stabilize => "STABILIZE",
            ActionKind::DeployScout => "DEPLOY_SCOUT",
            ActionKind::DeployInterceptor => "DEPLOY_INTERCEPTOR",
            ActionKind::Lockdown => "LOCKDOWN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "NO_ACTION" => Some(ActionKind::NoAction),
            "NOTIFY" => Some(ActionKind::Notify),
            "TEMPORAL_BRAKE" => Some(ActionKind::TemporalBrake),
            "STABILIZE" => Some(ActionKind::Stabilize),
            "DEPLOY_SCOUT" => Some(ActionKind::DeployScout),
            "DEPLOY_INTERCEPTOR" => Some(ActionKind::DeployInterceptor),
            "LOCKDOWN" => Some(ActionKind::Lockdown),
            _ => None,
        }
    }
}

fn enabled_by_default() -> bool {
    true
}

/// Maps one `(threat, severity)` pair to an action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub threat: ThreatKind,
    pub severity: Severity,
    pub action: ActionKind,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl PolicyRule {
    pub fn new(threat: ThreatKind, severity: Severity, action: ActionKind) -> Self {
        Self {
            threat,
            severity,
            action,
            enabled: true,
        }
    }
}

/// Validated Valkyrie policy. Construction is the only place thresholds and
/// rules are checked.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Policy {
    threshold: u8,
    rules: Vec<PolicyRule>,
}

impl Policy {
    pub fn new(threshold: u8, rules: Vec<PolicyRule>) -> Result<Self, PolicyConfigError> {
        if !(DEFCON_MIN..=DEFCON_MAX).contains(&threshold) {
            return Err(PolicyConfigError::ThresholdOutOfRange(threshold));
        }
        if rules.is_empty() {
            return Err(PolicyConfigError::NoRules);
        }
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert((rule.threat, rule.severity)) {
                return Err(PolicyConfigError::DuplicateRule {
                    threat: rule.threat,
                    severity: rule.severity,
                });
            }
            if rule.action == ActionKind::NoAction {
                return Err(PolicyConfigError::InertRule {
                    threat: rule.threat,
                    severity: rule.severity,
                });
            }
        }
        Ok(Self { threshold, rules })
    }

    /// Valkyrie acts only when `defcon_level <= threshold`.
    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// Enabled rule for the exact pair, if any.
    pub fn lookup(&self, threat: ThreatKind, severity: Severity) -> Option<&PolicyRule> {
        self.rules
            .iter()
            .find(|r| r.enabled && r.threat == threat && r.severity == severity)
    }

    /// Arm or disarm a rule. Returns false when no such rule exists.
    pub fn set_enabled(&mut self, threat: ThreatKind, severity: Severity, enabled: bool) -> bool {
        match self
            .rules
            .iter_mut()
            .find(|r| r.threat == threat && r.severity == severity)
        {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        use ActionKind::*;
        use Severity::*;
        use ThreatKind::*;

        Self {
            threshold: POLICY_THRESHOLD,
            rules: vec![
                PolicyRule::new(TemporalSurge, Low, TemporalBrake),
                PolicyRule::new(TemporalSurge, Medium, TemporalBrake),
                PolicyRule::new(TemporalSurge, High, DeployInterceptor),
                PolicyRule::new(LocalizedCongestion, Low, DeployScout),
                PolicyRule::new(LocalizedCongestion, Medium, DeployScout),
                PolicyRule::new(LocalizedCongestion, High, DeployInterceptor),
                PolicyRule::new(Polarization, Low, Stabilize),
                PolicyRule::new(Polarization, Medium, Stabilize),
                PolicyRule::new(Polarization, High, Stabilize),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        let d = Policy::default();
        let rebuilt = Policy::new(d.threshold(), d.rules().to_vec()).unwrap();
        assert_eq!(rebuilt, d);
        assert_eq!(d.threshold(), 3);
    }

    #[test]
    fn test_threshold_out_of_range() {
        let rules = Policy::default().rules().to_vec();
        assert_eq!(
            Policy::new(0, rules.clone()),
            Err(PolicyConfigError::ThresholdOutOfRange(0))
        );
        assert_eq!(
            Policy::new(6, rules),
            Err(PolicyConfigError::ThresholdOutOfRange(6))
        );
    }

    #[test]
    fn test_no_rules() {
        assert_eq!(Policy::new(3, vec![]), Err(PolicyConfigError::NoRules));
    }

    #[test]
    fn test_duplicate_rule() {
        let rule = PolicyRule::new(
            ThreatKind::TemporalSurge,
            Severity::Low,
            ActionKind::Notify,
        );
        assert!(matches!(
            Policy::new(3, vec![rule.clone(), rule]),
            Err(PolicyConfigError::DuplicateRule { .. })
        ));
    }

    #[test]
    fn test_no_action_rule_rejected() {
        let rule = PolicyRule::new(
            ThreatKind::Polarization,
            Severity::Low,
            ActionKind::NoAction,
        );
        assert!(matches!(
            Policy::new(3, vec![rule]),
            Err(PolicyConfigError::InertRule { .. })
        ));
    }

    #[test]
    fn test_lookup_and_disarm() {
        let mut policy = Policy::default();
        let rule = policy
            .lookup(ThreatKind::LocalizedCongestion, Severity::High)
            .unwrap();
        assert_eq!(rule.action, ActionKind::DeployInterceptor);

        assert!(policy.set_enabled(ThreatKind::LocalizedCongestion, Severity::High, false));
        assert!(
            policy
                .lookup(ThreatKind::LocalizedCongestion, Severity::High)
                .is_none()
        );
        assert!(policy.lookup(ThreatKind::MalformedData, Severity::Low).is_none());
        assert!(!policy.set_enabled(ThreatKind::MalformedData, Severity::Low, false));
    }

    #[test]
    fn test_action_parse() {
        assert_eq!(ActionKind::parse("deploy-scout"), Some(ActionKind::DeployScout));
        assert_eq!(ActionKind::parse("LOCKDOWN"), Some(ActionKind::Lockdown));
        assert_eq!(ActionKind::parse("launch"), None);
    }

    #[test]
    fn test_rule_toml_shape() {
        let rule: PolicyRule = serde_json::from_str(
            r#"{"threat":"TEMPORAL_SURGE","severity":"HIGH","action":"LOCKDOWN"}"#,
        )
        .unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.action, ActionKind::Lockdown);
    }
}
