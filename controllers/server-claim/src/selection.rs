//! Pure candidate-selection logic (§4.5), separated from the I/O and the
//! binding mutex so the precedence rules are unit-testable.

use std::collections::BTreeMap;

use crds::power::PowerState;
use crds::server::ServerState;
use crds::server_claim::ServerClaimSpec;

#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub name: &'a str,
    pub labels: &'a BTreeMap<String, String>,
    pub state: ServerState,
    pub power_state: PowerState,
    pub already_claimed: bool,
}

pub fn select_candidate<'a>(spec: &ServerClaimSpec, candidates: &[Candidate<'a>]) -> Option<String> {
    if let Some(server_ref) = &spec.server_ref {
        return candidates.iter().find(|c| c.name == server_ref.name && !c.already_claimed).map(|c| c.name.to_string());
    }

    if let Some(selector) = &spec.server_selector {
        return candidates
            .iter()
            .filter(|c| !c.already_claimed && c.state == ServerState::Available)
            .find(|c| selector.iter().all(|(k, v)| c.labels.get(k) == Some(v)))
            .map(|c| c.name.to_string());
    }

    candidates
        .iter()
        .filter(|c| !c.already_claimed && c.state == ServerState::Available && c.power_state == PowerState::Off)
        .map(|c| c.name.to_string())
        .next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::references::ClusterRef;

    fn candidate<'a>(name: &'a str, labels: &'a BTreeMap<String, String>, state: ServerState, power: PowerState, claimed: bool) -> Candidate<'a> {
        Candidate { name, labels, state, power_state: power, already_claimed: claimed }
    }

    #[test]
    fn explicit_reference_wins() {
        let labels = BTreeMap::new();
        let candidates = vec![candidate("a", &labels, ServerState::Reserved, PowerState::On, false), candidate("b", &labels, ServerState::Available, PowerState::Off, false)];
        let spec = ServerClaimSpec { server_ref: Some(ClusterRef::new("a")), server_selector: None, power: crds::power::DesiredPower::On, boot: dummy_boot() };
        assert_eq!(select_candidate(&spec, &candidates), Some("a".to_string()));
    }

    #[test]
    fn selector_matches_labels() {
        let mut labels_a = BTreeMap::new();
        labels_a.insert("rack".to_string(), "1".to_string());
        let labels_b = BTreeMap::new();
        let candidates = vec![candidate("a", &labels_a, ServerState::Available, PowerState::On, false), candidate("b", &labels_b, ServerState::Available, PowerState::Off, false)];
        let mut selector = BTreeMap::new();
        selector.insert("rack".to_string(), "1".to_string());
        let spec = ServerClaimSpec { server_ref: None, server_selector: Some(selector), power: crds::power::DesiredPower::On, boot: dummy_boot() };
        assert_eq!(select_candidate(&spec, &candidates), Some("a".to_string()));
    }

    #[test]
    fn first_fit_requires_available_and_off() {
        let labels = BTreeMap::new();
        let candidates = vec![
            candidate("a", &labels, ServerState::Available, PowerState::On, false),
            candidate("b", &labels, ServerState::Available, PowerState::Off, false),
        ];
        let spec = ServerClaimSpec { server_ref: None, server_selector: None, power: crds::power::DesiredPower::On, boot: dummy_boot() };
        assert_eq!(select_candidate(&spec, &candidates), Some("b".to_string()));
    }

    #[test]
    fn no_candidate_when_all_claimed() {
        let labels = BTreeMap::new();
        let candidates = vec![candidate("a", &labels, ServerState::Available, PowerState::Off, true)];
        let spec = ServerClaimSpec { server_ref: None, server_selector: None, power: crds::power::DesiredPower::On, boot: dummy_boot() };
        assert_eq!(select_candidate(&spec, &candidates), None);
    }

    fn dummy_boot() -> crds::server_claim::BootSpec {
        crds::server_claim::BootSpec { image: "image".to_string(), ignition_secret_ref: crds::references::NamespacedRef::new("ignition") }
    }
}
