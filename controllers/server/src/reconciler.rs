//! Server lifecycle reconciler (C4, §4.4).

use std::sync::Arc;

use chrono::Utc;
use crds::power::PowerState as CrdPowerState;
use crds::server::{Server, ServerState, ServerStatus};
use redfish_client::{system_uri, AttributeValue, PowerState as DevicePowerState, RedfishClient};
use tracing::{debug, info};

use crate::error::ControllerError;

/// Everything `compute_state` needs, already read off the Server and its
/// peers this pass — kept separate from the I/O so the transition table
/// is unit-testable without a mock BMC.
#[derive(Debug, Clone)]
pub struct StateInputs {
    pub current: ServerState,
    pub enriched: bool,
    pub discovery_ack: bool,
    pub has_claim: bool,
    pub has_maintenance: bool,
    pub pre_maintenance_state: Option<ServerState>,
    pub bmc_unrecoverable_error: bool,
}

pub fn compute_state(inputs: &StateInputs) -> ServerState {
    if inputs.bmc_unrecoverable_error {
        return ServerState::Error;
    }
    if inputs.has_maintenance {
        return ServerState::Maintenance;
    }
    match inputs.current {
        ServerState::Initial => {
            if inputs.enriched {
                ServerState::Discovery
            } else {
                ServerState::Initial
            }
        }
        ServerState::Discovery => {
            if inputs.discovery_ack {
                ServerState::Available
            } else {
                ServerState::Discovery
            }
        }
        ServerState::Available => {
            if inputs.has_claim {
                ServerState::Reserved
            } else {
                ServerState::Available
            }
        }
        ServerState::Reserved => {
            if inputs.has_claim {
                ServerState::Reserved
            } else {
                ServerState::Available
            }
        }
        ServerState::Maintenance => inputs.pre_maintenance_state.unwrap_or(if inputs.has_claim { ServerState::Reserved } else { ServerState::Available }),
        ServerState::Error => ServerState::Error,
    }
}

fn device_power_to_crd(power: DevicePowerState) -> CrdPowerState {
    match power {
        DevicePowerState::On => CrdPowerState::On,
        DevicePowerState::Off => CrdPowerState::Off,
        DevicePowerState::Paused => CrdPowerState::Paused,
        DevicePowerState::Unknown => CrdPowerState::Unknown,
    }
}

/// Refreshes status from the device and computes the next lifecycle
/// state. Does not write anything; the caller patches the returned
/// status via the store.
pub async fn reconcile(server: &Server, client: &Arc<dyn RedfishClient>, timeout: std::time::Duration, discovery_ack: bool) -> Result<ServerStatus, ControllerError> {
    let name = server.metadata.name.clone().unwrap_or_default();
    let uri = system_uri(server.spec.bmc_index);
    let mut status = server.status.clone().unwrap_or_default();

    let power = client.get_system_power_state(&uri, timeout).await?;
    status.power_state = device_power_to_crd(power);

    if status.manufacturer.is_none() || status.model.is_none() {
        let keys = vec!["Manufacturer".to_string(), "Model".to_string()];
        if let Ok(attrs) = client.get_bmc_attributes(&keys, timeout).await {
            if let Some(AttributeValue::Text(m)) = attrs.get("Manufacturer") {
                status.manufacturer = Some(m.clone());
            }
            if let Some(AttributeValue::Text(m)) = attrs.get("Model") {
                status.model = Some(m.clone());
            }
        }
    }

    if let Ok(version) = client.get_bios_version(&uri, timeout).await {
        status.bios_version = Some(version);
    }

    let enriched_now = status.system_uuid.is_none();
    if enriched_now {
        status.system_uuid = Some(uuid::Uuid::new_v4().to_string());
        info!(server = %name, uuid = %status.system_uuid.as_deref().unwrap_or_default(), "enriched server with a system identifier");
    }

    let inputs = StateInputs {
        current: status.state,
        enriched: status.system_uuid.is_some(),
        discovery_ack,
        has_claim: server.spec.claim_ref.is_some(),
        has_maintenance: server.spec.maintenance_ref.is_some(),
        pre_maintenance_state: status.pre_maintenance_state,
        bmc_unrecoverable_error: false,
    };

    let next = compute_state(&inputs);
    if next != status.state {
        debug!(server = %name, from = ?status.state, to = ?next, "lifecycle transition");
        if status.state != ServerState::Maintenance && next == ServerState::Maintenance {
            status.pre_maintenance_state = Some(status.state);
            status.pre_maintenance_power = Some(status.power_state);
        }
        status.state = next;
    }

    let _ = Utc::now();
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(current: ServerState) -> StateInputs {
        StateInputs {
            current,
            enriched: true,
            discovery_ack: false,
            has_claim: false,
            has_maintenance: false,
            pre_maintenance_state: None,
            bmc_unrecoverable_error: false,
        }
    }

    #[test]
    fn initial_waits_for_enrichment() {
        let mut i = inputs(ServerState::Initial);
        i.enriched = false;
        assert_eq!(compute_state(&i), ServerState::Initial);
    }

    #[test]
    fn initial_to_discovery_once_enriched() {
        assert_eq!(compute_state(&inputs(ServerState::Initial)), ServerState::Discovery);
    }

    #[test]
    fn discovery_idles_without_ack() {
        assert_eq!(compute_state(&inputs(ServerState::Discovery)), ServerState::Discovery);
    }

    #[test]
    fn discovery_to_available_with_ack() {
        let mut i = inputs(ServerState::Discovery);
        i.discovery_ack = true;
        assert_eq!(compute_state(&i), ServerState::Available);
    }

    #[test]
    fn available_to_reserved_on_claim() {
        let mut i = inputs(ServerState::Available);
        i.has_claim = true;
        assert_eq!(compute_state(&i), ServerState::Reserved);
    }

    #[test]
    fn reserved_to_available_on_release() {
        assert_eq!(compute_state(&inputs(ServerState::Reserved)), ServerState::Available);
    }

    #[test]
    fn maintenance_wins_over_claim_for_display() {
        let mut i = inputs(ServerState::Reserved);
        i.has_claim = true;
        i.has_maintenance = true;
        assert_eq!(compute_state(&i), ServerState::Maintenance);
    }

    #[test]
    fn maintenance_restores_reserved() {
        let mut i = inputs(ServerState::Maintenance);
        i.has_claim = true;
        i.pre_maintenance_state = Some(ServerState::Reserved);
        assert_eq!(compute_state(&i), ServerState::Reserved);
    }

    #[test]
    fn bmc_error_is_sticky_override() {
        let mut i = inputs(ServerState::Available);
        i.bmc_unrecoverable_error = true;
        assert_eq!(compute_state(&i), ServerState::Error);
    }
}
