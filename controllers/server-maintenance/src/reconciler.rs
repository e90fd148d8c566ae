//! Glue between the pure arbiter in `crates/maintenance` and the
//! `ServerMaintenance`/`Server` pair it governs. Building the
//! [`maintenance::ArbiterInput`] and classifying the approval state is
//! pure; applying the resulting [`maintenance::ArbiterAction`] is the
//! only I/O in this controller.

use crds::maintenance::{MaintenanceState, ServerMaintenance, ServerMaintenanceStatus};
use crds::references::NamespacedRef;
use crds::server::{Server, ServerState};
use crds::server_claim::{ServerClaim, ANNOTATION_MAINTENANCE_APPROVED};
use kube::{Api, Resource, ResourceExt};
use maintenance::{decide, ArbiterAction, ArbiterInput};
use store::{patch_merge, patch_status};
use tracing::info;

use crate::error::ControllerError;

/// Reads the approval annotation for `OwnerApproval` policy. When
/// `owner_ref` names a cached `ServerClaim`, the annotation is read off
/// that claim (an operator approves the claim, not the maintenance
/// window it produced). Otherwise — BIOSVersion/BMCSettings/BIOSSettings
/// maintenances, which own no such reference — the annotation is read
/// directly off this `ServerMaintenance`, which those reconcilers (or an
/// operator) annotate in place.
pub fn is_approved(maintenance: &ServerMaintenance, claim: Option<&ServerClaim>) -> bool {
    if let (Some(owner_ref), Some(claim)) = (&maintenance.spec.owner_ref, claim) {
        if claim.name_any() == owner_ref.name {
            return claim.annotations().get(ANNOTATION_MAINTENANCE_APPROVED).map(String::as_str) == Some("true");
        }
    }
    maintenance.annotations().get(ANNOTATION_MAINTENANCE_APPROVED).map(String::as_str) == Some("true")
}

pub fn build_input(maintenance: &ServerMaintenance, server: &Server, approved: bool) -> ArbiterInput {
    let maintenance_name = maintenance.name_any();
    let state = maintenance.status.as_ref().map(|s| s.state).unwrap_or_default();
    let holder_ref = server.spec.maintenance_ref.as_ref();

    ArbiterInput {
        policy: maintenance.spec.policy,
        maintenance_state: state,
        approved,
        holder_bound_to_this: holder_ref.map(|r| r.name == maintenance_name).unwrap_or(false),
        holder_bound_to_other: holder_ref.map(|r| r.name != maintenance_name).unwrap_or(false),
        deleting: maintenance.meta().deletion_timestamp.is_some(),
    }
}

pub async fn apply_action(
    action: ArbiterAction,
    maintenance_api: &Api<ServerMaintenance>,
    server_api: &Api<Server>,
    maintenance: &ServerMaintenance,
    server: &Server,
) -> Result<(), ControllerError> {
    let maintenance_name = maintenance.name_any();
    let server_name = server.name_any();

    match action {
        ArbiterAction::Grant => {
            info!(maintenance = %maintenance_name, server = %server_name, "granting maintenance hold");
            let status = server.status.clone().unwrap_or_default();
            let pre_state = status.pre_maintenance_state.unwrap_or(status.state);
            let pre_power = status.pre_maintenance_power.unwrap_or(status.power_state);

            patch_merge(server_api, &server_name, serde_json::json!({ "spec": { "maintenanceRef": NamespacedRef::new(&maintenance_name) } })).await?;
            patch_status(
                server_api,
                &server_name,
                serde_json::json!({ "status": { "state": ServerState::Maintenance, "preMaintenanceState": pre_state, "preMaintenancePower": pre_power } }),
            )
            .await?;

            if let Some(desired_power) = maintenance.spec.desired_power {
                patch_merge(server_api, &server_name, serde_json::json!({ "spec": { "power": desired_power } })).await?;
            }

            patch_status(maintenance_api, &maintenance_name, serde_json::json!({ "status": ServerMaintenanceStatus { state: MaintenanceState::InMaintenance } })).await?;
        }
        ArbiterAction::Release | ArbiterAction::ReleaseOnDelete => {
            info!(maintenance = %maintenance_name, server = %server_name, "releasing maintenance hold");
            let status = server.status.clone().unwrap_or_default();
            let restored_state = status.pre_maintenance_state.unwrap_or(ServerState::Available);

            patch_merge(server_api, &server_name, serde_json::json!({ "spec": { "maintenanceRef": serde_json::Value::Null } })).await?;
            patch_status(
                server_api,
                &server_name,
                serde_json::json!({ "status": { "state": restored_state, "preMaintenanceState": serde_json::Value::Null, "preMaintenancePower": serde_json::Value::Null } }),
            )
            .await?;

            if action == ArbiterAction::Release {
                patch_status(maintenance_api, &maintenance_name, serde_json::json!({ "status": ServerMaintenanceStatus { state: MaintenanceState::Completed } })).await?;
            }
        }
        ArbiterAction::WaitForApproval | ArbiterAction::WaitForCompetingHolder | ArbiterAction::NoOp => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::maintenance::MaintenancePolicy;
    use crds::references::ClusterRef;
    use kube::api::ObjectMeta;

    fn maintenance_with(policy: MaintenancePolicy, state: Option<MaintenanceState>) -> ServerMaintenance {
        ServerMaintenance {
            metadata: ObjectMeta { name: Some("m1".to_string()), ..Default::default() },
            spec: crds::maintenance::ServerMaintenanceSpec { server_ref: ClusterRef::new("srv-a"), policy, owner_ref: None, desired_power: None },
            status: state.map(|state| ServerMaintenanceStatus { state }),
        }
    }

    fn server_bound_to(name: Option<&str>) -> Server {
        Server {
            metadata: ObjectMeta { name: Some("srv-a".to_string()), ..Default::default() },
            spec: crds::server::ServerSpec {
                bmc_ref: ClusterRef::new("bmc-a"),
                bmc_index: 0,
                claim_ref: None,
                maintenance_ref: name.map(NamespacedRef::new),
                bios_settings_ref: None,
                boot_configuration_ref: None,
                power: None,
            },
            status: None,
        }
    }

    #[test]
    fn unbound_pending_enforced_produces_grant_input() {
        let m = maintenance_with(MaintenancePolicy::Enforced, None);
        let s = server_bound_to(None);
        let input = build_input(&m, &s, false);
        assert_eq!(decide(input), ArbiterAction::Grant);
    }

    #[test]
    fn bound_to_this_in_maintenance_is_noop() {
        let m = maintenance_with(MaintenancePolicy::Enforced, Some(MaintenanceState::InMaintenance));
        let s = server_bound_to(Some("m1"));
        let input = build_input(&m, &s, false);
        assert_eq!(decide(input), ArbiterAction::NoOp);
    }

    #[test]
    fn bound_to_other_blocks() {
        let m = maintenance_with(MaintenancePolicy::Enforced, None);
        let s = server_bound_to(Some("m-other"));
        let input = build_input(&m, &s, false);
        assert_eq!(decide(input), ArbiterAction::WaitForCompetingHolder);
    }
}
