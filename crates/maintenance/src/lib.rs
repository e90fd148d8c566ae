//! Pure state-transition logic for exclusive maintenance holds (C3).
//!
//! Generalized over "holder" — a Server for `ServerMaintenance`, a BMC
//! for `BMCMaintenance` — so both `controllers/server-maintenance` and
//! the BMC-level token acquired by `controllers/bmc-settings` drive the
//! same decision function. No I/O here; callers supply the current
//! observed state and get back an action to perform.

use crds::maintenance::{MaintenancePolicy, MaintenanceState};

/// What a reconciler should do with the maintenance object and its
/// holder this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterAction {
    /// Bind the holder to this maintenance and set its state to InMaintenance.
    Grant,
    /// Policy is OwnerApproval and the approval annotation is absent; idle.
    WaitForApproval,
    /// Another maintenance already holds this holder; requeue without progress.
    WaitForCompetingHolder,
    /// Maintenance reached Completed and this holder was bound to it: clear
    /// the binding and restore whatever state/power preceded maintenance.
    Release,
    /// Maintenance object is being deleted without having reached Completed
    /// normally (abandoned mid-hold): same release side effects, driven by
    /// the finalizer instead of a state transition.
    ReleaseOnDelete,
    /// Nothing to do: state already reflects the desired outcome, or the
    /// maintenance is terminally Failed and awaiting an explicit retry.
    NoOp,
}

/// Everything the decision function needs, observed fresh each reconcile.
#[derive(Debug, Clone, Copy)]
pub struct ArbiterInput {
    pub policy: MaintenancePolicy,
    pub maintenance_state: MaintenanceState,
    /// True if the owning claim (ServerMaintenance) or an equivalent
    /// approval marker (BMCMaintenance) carries `maintenance-approved=true`.
    pub approved: bool,
    /// True if the holder's maintenance reference already points at this
    /// maintenance object.
    pub holder_bound_to_this: bool,
    /// True if the holder's maintenance reference points at a different,
    /// still-live maintenance object.
    pub holder_bound_to_other: bool,
    /// True if this maintenance object has a deletion timestamp set.
    pub deleting: bool,
}

pub fn decide(input: ArbiterInput) -> ArbiterAction {
    if input.deleting {
        return if input.holder_bound_to_this { ArbiterAction::ReleaseOnDelete } else { ArbiterAction::NoOp };
    }

    match input.maintenance_state {
        MaintenanceState::Completed => {
            if input.holder_bound_to_this {
                ArbiterAction::Release
            } else {
                ArbiterAction::NoOp
            }
        }
        MaintenanceState::Failed => ArbiterAction::NoOp,
        MaintenanceState::InMaintenance => {
            if input.holder_bound_to_this {
                ArbiterAction::NoOp
            } else {
                // Status says granted but the holder reference doesn't agree
                // (e.g. after a crash between the two writes); re-grant to
                // converge rather than trusting stale status.
                ArbiterAction::Grant
            }
        }
        MaintenanceState::Pending => {
            if input.holder_bound_to_other {
                return ArbiterAction::WaitForCompetingHolder;
            }
            match input.policy {
                MaintenancePolicy::Enforced => ArbiterAction::Grant,
                MaintenancePolicy::OwnerApproval => {
                    if input.approved {
                        ArbiterAction::Grant
                    } else {
                        ArbiterAction::WaitForApproval
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(policy: MaintenancePolicy, state: MaintenanceState) -> ArbiterInput {
        ArbiterInput {
            policy,
            maintenance_state: state,
            approved: false,
            holder_bound_to_this: false,
            holder_bound_to_other: false,
            deleting: false,
        }
    }

    #[test]
    fn enforced_grants_immediately() {
        let action = decide(input(MaintenancePolicy::Enforced, MaintenanceState::Pending));
        assert_eq!(action, ArbiterAction::Grant);
    }

    #[test]
    fn owner_approval_waits_without_annotation() {
        let action = decide(input(MaintenancePolicy::OwnerApproval, MaintenanceState::Pending));
        assert_eq!(action, ArbiterAction::WaitForApproval);
    }

    #[test]
    fn owner_approval_grants_once_approved() {
        let mut i = input(MaintenancePolicy::OwnerApproval, MaintenanceState::Pending);
        i.approved = true;
        assert_eq!(decide(i), ArbiterAction::Grant);
    }

    #[test]
    fn competing_holder_blocks_either_policy() {
        let mut i = input(MaintenancePolicy::Enforced, MaintenanceState::Pending);
        i.holder_bound_to_other = true;
        assert_eq!(decide(i), ArbiterAction::WaitForCompetingHolder);
    }

    #[test]
    fn completion_releases_bound_holder() {
        let mut i = input(MaintenancePolicy::Enforced, MaintenanceState::Completed);
        i.holder_bound_to_this = true;
        assert_eq!(decide(i), ArbiterAction::Release);
    }

    #[test]
    fn completion_is_noop_for_unrelated_holder() {
        let i = input(MaintenancePolicy::Enforced, MaintenanceState::Completed);
        assert_eq!(decide(i), ArbiterAction::NoOp);
    }

    #[test]
    fn deletion_before_completion_releases() {
        let mut i = input(MaintenancePolicy::Enforced, MaintenanceState::InMaintenance);
        i.holder_bound_to_this = true;
        i.deleting = true;
        assert_eq!(decide(i), ArbiterAction::ReleaseOnDelete);
    }

    #[test]
    fn failed_is_sticky() {
        let action = decide(input(MaintenancePolicy::Enforced, MaintenanceState::Failed));
        assert_eq!(action, ArbiterAction::NoOp);
    }
}
