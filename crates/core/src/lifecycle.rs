//! The status state machine: one central transition table plus the actor
//! rule attached to each action. Everything that moves a request between
//! states goes through `target`/`authorize`; nothing else in the codebase is
//! allowed to encode lifecycle knowledge.

use serde::{Deserialize, Serialize};

use crate::domain::actor::{Principal, Role};
use crate::domain::request::{MaintenanceRequest, RequestStatus};
use crate::errors::WorkflowError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestAction {
    Submit,
    RejectRequest,
    AssignVendor,
    SubmitEstimate,
    ApproveEstimate,
    RejectEstimate,
    ReopenEstimate,
    Complete,
}

impl RequestAction {
    pub const ALL: [RequestAction; 8] = [
        RequestAction::Submit,
        RequestAction::RejectRequest,
        RequestAction::AssignVendor,
        RequestAction::SubmitEstimate,
        RequestAction::ApproveEstimate,
        RequestAction::RejectEstimate,
        RequestAction::ReopenEstimate,
        RequestAction::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::RejectRequest => "reject_request",
            Self::AssignVendor => "assign_vendor",
            Self::SubmitEstimate => "submit_estimate",
            Self::ApproveEstimate => "approve_estimate",
            Self::RejectEstimate => "reject_estimate",
            Self::ReopenEstimate => "reopen_estimate",
            Self::Complete => "complete",
        }
    }
}

/// Who may perform an action. Ownership rules are resolved against the
/// request, role rules against the principal alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActorRule {
    /// The Branch user who created the request.
    RequestOwner,
    Hq,
    AssignedVendor,
    /// The resubmission edge: either side may reopen estimation.
    AssignedVendorOrHq,
}

pub fn required_actor(action: RequestAction) -> ActorRule {
    match action {
        RequestAction::Submit => ActorRule::RequestOwner,
        RequestAction::RejectRequest
        | RequestAction::AssignVendor
        | RequestAction::ApproveEstimate
        | RequestAction::RejectEstimate => ActorRule::Hq,
        RequestAction::SubmitEstimate | RequestAction::Complete => ActorRule::AssignedVendor,
        RequestAction::ReopenEstimate => ActorRule::AssignedVendorOrHq,
    }
}

/// The single source of truth for legal transitions. Returns the state the
/// action lands on, or `None` when the pair is not in the table.
pub fn target(from: RequestStatus, action: RequestAction) -> Option<RequestStatus> {
    match (from, action) {
        (RequestStatus::Draft, RequestAction::Submit) => Some(RequestStatus::Requested),
        (RequestStatus::RequestRejected, RequestAction::Submit) => Some(RequestStatus::Requested),
        (RequestStatus::Requested, RequestAction::RejectRequest) => {
            Some(RequestStatus::RequestRejected)
        }
        (RequestStatus::Requested, RequestAction::AssignVendor) => Some(RequestStatus::Estimating),
        (RequestStatus::Estimating, RequestAction::SubmitEstimate) => {
            Some(RequestStatus::ApprovalPending)
        }
        (RequestStatus::ApprovalPending, RequestAction::ApproveEstimate) => {
            Some(RequestStatus::InProgress)
        }
        (RequestStatus::ApprovalPending, RequestAction::RejectEstimate) => {
            Some(RequestStatus::EstimateRejected)
        }
        (RequestStatus::EstimateRejected, RequestAction::ReopenEstimate) => {
            Some(RequestStatus::Estimating)
        }
        (RequestStatus::InProgress, RequestAction::Complete) => Some(RequestStatus::Completed),
        _ => None,
    }
}

pub fn authorize(
    request: &MaintenanceRequest,
    actor: &Principal,
    action: RequestAction,
) -> Result<(), WorkflowError> {
    let allowed = match required_actor(action) {
        ActorRule::RequestOwner => {
            actor.role == Role::Branch && actor.user_id == request.requester_id
        }
        ActorRule::Hq => actor.role == Role::Hq,
        ActorRule::AssignedVendor => {
            actor.role == Role::Vendor && request.is_assigned_to(&actor.user_id)
        }
        ActorRule::AssignedVendorOrHq => {
            actor.role == Role::Hq
                || (actor.role == Role::Vendor && request.is_assigned_to(&actor.user_id))
        }
    };

    if allowed {
        return Ok(());
    }

    let requirement = match required_actor(action) {
        ActorRule::RequestOwner => "the request's original Branch requester",
        ActorRule::Hq => "an HQ user",
        ActorRule::AssignedVendor => "the assigned vendor",
        ActorRule::AssignedVendorOrHq => "the assigned vendor or an HQ user",
    };
    Err(WorkflowError::permission(format!("{} requires {requirement}", action.as_str())))
}

/// Permission check first, then table legality: an unauthorized caller
/// learns nothing about the request's current state.
pub fn advance(
    request: &MaintenanceRequest,
    actor: &Principal,
    action: RequestAction,
) -> Result<RequestStatus, WorkflowError> {
    authorize(request, actor, action)?;
    target(request.status, action)
        .ok_or(WorkflowError::InvalidTransition { from: request.status, action })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::actor::{BranchId, Principal, Role, UserId};
    use crate::domain::request::{
        MaintenanceRequest, RequestCategory, RequestId, RequestStatus,
    };
    use crate::errors::WorkflowError;

    use super::{advance, authorize, target, RequestAction};

    const EDGES: [(RequestStatus, RequestAction, RequestStatus); 9] = [
        (RequestStatus::Draft, RequestAction::Submit, RequestStatus::Requested),
        (RequestStatus::RequestRejected, RequestAction::Submit, RequestStatus::Requested),
        (RequestStatus::Requested, RequestAction::RejectRequest, RequestStatus::RequestRejected),
        (RequestStatus::Requested, RequestAction::AssignVendor, RequestStatus::Estimating),
        (RequestStatus::Estimating, RequestAction::SubmitEstimate, RequestStatus::ApprovalPending),
        (RequestStatus::ApprovalPending, RequestAction::ApproveEstimate, RequestStatus::InProgress),
        (
            RequestStatus::ApprovalPending,
            RequestAction::RejectEstimate,
            RequestStatus::EstimateRejected,
        ),
        (RequestStatus::EstimateRejected, RequestAction::ReopenEstimate, RequestStatus::Estimating),
        (RequestStatus::InProgress, RequestAction::Complete, RequestStatus::Completed),
    ];

    fn request(status: RequestStatus) -> MaintenanceRequest {
        let now = Utc::now();
        MaintenanceRequest {
            id: RequestId("r-1".to_string()),
            branch_id: BranchId("b-001".to_string()),
            requester_id: UserId("u-branch-1".to_string()),
            vendor_id: Some(UserId("u-vendor-1".to_string())),
            approver_id: None,
            title: "Leaking sink".to_string(),
            description: "Water pooling under the break-room sink".to_string(),
            category: RequestCategory::Plumbing,
            status,
            resubmit_count: 0,
            request_reject_reason: None,
            estimate_reject_reason: None,
            approved_at: None,
            result_comment: None,
            completed_at: None,
            revision: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn branch_owner() -> Principal {
        Principal {
            user_id: UserId("u-branch-1".to_string()),
            role: Role::Branch,
            branch_id: Some(BranchId("b-001".to_string())),
        }
    }

    fn hq_user() -> Principal {
        Principal { user_id: UserId("u-hq-1".to_string()), role: Role::Hq, branch_id: None }
    }

    fn assigned_vendor() -> Principal {
        Principal { user_id: UserId("u-vendor-1".to_string()), role: Role::Vendor, branch_id: None }
    }

    fn other_vendor() -> Principal {
        Principal { user_id: UserId("u-vendor-2".to_string()), role: Role::Vendor, branch_id: None }
    }

    #[test]
    fn transition_table_matches_the_edge_set_for_every_pair() {
        for from in RequestStatus::ALL {
            for action in RequestAction::ALL {
                let expected = EDGES
                    .iter()
                    .find(|(edge_from, edge_action, _)| *edge_from == from && *edge_action == action)
                    .map(|(_, _, to)| *to);
                assert_eq!(target(from, action), expected, "({from:?}, {action:?})");
            }
        }
    }

    #[test]
    fn completed_has_no_outgoing_edges() {
        for action in RequestAction::ALL {
            assert_eq!(target(RequestStatus::Completed, action), None);
        }
    }

    #[test]
    fn every_edge_target_stays_inside_the_state_set() {
        for (_, _, to) in EDGES {
            assert!(RequestStatus::ALL.contains(&to));
        }
    }

    #[test]
    fn owner_may_submit_but_other_branch_users_may_not() {
        let request = request(RequestStatus::Draft);
        authorize(&request, &branch_owner(), RequestAction::Submit).expect("owner submits");

        let stranger = Principal {
            user_id: UserId("u-branch-9".to_string()),
            role: Role::Branch,
            branch_id: Some(BranchId("b-001".to_string())),
        };
        let error = authorize(&request, &stranger, RequestAction::Submit)
            .expect_err("non-owner submit should fail");
        assert!(matches!(error, WorkflowError::PermissionDenied(_)));
    }

    #[test]
    fn hq_actions_reject_branch_and_vendor_actors() {
        let request = request(RequestStatus::Requested);
        for action in [RequestAction::RejectRequest, RequestAction::AssignVendor] {
            authorize(&request, &hq_user(), action).expect("hq acts");
            for actor in [branch_owner(), assigned_vendor()] {
                let error =
                    authorize(&request, &actor, action).expect_err("non-hq actor should fail");
                assert!(matches!(error, WorkflowError::PermissionDenied(_)));
            }
        }
    }

    #[test]
    fn vendor_actions_require_the_assigned_vendor() {
        let request = request(RequestStatus::Estimating);
        authorize(&request, &assigned_vendor(), RequestAction::SubmitEstimate)
            .expect("assigned vendor submits estimate");

        let error = authorize(&request, &other_vendor(), RequestAction::SubmitEstimate)
            .expect_err("unassigned vendor should fail");
        assert!(matches!(error, WorkflowError::PermissionDenied(_)));
    }

    #[test]
    fn vendor_actions_fail_before_assignment_exists() {
        let mut request = request(RequestStatus::Draft);
        request.vendor_id = None;

        let error = authorize(&request, &other_vendor(), RequestAction::SubmitEstimate)
            .expect_err("no assigned vendor yet");
        assert!(matches!(error, WorkflowError::PermissionDenied(_)));
    }

    #[test]
    fn reopen_accepts_either_hq_or_the_assigned_vendor() {
        let request = request(RequestStatus::EstimateRejected);
        authorize(&request, &hq_user(), RequestAction::ReopenEstimate).expect("hq reopens");
        authorize(&request, &assigned_vendor(), RequestAction::ReopenEstimate)
            .expect("assigned vendor reopens");

        let error = authorize(&request, &branch_owner(), RequestAction::ReopenEstimate)
            .expect_err("branch cannot reopen");
        assert!(matches!(error, WorkflowError::PermissionDenied(_)));
    }

    #[test]
    fn advance_applies_legal_edges() {
        let request = request(RequestStatus::ApprovalPending);
        let next = advance(&request, &hq_user(), RequestAction::ApproveEstimate)
            .expect("approval advances");
        assert_eq!(next, RequestStatus::InProgress);
    }

    #[test]
    fn advance_reports_permission_before_table_legality() {
        // A vendor probing an HQ action on a draft gets PermissionDenied,
        // not a hint about what transitions exist.
        let request = request(RequestStatus::Draft);
        let error = advance(&request, &assigned_vendor(), RequestAction::ApproveEstimate)
            .expect_err("vendor cannot approve");
        assert!(matches!(error, WorkflowError::PermissionDenied(_)));

        let error = advance(&request, &hq_user(), RequestAction::ApproveEstimate)
            .expect_err("draft cannot be approved");
        assert!(matches!(
            error,
            WorkflowError::InvalidTransition { from: RequestStatus::Draft, .. }
        ));
    }
}
