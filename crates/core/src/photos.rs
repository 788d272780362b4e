//! Attachment policy: who may attach which kind of photo to a request.
//! Shape checks reject malformed input as `Validation`; every role or
//! ownership mismatch is `PermissionDenied`.

use crate::domain::actor::Principal;
use crate::domain::attachment::AttachmentKind;
use crate::domain::estimate::EstimateAttempt;
use crate::domain::request::MaintenanceRequest;
use crate::errors::WorkflowError;

pub fn parse_kind(raw: &str) -> Result<AttachmentKind, WorkflowError> {
    AttachmentKind::parse(raw)
        .ok_or_else(|| WorkflowError::validation(format!("unknown attachment kind `{raw}`")))
}

/// Structural checks on the attach call itself. Estimate photos must name
/// an attempt (>= 1); request and result photos must not.
pub fn validate_shape(
    file_key: &str,
    kind: AttachmentKind,
    attempt_no: Option<u32>,
) -> Result<(), WorkflowError> {
    if file_key.trim().is_empty() {
        return Err(WorkflowError::validation("file key is required"));
    }

    match (kind, attempt_no) {
        (AttachmentKind::Estimate, None) => {
            Err(WorkflowError::validation("estimate photos must name an attempt"))
        }
        (AttachmentKind::Estimate, Some(0)) => {
            Err(WorkflowError::validation("attempt numbers start at 1"))
        }
        (AttachmentKind::Estimate, Some(_)) => Ok(()),
        (_, Some(_)) => {
            Err(WorkflowError::validation("only estimate photos carry an attempt number"))
        }
        (_, None) => Ok(()),
    }
}

pub fn authorize(
    request: &MaintenanceRequest,
    actor: &Principal,
    kind: AttachmentKind,
) -> Result<(), WorkflowError> {
    match kind {
        AttachmentKind::Request => {
            if actor.branch_id.as_ref() != Some(&request.branch_id) {
                return Err(WorkflowError::permission(
                    "request photos may only be attached by the request's branch",
                ));
            }
        }
        AttachmentKind::Estimate | AttachmentKind::Result => {
            if !request.has_vendor() || !request.is_assigned_to(&actor.user_id) {
                return Err(WorkflowError::permission(
                    "estimate and result photos may only be attached by the assigned vendor",
                ));
            }
        }
    }
    Ok(())
}

/// Estimate photos attach to an attempt that is already on record; the
/// attempt need not be decided yet.
pub fn ensure_attempt_exists(
    attempts: &[EstimateAttempt],
    attempt_no: u32,
) -> Result<(), WorkflowError> {
    if attempts.iter().any(|attempt| attempt.attempt_no == attempt_no) {
        return Ok(());
    }
    Err(WorkflowError::not_found("attempt", attempt_no.to_string()))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use crate::domain::actor::{BranchId, Principal, Role, UserId};
    use crate::domain::attachment::AttachmentKind;
    use crate::domain::estimate::{AttemptDecision, EstimateAttempt};
    use crate::domain::request::{
        MaintenanceRequest, RequestCategory, RequestId, RequestStatus,
    };
    use crate::errors::WorkflowError;

    use super::{authorize, ensure_attempt_exists, parse_kind, validate_shape};

    fn request(vendor: Option<&str>) -> MaintenanceRequest {
        let now = Utc::now();
        MaintenanceRequest {
            id: RequestId("r-1".to_string()),
            branch_id: BranchId("b-1".to_string()),
            requester_id: UserId("branch-user".to_string()),
            vendor_id: vendor.map(|id| UserId(id.to_string())),
            approver_id: None,
            title: "Broken freezer door".to_string(),
            description: "Door no longer seals".to_string(),
            category: RequestCategory::Appliance,
            status: RequestStatus::Estimating,
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

    fn branch_principal(branch: &str) -> Principal {
        Principal {
            user_id: UserId("branch-user".to_string()),
            role: Role::Branch,
            branch_id: Some(BranchId(branch.to_string())),
        }
    }

    fn vendor_principal(id: &str) -> Principal {
        Principal { user_id: UserId(id.to_string()), role: Role::Vendor, branch_id: None }
    }

    fn attempt(no: u32) -> EstimateAttempt {
        let now = Utc::now();
        EstimateAttempt {
            request_id: RequestId("r-1".to_string()),
            attempt_no: no,
            amount: Decimal::new(50_000, 2),
            comment: "replace gasket".to_string(),
            work_start: NaiveDate::from_ymd_opt(2026, 9, 1).expect("valid date"),
            work_end: NaiveDate::from_ymd_opt(2026, 9, 1).expect("valid date"),
            worker: None,
            decision: AttemptDecision::Pending,
            decided_by: None,
            decided_at: None,
            decision_reason: None,
            submitted_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn kind_parsing_rejects_unknown_strings_as_validation() {
        assert_eq!(parse_kind("request").expect("known kind"), AttachmentKind::Request);

        let error = parse_kind("thumbnail").expect_err("unknown kind");
        assert!(matches!(error, WorkflowError::Validation(_)));
    }

    #[test]
    fn blank_file_keys_are_rejected() {
        for key in ["", "   "] {
            let error = validate_shape(key, AttachmentKind::Request, None)
                .expect_err("blank key rejected");
            assert!(matches!(error, WorkflowError::Validation(_)));
        }
    }

    #[test]
    fn attempt_number_presence_follows_the_kind() {
        validate_shape("k.jpg", AttachmentKind::Estimate, Some(1)).expect("estimate with attempt");
        validate_shape("k.jpg", AttachmentKind::Request, None).expect("request without attempt");
        validate_shape("k.jpg", AttachmentKind::Result, None).expect("result without attempt");

        assert!(validate_shape("k.jpg", AttachmentKind::Estimate, None).is_err());
        assert!(validate_shape("k.jpg", AttachmentKind::Estimate, Some(0)).is_err());
        assert!(validate_shape("k.jpg", AttachmentKind::Request, Some(1)).is_err());
        assert!(validate_shape("k.jpg", AttachmentKind::Result, Some(2)).is_err());
    }

    #[test]
    fn request_photos_require_the_same_branch() {
        let request = request(None);

        authorize(&request, &branch_principal("b-1"), AttachmentKind::Request)
            .expect("same branch may attach");

        let error = authorize(&request, &branch_principal("b-2"), AttachmentKind::Request)
            .expect_err("other branch denied");
        assert!(matches!(error, WorkflowError::PermissionDenied(_)));

        // HQ and vendors carry no branch, so the same gate denies them.
        let error = authorize(&request, &vendor_principal("vendor-1"), AttachmentKind::Request)
            .expect_err("vendor denied request photos");
        assert!(matches!(error, WorkflowError::PermissionDenied(_)));
    }

    #[test]
    fn estimate_photos_require_the_assigned_vendor() {
        let unassigned = request(None);
        let error =
            authorize(&unassigned, &vendor_principal("vendor-1"), AttachmentKind::Estimate)
                .expect_err("no vendor assigned");
        assert!(matches!(error, WorkflowError::PermissionDenied(_)));

        let assigned = request(Some("vendor-1"));
        authorize(&assigned, &vendor_principal("vendor-1"), AttachmentKind::Estimate)
            .expect("assigned vendor may attach");

        let error = authorize(&assigned, &vendor_principal("vendor-2"), AttachmentKind::Estimate)
            .expect_err("other vendor denied");
        assert!(matches!(error, WorkflowError::PermissionDenied(_)));
    }

    #[test]
    fn result_photos_require_the_assigned_vendor() {
        let assigned = request(Some("vendor-1"));

        authorize(&assigned, &vendor_principal("vendor-1"), AttachmentKind::Result)
            .expect("assigned vendor may attach");

        let error = authorize(&assigned, &branch_principal("b-1"), AttachmentKind::Result)
            .expect_err("branch denied result photos");
        assert!(matches!(error, WorkflowError::PermissionDenied(_)));
    }

    #[test]
    fn estimate_photos_need_an_existing_attempt() {
        let attempts = vec![attempt(1), attempt(2)];

        ensure_attempt_exists(&attempts, 2).expect("stored attempt");

        let error = ensure_attempt_exists(&attempts, 3).expect_err("unknown attempt");
        assert!(matches!(error, WorkflowError::NotFound { .. }));
    }
}
