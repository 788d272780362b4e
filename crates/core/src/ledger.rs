//! Pure rules for the estimate-attempt ledger: numbering, the
//! single-pending invariant, and decision guards. The repositories execute
//! these decisions; they never re-derive them.

use chrono::NaiveDate;

use crate::domain::estimate::{AttemptDecision, EstimateAttempt};
use crate::errors::WorkflowError;

/// Attempt numbers start at 1 and grow by exactly one per submission.
pub fn next_attempt_no(attempts: &[EstimateAttempt]) -> u32 {
    attempts.iter().map(|attempt| attempt.attempt_no).max().unwrap_or(0) + 1
}

pub fn latest(attempts: &[EstimateAttempt]) -> Option<&EstimateAttempt> {
    attempts.iter().max_by_key(|attempt| attempt.attempt_no)
}

pub fn latest_approved(attempts: &[EstimateAttempt]) -> Option<&EstimateAttempt> {
    attempts
        .iter()
        .filter(|attempt| attempt.decision == AttemptDecision::Approved)
        .max_by_key(|attempt| attempt.attempt_no)
}

pub fn pending(attempts: &[EstimateAttempt]) -> Option<&EstimateAttempt> {
    attempts.iter().find(|attempt| attempt.is_pending())
}

pub fn validate_work_dates(start: NaiveDate, end: NaiveDate) -> Result<(), WorkflowError> {
    if start > end {
        return Err(WorkflowError::validation(format!(
            "work start {start} must not be after work end {end}"
        )));
    }
    Ok(())
}

/// Guard for `decide`: the named attempt must exist and be the PENDING one.
/// A decided attempt is immutable; re-deciding it is a lifecycle fault, not
/// bad input.
pub fn ensure_decidable<'a>(
    attempts: &'a [EstimateAttempt],
    attempt_no: u32,
) -> Result<&'a EstimateAttempt, WorkflowError> {
    let attempt = attempts
        .iter()
        .find(|attempt| attempt.attempt_no == attempt_no)
        .ok_or_else(|| WorkflowError::not_found("attempt", attempt_no.to_string()))?;

    if !attempt.is_pending() {
        return Err(WorkflowError::AttemptNotPending {
            request_id: attempt.request_id.0.clone(),
            attempt_no,
        });
    }

    Ok(attempt)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use crate::domain::estimate::{AttemptDecision, EstimateAttempt};
    use crate::domain::request::RequestId;
    use crate::errors::WorkflowError;

    use super::{
        ensure_decidable, latest, latest_approved, next_attempt_no, pending, validate_work_dates,
    };

    fn attempt(no: u32, decision: AttemptDecision) -> EstimateAttempt {
        let now = Utc::now();
        EstimateAttempt {
            request_id: RequestId("r-1".to_string()),
            attempt_no: no,
            amount: Decimal::new(1_200_000, 2),
            comment: "parts and labor".to_string(),
            work_start: NaiveDate::from_ymd_opt(2026, 9, 1).expect("valid date"),
            work_end: NaiveDate::from_ymd_opt(2026, 9, 3).expect("valid date"),
            worker: None,
            decision,
            decided_by: None,
            decided_at: None,
            decision_reason: None,
            submitted_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn numbering_starts_at_one_and_increments() {
        assert_eq!(next_attempt_no(&[]), 1);

        let attempts =
            vec![attempt(1, AttemptDecision::Rejected), attempt(2, AttemptDecision::Pending)];
        assert_eq!(next_attempt_no(&attempts), 3);
    }

    #[test]
    fn latest_picks_the_highest_attempt_no() {
        let attempts =
            vec![attempt(2, AttemptDecision::Pending), attempt(1, AttemptDecision::Rejected)];
        assert_eq!(latest(&attempts).map(|found| found.attempt_no), Some(2));
        assert_eq!(latest(&[]), None);
    }

    #[test]
    fn latest_approved_ignores_pending_and_rejected_attempts() {
        let attempts = vec![
            attempt(1, AttemptDecision::Approved),
            attempt(2, AttemptDecision::Rejected),
            attempt(3, AttemptDecision::Pending),
        ];
        assert_eq!(latest_approved(&attempts).map(|found| found.attempt_no), Some(1));

        let undecided = vec![attempt(1, AttemptDecision::Pending)];
        assert_eq!(latest_approved(&undecided), None);
    }

    #[test]
    fn pending_finds_the_single_open_attempt() {
        let attempts =
            vec![attempt(1, AttemptDecision::Rejected), attempt(2, AttemptDecision::Pending)];
        assert_eq!(pending(&attempts).map(|found| found.attempt_no), Some(2));
    }

    #[test]
    fn work_dates_must_be_ordered() {
        let start = NaiveDate::from_ymd_opt(2026, 9, 3).expect("valid date");
        let end = NaiveDate::from_ymd_opt(2026, 9, 1).expect("valid date");

        let error = validate_work_dates(start, end).expect_err("inverted range should fail");
        assert!(matches!(error, WorkflowError::Validation(_)));

        validate_work_dates(end, start).expect("ordered range passes");
        validate_work_dates(start, start).expect("single-day range passes");
    }

    #[test]
    fn decide_guard_rejects_missing_and_decided_attempts() {
        let attempts =
            vec![attempt(1, AttemptDecision::Rejected), attempt(2, AttemptDecision::Pending)];

        ensure_decidable(&attempts, 2).expect("pending attempt is decidable");

        let error = ensure_decidable(&attempts, 3).expect_err("unknown attempt");
        assert!(matches!(error, WorkflowError::NotFound { .. }));

        let error = ensure_decidable(&attempts, 1).expect_err("already decided");
        assert!(matches!(error, WorkflowError::AttemptNotPending { attempt_no: 1, .. }));
    }
}
