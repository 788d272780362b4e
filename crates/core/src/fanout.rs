//! Recipient fan-out for workflow notifications. Given a committed
//! transition (or a pending-estimate edit) this module decides who gets a
//! record and with which dedup event; it never touches storage or delivery.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::domain::actor::UserId;
use crate::domain::notification::{NotificationEvent, NotificationRecord};
use crate::domain::request::{MaintenanceRequest, RequestId, RequestStatus};

/// One computed fan-out: the ordered recipient set, the event that keys
/// dedup, and the message body every recipient shares.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FanoutPlan {
    pub request_id: RequestId,
    pub recipients: Vec<UserId>,
    pub event: NotificationEvent,
    pub message: String,
}

impl FanoutPlan {
    /// One record per recipient. Records are inserted independently and
    /// idempotently downstream; a recipient already holding this dedup key
    /// keeps their existing record.
    pub fn records(&self, now: DateTime<Utc>) -> Vec<NotificationRecord> {
        self.recipients
            .iter()
            .map(|recipient| {
                NotificationRecord::new(
                    recipient.clone(),
                    self.request_id.clone(),
                    self.event,
                    self.message.clone(),
                    now,
                )
            })
            .collect()
    }
}

/// Recipient rules for a status change. Edges outside the four notifying
/// ones (rejections, completion, the reopen edge) produce no plan.
pub fn status_change(
    request: &MaintenanceRequest,
    before: RequestStatus,
    after: RequestStatus,
    hq_users: &[UserId],
) -> Option<FanoutPlan> {
    let recipients = match (before, after) {
        // Every path into REQUESTED alerts HQ, first submission and
        // resubmission alike.
        (_, RequestStatus::Requested) => hq_users.to_vec(),
        (RequestStatus::Estimating, RequestStatus::ApprovalPending) => {
            let mut recipients = hq_users.to_vec();
            recipients.push(request.requester_id.clone());
            recipients
        }
        (RequestStatus::ApprovalPending, RequestStatus::InProgress) => {
            let mut recipients: Vec<UserId> = request.vendor_id.iter().cloned().collect();
            recipients.push(request.requester_id.clone());
            recipients
        }
        (RequestStatus::Requested, RequestStatus::Estimating) => {
            request.vendor_id.iter().cloned().collect()
        }
        _ => return None,
    };

    let recipients = dedup_ordered(recipients);
    if recipients.is_empty() {
        return None;
    }

    Some(FanoutPlan {
        request_id: request.id.clone(),
        recipients,
        event: NotificationEvent::StatusChanged { status: after },
        message: format!("Request \"{}\" is now: {}.", request.title, after.label()),
    })
}

/// Re-alert for an edited pending estimate. The event carries the edit time
/// truncated to whole seconds, so edits within one second collapse while a
/// later edit notifies again.
pub fn estimate_updated(
    request: &MaintenanceRequest,
    hq_users: &[UserId],
    edited_at: DateTime<Utc>,
) -> FanoutPlan {
    let mut recipients = vec![request.requester_id.clone()];
    recipients.extend(hq_users.iter().cloned());

    FanoutPlan {
        request_id: request.id.clone(),
        recipients: dedup_ordered(recipients),
        event: NotificationEvent::EstimateUpdated { bucket_secs: edited_at.timestamp() },
        message: format!("The estimate for request \"{}\" was revised.", request.title),
    }
}

/// A user reached through two rules gets one record. First appearance wins.
fn dedup_ordered(recipients: Vec<UserId>) -> Vec<UserId> {
    let mut seen = HashSet::new();
    recipients.into_iter().filter(|recipient| seen.insert(recipient.clone())).collect()
}
