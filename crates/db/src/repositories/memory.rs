use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use mendflow_core::domain::actor::{AppUser, BranchId, Role, UserId};
use mendflow_core::domain::attachment::Attachment;
use mendflow_core::domain::estimate::{AttemptDecision, EstimateAttempt};
use mendflow_core::domain::notification::{NotificationId, NotificationRecord};
use mendflow_core::domain::request::{MaintenanceRequest, RequestId};

use super::{
    AttachmentStore, AttemptContentPatch, EstimateStore, NotificationStore, RepositoryError,
    RequestStore, TransitionWrite, UserStore,
};

/// One in-memory store behind every trait. The workflow's atomic unit spans
/// the request row and its attempt ledger, so the state lives under a single
/// lock rather than one per table.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    state: RwLock<WorkflowState>,
}

#[derive(Default)]
struct WorkflowState {
    users: HashMap<String, AppUser>,
    requests: HashMap<String, MaintenanceRequest>,
    attempts: HashMap<String, Vec<EstimateAttempt>>,
    attachments: Vec<Attachment>,
    notifications: Vec<NotificationRecord>,
}

impl WorkflowState {
    /// Mirrors the SQL unique-key skip: a record whose (recipient, request,
    /// dedup key) already exists is dropped, and that counts as success.
    fn push_if_new(&mut self, record: &NotificationRecord) -> bool {
        let duplicate = self.notifications.iter().any(|existing| {
            existing.recipient_id == record.recipient_id
                && existing.request_id == record.request_id
                && existing.dedup_key() == record.dedup_key()
        });
        if duplicate {
            return false;
        }

        self.notifications.push(record.clone());
        true
    }
}

#[async_trait::async_trait]
impl RequestStore for InMemoryWorkflowStore {
    async fn insert(
        &self,
        request: &MaintenanceRequest,
        notifications: &[NotificationRecord],
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.requests.insert(request.id.0.clone(), request.clone());
        for record in notifications {
            state.push_if_new(record);
        }
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<MaintenanceRequest>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.requests.get(&id.0).cloned())
    }

    async fn commit_transition(&self, write: TransitionWrite) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let request_id = write.request.id.0.clone();

        match state.requests.get(&request_id) {
            Some(stored) if stored.revision == write.expected_revision => {}
            _ => return Err(RepositoryError::StaleRevision { request_id }),
        }

        if let Some(decision) = &write.decide_attempt {
            let pending = state
                .attempts
                .get_mut(&request_id)
                .and_then(|attempts| {
                    attempts
                        .iter_mut()
                        .find(|attempt| {
                            attempt.attempt_no == decision.attempt_no && attempt.is_pending()
                        })
                });
            match pending {
                Some(attempt) => {
                    attempt.decision = decision.decision;
                    attempt.decided_by = Some(decision.decided_by.clone());
                    attempt.decided_at = Some(decision.decided_at);
                    attempt.decision_reason = decision.decision_reason.clone();
                    attempt.updated_at = decision.decided_at;
                }
                None => {
                    return Err(RepositoryError::AttemptNotPending {
                        request_id,
                        attempt_no: decision.attempt_no,
                    })
                }
            }
        }

        if let Some(attempt) = write.new_attempt {
            state.attempts.entry(request_id.clone()).or_default().push(attempt);
        }

        state.attachments.extend(write.attachments);

        for record in &write.notifications {
            state.push_if_new(record);
        }

        state.requests.insert(request_id, write.request);
        Ok(())
    }

    async fn list_for_branch(
        &self,
        branch_id: &BranchId,
    ) -> Result<Vec<MaintenanceRequest>, RepositoryError> {
        let state = self.state.read().await;
        Ok(sorted_requests(
            state.requests.values().filter(|request| &request.branch_id == branch_id),
        ))
    }

    async fn list_for_vendor(
        &self,
        vendor_id: &UserId,
    ) -> Result<Vec<MaintenanceRequest>, RepositoryError> {
        let state = self.state.read().await;
        Ok(sorted_requests(
            state.requests.values().filter(|request| request.is_assigned_to(vendor_id)),
        ))
    }

    async fn list_all(&self) -> Result<Vec<MaintenanceRequest>, RepositoryError> {
        let state = self.state.read().await;
        Ok(sorted_requests(state.requests.values()))
    }
}

#[async_trait::async_trait]
impl EstimateStore for InMemoryWorkflowStore {
    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<EstimateAttempt>, RepositoryError> {
        let state = self.state.read().await;
        let mut attempts = state.attempts.get(&request_id.0).cloned().unwrap_or_default();
        attempts.sort_by_key(|attempt| attempt.attempt_no);
        Ok(attempts)
    }

    async fn find_attempt(
        &self,
        request_id: &RequestId,
        attempt_no: u32,
    ) -> Result<Option<EstimateAttempt>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .attempts
            .get(&request_id.0)
            .and_then(|attempts| {
                attempts.iter().find(|attempt| attempt.attempt_no == attempt_no)
            })
            .cloned())
    }

    async fn update_pending_content(
        &self,
        request_id: &RequestId,
        attempt_no: u32,
        patch: AttemptContentPatch,
        notifications: &[NotificationRecord],
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let pending = state.attempts.get_mut(&request_id.0).and_then(|attempts| {
            attempts
                .iter_mut()
                .find(|attempt| attempt.attempt_no == attempt_no && attempt.is_pending())
        });

        match pending {
            Some(attempt) => {
                attempt.amount = patch.amount;
                attempt.comment = patch.comment;
                attempt.work_start = patch.work_start;
                attempt.work_end = patch.work_end;
                attempt.worker = patch.worker;
                attempt.updated_at = patch.updated_at;
            }
            None => {
                return Err(RepositoryError::AttemptNotPending {
                    request_id: request_id.0.clone(),
                    attempt_no,
                })
            }
        }

        for record in notifications {
            state.push_if_new(record);
        }

        Ok(())
    }

    async fn latest_approved(
        &self,
        request_ids: &[RequestId],
    ) -> Result<HashMap<String, EstimateAttempt>, RepositoryError> {
        let state = self.state.read().await;
        let mut approved = HashMap::new();

        for request_id in request_ids {
            let latest = state.attempts.get(&request_id.0).and_then(|attempts| {
                attempts
                    .iter()
                    .filter(|attempt| attempt.decision == AttemptDecision::Approved)
                    .max_by_key(|attempt| attempt.attempt_no)
            });
            if let Some(attempt) = latest {
                approved.insert(request_id.0.clone(), attempt.clone());
            }
        }

        Ok(approved)
    }
}

#[async_trait::async_trait]
impl AttachmentStore for InMemoryWorkflowStore {
    async fn insert(&self, attachment: &Attachment) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.attachments.push(attachment.clone());
        Ok(())
    }

    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<Attachment>, RepositoryError> {
        let state = self.state.read().await;
        let mut attachments: Vec<Attachment> = state
            .attachments
            .iter()
            .filter(|attachment| attachment.request_id == *request_id)
            .cloned()
            .collect();
        attachments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.0.cmp(&b.id.0)));
        Ok(attachments)
    }
}

#[async_trait::async_trait]
impl NotificationStore for InMemoryWorkflowStore {
    async fn insert_if_new(&self, record: &NotificationRecord) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        Ok(state.push_if_new(record))
    }

    async fn list_for_recipient(
        &self,
        recipient_id: &UserId,
        unread_only: bool,
    ) -> Result<Vec<NotificationRecord>, RepositoryError> {
        let state = self.state.read().await;
        let mut records: Vec<NotificationRecord> = state
            .notifications
            .iter()
            .filter(|record| {
                record.recipient_id == *recipient_id && (!unread_only || !record.is_read)
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.0.cmp(&b.id.0)));
        Ok(records)
    }

    async fn mark_read(
        &self,
        id: &NotificationId,
        recipient_id: &UserId,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        let record = state
            .notifications
            .iter_mut()
            .find(|record| record.id == *id && record.recipient_id == *recipient_id);

        match record {
            Some(record) => {
                record.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_undelivered(
        &self,
        limit: u32,
    ) -> Result<Vec<NotificationRecord>, RepositoryError> {
        let state = self.state.read().await;
        let mut records: Vec<NotificationRecord> = state
            .notifications
            .iter()
            .filter(|record| record.delivered_at.is_none())
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.0.cmp(&b.id.0)));
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn mark_delivered(
        &self,
        ids: &[NotificationId],
        delivered_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        for record in state.notifications.iter_mut() {
            if ids.contains(&record.id) && record.delivered_at.is_none() {
                record.delivered_at = Some(delivered_at);
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl UserStore for InMemoryWorkflowStore {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<AppUser>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.users.get(&id.0).cloned())
    }

    async fn save(&self, user: &AppUser) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.users.insert(user.id.0.clone(), user.clone());
        Ok(())
    }

    async fn list_hq_ids(&self) -> Result<Vec<UserId>, RepositoryError> {
        let state = self.state.read().await;
        let mut ids: Vec<UserId> = state
            .users
            .values()
            .filter(|user| user.role == Role::Hq)
            .map(|user| user.id.clone())
            .collect();
        ids.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(ids)
    }
}

fn sorted_requests<'a>(
    requests: impl Iterator<Item = &'a MaintenanceRequest>,
) -> Vec<MaintenanceRequest> {
    let mut requests: Vec<MaintenanceRequest> = requests.cloned().collect();
    requests.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.0.cmp(&b.id.0)));
    requests
}
