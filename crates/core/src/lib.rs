pub mod config;
pub mod domain;
pub mod errors;
pub mod fanout;
pub mod ledger;
pub mod lifecycle;
pub mod money;
pub mod photos;
pub mod views;

pub use domain::actor::{AppUser, BranchId, Principal, Role, UserId};
pub use domain::attachment::{
    Attachment, AttachmentId, AttachmentKind, AttachmentUrlResolver, PrefixUrlResolver,
};
pub use domain::estimate::{AttemptDecision, EstimateAttempt, WorkerSnapshot};
pub use domain::notification::{NotificationEvent, NotificationId, NotificationRecord};
pub use domain::request::{MaintenanceRequest, RequestCategory, RequestId, RequestStatus};
pub use errors::{ErrorKind, WorkflowError};
pub use lifecycle::{ActorRule, RequestAction};
