//! Workflow orchestration for mendflow.
//!
//! `WorkflowService` is the one entry point collaborators call: it resolves
//! the acting user into a principal, runs the pure lifecycle and policy
//! checks from `mendflow-core`, assembles the transition payload, and hands
//! it to the storage seams from `mendflow-db` as a single atomic commit.
//! Notification records are written here; pushing them to a device is the
//! relay's business, never the engine's.

pub mod service;

pub use service::{
    EstimateEdit, EstimateSubmission, EstimateVerdict, NewRequest, WorkflowService,
};
