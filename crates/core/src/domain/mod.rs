pub mod actor;
pub mod attachment;
pub mod estimate;
pub mod notification;
pub mod request;
