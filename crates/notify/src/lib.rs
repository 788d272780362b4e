//! Push delivery for mendflow notifications.
//!
//! The in-app notification rows double as a push outbox: the workflow engine
//! writes them inside each lifecycle transition and this crate drains the
//! undelivered ones to the outside world.
//!
//! - **Transports** (`transport`) - where a push goes. `WebhookTransport`
//!   posts JSON to a configured endpoint; `NoopTransport` swallows pushes
//!   when the feature is configured off.
//! - **Relay** (`relay`) - the polling loop that fetches undelivered
//!   records, hands each to the transport, and stamps `delivered_at`.
//!
//! Delivery is at-least-once. A record is stamped only after the transport
//! accepts it, so a crash between accept and stamp replays the push on
//! restart; receivers dedup replays on `notification_id`.

pub mod relay;
pub mod transport;

pub use relay::{DrainOutcome, PushRelay, RetryPolicy};
pub use transport::{NoopTransport, PushMessage, PushTransport, TransportError, WebhookTransport};
