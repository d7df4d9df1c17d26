//! # notifier-engine
//!
//! Asynchronous delivery of session notifications.
//!
//! [`SessionNotifier`] accepts grant/revoke/dead-node notifications from any
//! thread without blocking, routes each session to one [`NotifierWorker`]
//! through the [`ShardRouter`], and the worker flushes the session's
//! [`SessionNotificationContext`] in enqueue order. When a context runs out
//! of retries the worker asks the cluster manager to end the session.

#![deny(unsafe_code)]

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod mock;
pub mod retry;
pub mod router;
pub mod worker;

pub use context::SessionNotificationContext;
pub use dispatcher::SessionNotifier;
pub use error::NotifierError;
pub use retry::RetryPolicy;
pub use router::ShardRouter;
pub use worker::NotifierWorker;
