//! # notifier-core
//!
//! Shared vocabulary for the session notifier.
//!
//! - **Identifiers**: [`ids::SessionHandle`] and [`ids::HostPort`]
//! - **Calls**: [`calls::NotificationCall`], the closed set of notifications a
//!   session driver can receive, plus [`calls::ResourceGrant`]
//! - **Collaborators**: [`session::SessionRegistry`], [`session::ClusterManager`],
//!   [`session::NotifierMetrics`] and the driver transport traits in [`driver`]
//! - **Errors**: [`errors`] hierarchy via `thiserror`
//! - **Settings**: [`settings::NotifierSettings`] with file and env layering
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by every other notifier crate.

#![deny(unsafe_code)]

pub mod calls;
pub mod driver;
pub mod errors;
pub mod ids;
pub mod session;
pub mod settings;

pub use calls::{NotificationCall, ResourceGrant, ResourceType};
pub use driver::{DriverClient, DriverConnector};
pub use errors::{ClusterManagerError, HandleError, SessionLookupError, SettingsError, TransportError};
pub use ids::{HostPort, SessionHandle};
pub use session::{
    ClusterManager, NoopMetrics, NotifierMetrics, SessionInfo, SessionRegistry, SessionStatus,
    StaticSessionRegistry,
};
pub use settings::{NotifierSettings, RetrySettings, TransportSettings};
