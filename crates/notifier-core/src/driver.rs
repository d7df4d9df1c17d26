//! Transport seam between a session notification context and the remote
//! session driver.
//!
//! The notifier never speaks a wire format directly: a [`DriverConnector`]
//! opens a [`DriverClient`] for a driver address, and every
//! [`NotificationCall`] becomes exactly one [`DriverClient::invoke`].

use async_trait::async_trait;

use crate::calls::NotificationCall;
use crate::errors::TransportError;
use crate::ids::HostPort;

/// Opens connections to session drivers.
#[async_trait]
pub trait DriverConnector: Send + Sync {
    async fn connect(&self, address: &HostPort) -> Result<Box<dyn DriverClient>, TransportError>;
}

/// An open connection to one session driver.
#[async_trait]
pub trait DriverClient: Send {
    /// Deliver one call and wait for the driver's acknowledgement.
    async fn invoke(&mut self, call: &NotificationCall) -> Result<(), TransportError>;

    /// Release the underlying connection. Must tolerate repeated calls.
    async fn close(&mut self);
}
