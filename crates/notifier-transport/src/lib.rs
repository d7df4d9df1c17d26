//! # notifier-transport
//!
//! Line-delimited JSON transport between the notifier and session drivers.
//!
//! - [`client::TcpDriverConnector`] implements the core `DriverConnector`
//!   seam and hands out one [`client::TcpDriverClient`] per connection
//! - [`server::DriverServer`] is the session-driver side: it decodes
//!   requests and forwards them to a [`server::SessionDriverHandler`]
//! - [`wire`] holds the request/response frames

#![deny(unsafe_code)]

pub mod client;
pub mod server;
pub mod wire;

pub use client::{TcpDriverClient, TcpDriverConnector};
pub use server::{DriverServer, Rejection, SessionDriverHandler};
pub use wire::{RpcError, RpcRequest, RpcResponse};
