//! # Error Types
//!
//! Error enums for every layer of the runtime. Wiring calls on [`crate::Graph`]
//! return [`GraphError`] instead of logging and carrying on, so callers can
//! assert on topology correctness. Component bodies return [`ComponentError`].
//!
//! ## Layers
//!
//! - [`QueueError`]: reading past the end of a [`crate::Queue`]
//! - [`ConnectionError`]: non-suspending operations on a [`crate::Connection`]
//! - [`ComponentError`]: failures raised inside, or on behalf of, a component body
//! - [`GraphError`]: wiring and run-time configuration errors
//! - [`ConfigError`]: loading a [`crate::GraphConfig`]

use crate::connection::ConnectionId;
use crate::packet::Packet;
use crate::port::{PortAddress, PortDirection};
use thiserror::Error;

/// Error returned by [`crate::Queue::dequeue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
  /// The queue holds no items.
  #[error("queue is empty")]
  Empty,
}

/// Error returned by the non-suspending connection operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
  /// A bounded connection is at capacity. The rejected packet is handed back.
  #[error("connection {connection} is full (capacity {capacity})")]
  Full {
    /// Connection identifier.
    connection: ConnectionId,
    /// Configured capacity.
    capacity: usize,
    /// The packet that was not enqueued.
    packet: Packet,
  },
  /// An initial-packet connection was loaded a second time.
  #[error("initial packet connection {0} is already loaded")]
  AlreadyLoaded(ConnectionId),
  /// The consumer side reached its terminal status; nothing will read this packet.
  #[error("connection {0} has no live consumer")]
  Disconnected(ConnectionId),
  /// The port has no connection to send into.
  #[error("port {0} is not connected")]
  Unbound(PortAddress),
}

/// Error raised from a component body, or by the port primitives it calls.
#[derive(Debug, Error)]
pub enum ComponentError {
  /// The component never declared a port with this name.
  #[error("component '{component}' has no {direction} port '{port}'")]
  UnknownPort {
    /// Component name.
    component: String,
    /// Requested port name.
    port: String,
    /// Port direction that was looked up.
    direction: PortDirection,
  },
  /// The port is declared but was never wired to a connection.
  #[error("port '{port}' of component '{component}' is not connected")]
  UnboundPort {
    /// Component name.
    component: String,
    /// Port name.
    port: String,
  },
  /// The downstream component is already done; the packet cannot be delivered.
  #[error("port '{port}' of component '{component}' lost its consumer")]
  Disconnected {
    /// Component name.
    component: String,
    /// Port name.
    port: String,
  },
  /// A packet did not carry the payload type the body expected.
  #[error("unexpected payload type on port '{port}', expected {expected}")]
  UnexpectedPayload {
    /// Port name.
    port: String,
    /// Name of the expected Rust type.
    expected: &'static str,
  },
  /// The activation could not be scheduled because the executor is gone.
  #[error("failed to schedule component '{0}'")]
  Spawn(String),
  /// Any other failure reported by user code.
  #[error("{0}")]
  Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ComponentError {
  /// Wraps an arbitrary error raised by user code.
  pub fn other<E>(err: E) -> Self
  where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
  {
    Self::Other(err.into())
  }
}

/// Error returned by the wiring and run operations of [`crate::Graph`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  /// `run` has started; the topology can no longer change.
  #[error("graph '{0}' is sealed: topology cannot change once run has started")]
  Sealed(String),
  /// The component did not declare a port with this name.
  #[error("component '{component}' has no {direction} port '{port}'")]
  UnknownPort {
    /// Component name.
    component: String,
    /// Requested port name.
    port: String,
    /// Direction that was looked up.
    direction: PortDirection,
  },
  /// The output port already feeds a connection. Fan-out is not supported.
  #[error("cannot connect output port '{port}' of '{component}' to multiple input ports")]
  OutputAlreadyBound {
    /// Component name.
    component: String,
    /// Output port name.
    port: String,
  },
  /// The input port is already bound to a different connection.
  #[error("input port '{port}' of '{component}' is already bound")]
  InputAlreadyBound {
    /// Component name.
    component: String,
    /// Input port name.
    port: String,
  },
  /// A capacity of zero can never accept a packet.
  #[error("connection capacity must be at least 1")]
  InvalidCapacity,
  /// `initialize` was called without any seed value.
  #[error("no seed values given for component '{0}'")]
  EmptySeeds(String),
  /// A declared input port was never wired before `run`.
  #[error("input port '{port}' of '{component}' is not bound")]
  UnboundInput {
    /// Component name.
    component: String,
    /// Input port name.
    port: String,
  },
  /// An initial-packet connection was offered a producer port.
  #[error("initial packet connections have no producer")]
  ProducerOnInitial,
}

/// Error returned when loading a [`crate::GraphConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
  /// The document is not valid JSON for the config shape.
  #[error("invalid graph config: {0}")]
  Parse(#[from] serde_json::Error),
  /// The document parsed but holds an unusable value.
  #[error("invalid graph config value: {0}")]
  Invalid(String),
}
