//! # FbpWeave
//!
//! A single-threaded flow-based programming runtime.
//!
//! Programs are graphs of [`Component`]s exchanging [`Packet`]s over bounded
//! [`Connection`]s. A component declares named input and output ports; the
//! [`Graph`] binds them, seeds initial packets, and schedules components
//! cooperatively on one thread. Reads from an empty connection and sends into
//! a full one suspend the calling component until the other side catches up.
//!
//! ## Key Concepts
//!
//! - **Packet**: an immutable, type-erased value with a unique id
//! - **Connection**: a FIFO between one output port and one input port, with
//!   an optional capacity that applies backpressure
//! - **Initial packet connection**: a one-shot connection seeded by
//!   [`Graph::initialize`] before the run starts
//! - **Starter**: a component fed only by initial packets; `run` activates
//!   starters, and everything else is activated by arriving packets
//!
//! ## Quick Start
//!
//! ```rust
//! use fbpweave::{Component, Graph, Seeds};
//!
//! let counter = Component::builder("counter")
//!   .input("length")
//!   .output("out")
//!   .build(|ctx| async move {
//!     let length = ctx.read_value::<u32>("length").await?.unwrap_or(0);
//!     for n in 0..length {
//!       ctx.send("out", n).await?;
//!     }
//!     Ok(())
//!   });
//! let printer = Component::builder("printer")
//!   .input("in")
//!   .build(|ctx| async move {
//!     while let Some(n) = ctx.read_value::<u32>("in").await? {
//!       println!("{n}");
//!     }
//!     Ok(())
//!   });
//!
//! let mut graph = Graph::new("count");
//! graph.initialize(&counter, Seeds::new().with("length", 3u32))?;
//! graph.connect(&counter, "out", &printer, "in", Some(1))?;
//! graph.run(|| println!("done"))?;
//! # Ok::<(), fbpweave::GraphError>(())
//! ```

#![deny(missing_docs)]

/// Components, their status machine, and the context bodies run with.
pub mod component;
/// Graph settings.
pub mod config;
/// Bounded and initial-packet connections.
pub mod connection;
/// Error types.
pub mod error;
mod execution;
/// Graph wiring and execution.
pub mod graph;
/// Type-erased packets.
pub mod packet;
/// Input and output ports.
pub mod port;
/// FIFO queue backing every connection.
pub mod queue;
/// Initial packet sets for `Graph::initialize`.
pub mod seeds;

#[cfg(test)]
mod graph_test;

pub use component::{
  ActivationMode, Component, ComponentBuilder, ComponentContext, ComponentLogic, ComponentStatus,
  ObserverId, StateChange,
};
pub use config::GraphConfig;
pub use connection::{Connection, ConnectionId, ConnectionKind, ReadOutcome};
pub use error::{ComponentError, ConfigError, ConnectionError, GraphError, QueueError};
pub use graph::{Graph, GraphStatus};
pub use packet::{Packet, PacketId};
pub use port::{InputPort, OutputPort, PortAddress, PortDirection};
pub use queue::Queue;
pub use seeds::{DEFAULT_INPUT_PORT, Seeds};
