//! # Graph
//!
//! The [`Graph`] owns every component and connection of a flow. It is built
//! in a wiring phase and then run once:
//!
//! 1. **Wiring**: [`Graph::add`], [`Graph::initialize`] and [`Graph::connect`]
//!    register components and bind their ports. Every wiring error is returned
//!    as a [`GraphError`]; a rejected call leaves the topology untouched.
//! 2. **Run**: [`Graph::run`] seals the topology, activates the starter
//!    components (those fed only by initial packets), and drives all
//!    activated components on a single-threaded cooperative executor until
//!    none can make progress.
//!
//! ## Completion
//!
//! `run` registers the graph as an observer of every component. A join
//! barrier counts components that are not done yet; when it reaches zero the
//! observers are detached and the completion callback fires exactly once.
//!
//! ## Stalls
//!
//! Components waiting on each other with empty connections never finish. When
//! the executor runs out of work before every component is done the graph
//! reports [`GraphStatus::Stalled`] and [`Graph::pending_components`] names
//! the components still waiting.
//!
//! ## Example
//!
//! ```rust
//! use fbpweave::{Component, Graph};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let source = Component::builder("source")
//!   .output("out")
//!   .build(|ctx| async move { ctx.send("out", 42).await });
//! let sink = Component::builder("sink")
//!   .input("in")
//!   .build(|ctx| async move {
//!     assert_eq!(ctx.read_value::<i32>("in").await?, Some(42));
//!     Ok(())
//!   });
//!
//! let mut graph = Graph::new("answer");
//! graph.connect(&source, "out", &sink, "in", Some(1))?;
//!
//! let finished = Rc::new(Cell::new(false));
//! let flag = Rc::clone(&finished);
//! let starters = graph.run(move || flag.set(true))?;
//!
//! assert_eq!(starters.len(), 1);
//! assert!(finished.get());
//! # Ok::<(), fbpweave::GraphError>(())
//! ```

use crate::component::{Component, ComponentStatus};
use crate::config::GraphConfig;
use crate::connection::Connection;
use crate::error::GraphError;
use crate::execution::CompletionBarrier;
use crate::port::PortDirection;
use crate::seeds::Seeds;
use futures::executor::LocalPool;
use std::fmt::{self, Display, Formatter};
use std::rc::Rc;
use tracing::{debug, error, info, trace, warn};

/// Lifecycle of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphStatus {
  /// Topology can still change.
  Wiring,
  /// `run` is in progress.
  Running,
  /// Every component is done and the callback has fired.
  Completed,
  /// The executor ran out of work with components still pending.
  Stalled,
}

impl Display for GraphStatus {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    let name = match self {
      GraphStatus::Wiring => "wiring",
      GraphStatus::Running => "running",
      GraphStatus::Completed => "completed",
      GraphStatus::Stalled => "stalled",
    };
    f.write_str(name)
  }
}

/// A flow graph: components, the connections between them, and the executor
/// that runs them.
pub struct Graph {
  config: GraphConfig,
  components: Vec<Component>,
  connections: Vec<Connection>,
  sealed: bool,
  status: GraphStatus,
  /// Kept after `run` so suspended tasks of a stalled graph stay inspectable.
  pool: Option<LocalPool>,
}

impl Graph {
  /// Creates an empty graph with default settings.
  pub fn new(name: impl Into<String>) -> Self {
    Self::with_config(GraphConfig::new(name))
  }

  /// Creates an empty graph with the given settings.
  pub fn with_config(config: GraphConfig) -> Self {
    Self {
      config,
      components: Vec::new(),
      connections: Vec::new(),
      sealed: false,
      status: GraphStatus::Wiring,
      pool: None,
    }
  }

  /// Graph name.
  pub fn name(&self) -> &str {
    &self.config.name
  }

  /// Active settings.
  pub fn config(&self) -> &GraphConfig {
    &self.config
  }

  /// Registered components, in registration order.
  pub fn components(&self) -> &[Component] {
    &self.components
  }

  /// Every connection created by `initialize` and `connect`.
  pub fn connections(&self) -> &[Connection] {
    &self.connections
  }

  /// Current status.
  pub fn status(&self) -> GraphStatus {
    self.status
  }

  /// Returns `true` once `run` has started.
  pub fn is_sealed(&self) -> bool {
    self.sealed
  }

  /// Returns `true` if this exact component is registered.
  pub fn contains(&self, component: &Component) -> bool {
    self.components.iter().any(|c| c.ptr_eq(component))
  }

  /// First registered component named `name`.
  pub fn find_component(&self, name: &str) -> Option<&Component> {
    self.components.iter().find(|c| c.name() == name)
  }

  /// Names of components that have not reached `Done`.
  pub fn pending_components(&self) -> Vec<String> {
    self
      .components
      .iter()
      .filter(|c| !c.is_terminal())
      .map(|c| c.name().to_string())
      .collect()
  }

  /// Registers `component`. Adding the same component again is a no-op.
  ///
  /// # Errors
  ///
  /// [`GraphError::Sealed`] once `run` has started.
  pub fn add(&mut self, component: &Component) -> Result<(), GraphError> {
    self.ensure_open()?;
    self.register(component);
    Ok(())
  }

  /// Seeds input ports of `component` with initial packets, one
  /// initial-packet connection per seeded port, and registers the component.
  ///
  /// All seed names are validated before anything is bound.
  ///
  /// # Errors
  ///
  /// - [`GraphError::Sealed`] once `run` has started.
  /// - [`GraphError::EmptySeeds`] if `seeds` is empty.
  /// - [`GraphError::UnknownPort`] if a seed names an undeclared input.
  /// - [`GraphError::InputAlreadyBound`] if a seeded port is already wired.
  pub fn initialize(
    &mut self,
    component: &Component,
    seeds: Seeds,
  ) -> Result<Vec<Connection>, GraphError> {
    self.ensure_open()?;
    if seeds.is_empty() {
      return Err(GraphError::EmptySeeds(component.name().to_string()));
    }
    for port in seeds.port_names() {
      if !component.has_input_port(port) {
        return Err(GraphError::UnknownPort {
          component: component.name().to_string(),
          port: port.to_string(),
          direction: PortDirection::Input,
        });
      }
      if component.input(port).is_some() {
        return Err(GraphError::InputAlreadyBound {
          component: component.name().to_string(),
          port: port.to_string(),
        });
      }
    }

    let mut wired = Vec::with_capacity(seeds.len());
    for (name, packet) in seeds.into_entries() {
      let port = component.create_input_port(&name)?;
      let connection = Connection::initial();
      connection.connect(None, &port)?;
      connection
        .put_data(packet)
        .map_err(|_| GraphError::InputAlreadyBound {
          component: component.name().to_string(),
          port: name.clone(),
        })?;
      debug!(
        graph = %self.config.name,
        port = %port.address(),
        connection = %connection.id(),
        "initial packet seeded"
      );
      self.connections.push(connection.clone());
      wired.push(connection);
    }
    self.register(component);
    component.refresh_initialized();
    Ok(wired)
  }

  /// Wires output `up_port` of `up` to input `down_port` of `down` through a
  /// new connection, and registers both components.
  ///
  /// `capacity` bounds the connection; `None` falls back to the configured
  /// default. Wiring the same pair again returns the existing connection.
  ///
  /// # Errors
  ///
  /// - [`GraphError::Sealed`] once `run` has started.
  /// - [`GraphError::UnknownPort`] for undeclared port names.
  /// - [`GraphError::InvalidCapacity`] for a zero capacity.
  /// - [`GraphError::OutputAlreadyBound`] if `up_port` already feeds another
  ///   input. Output ports never fan out.
  /// - [`GraphError::InputAlreadyBound`] if `down_port` is already fed.
  pub fn connect(
    &mut self,
    up: &Component,
    up_port: &str,
    down: &Component,
    down_port: &str,
    capacity: Option<usize>,
  ) -> Result<Connection, GraphError> {
    self.ensure_open()?;
    if !up.has_output_port(up_port) {
      return Err(GraphError::UnknownPort {
        component: up.name().to_string(),
        port: up_port.to_string(),
        direction: PortDirection::Output,
      });
    }
    if !down.has_input_port(down_port) {
      return Err(GraphError::UnknownPort {
        component: down.name().to_string(),
        port: down_port.to_string(),
        direction: PortDirection::Input,
      });
    }
    let capacity = capacity.or(self.config.default_capacity);
    if capacity == Some(0) {
      return Err(GraphError::InvalidCapacity);
    }

    if let Some(existing) = up.output(up_port).and_then(|port| port.connection()) {
      let same_pair = down
        .input(down_port)
        .and_then(|port| port.connection())
        .is_some_and(|connection| connection.ptr_eq(&existing));
      if same_pair {
        return Ok(existing);
      }
      warn!(
        graph = %self.config.name,
        component = %up.name(),
        port = %up_port,
        "cannot connect one output port to multiple input ports"
      );
      return Err(GraphError::OutputAlreadyBound {
        component: up.name().to_string(),
        port: up_port.to_string(),
      });
    }
    if down.input(down_port).is_some() {
      warn!(
        graph = %self.config.name,
        component = %down.name(),
        port = %down_port,
        "input port already bound"
      );
      return Err(GraphError::InputAlreadyBound {
        component: down.name().to_string(),
        port: down_port.to_string(),
      });
    }

    let output = up.create_output_port(up_port)?;
    let input = down.create_input_port(down_port)?;
    let connection = Connection::bounded(capacity);
    connection.connect(Some(&output), &input)?;
    self.register(up);
    self.register(down);
    self.connections.push(connection.clone());
    down.refresh_initialized();
    Ok(connection)
  }

  /// Seals the topology, starts every starter component, and drives the
  /// graph until no component can make progress.
  ///
  /// `callback` fires exactly once, as soon as every registered component is
  /// done. On a stalled graph it never fires; see [`Graph::status`].
  ///
  /// Returns the starter components.
  ///
  /// # Errors
  ///
  /// - [`GraphError::Sealed`] if `run` was already called.
  /// - [`GraphError::UnboundInput`] if a declared input was never wired. The
  ///   graph stays open so the wiring can be completed.
  pub fn run<F>(&mut self, callback: F) -> Result<Vec<Component>, GraphError>
  where
    F: FnOnce() + 'static,
  {
    self.ensure_open()?;
    for component in &self.components {
      if let Some(port) = component.unbound_inputs().into_iter().next() {
        return Err(GraphError::UnboundInput {
          component: component.name().to_string(),
          port,
        });
      }
    }
    self.sealed = true;
    self.status = GraphStatus::Running;

    let mut pool = LocalPool::new();
    let spawner = pool.spawner();
    let barrier = CompletionBarrier::new(&self.components, callback);
    for component in &self.components {
      component.attach(spawner.clone());
      let observer = Rc::clone(&barrier);
      component.subscribe(move |change| observer.observe(change));
      if self.config.trace_state_changes {
        let graph = self.config.name.clone();
        component.subscribe(move |change| {
          trace!(
            graph = %graph,
            component = %change.component,
            from = %change.from,
            to = %change.to,
            "state change"
          );
        });
      }
    }

    let starters: Vec<Component> = self
      .components
      .iter()
      .filter(|component| component.is_starter())
      .cloned()
      .collect();
    info!(
      graph = %self.config.name,
      components = self.components.len(),
      connections = self.connections.len(),
      starters = starters.len(),
      "graph run started"
    );

    barrier.complete_if_idle();
    for starter in &starters {
      if let Err(err) = starter.activate() {
        error!(graph = %self.config.name, component = %starter.name(), error = %err, "failed to start component");
      }
    }
    pool.run_until_stalled();

    if barrier.is_complete() {
      self.status = GraphStatus::Completed;
    } else {
      self.status = GraphStatus::Stalled;
      let pending: Vec<String> = self
        .components
        .iter()
        .filter(|c| c.status() != ComponentStatus::Done)
        .map(|c| format!("{} ({})", c.name(), c.status()))
        .collect();
      warn!(graph = %self.config.name, pending = ?pending, "graph stalled before completion");
    }
    self.pool = Some(pool);
    Ok(starters)
  }

  fn ensure_open(&self) -> Result<(), GraphError> {
    if self.sealed {
      return Err(GraphError::Sealed(self.config.name.clone()));
    }
    Ok(())
  }

  fn register(&mut self, component: &Component) {
    if !self.contains(component) {
      debug!(graph = %self.config.name, component = %component.name(), "component registered");
      self.components.push(component.clone());
    }
  }
}

impl fmt::Debug for Graph {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("Graph")
      .field("name", &self.config.name)
      .field("status", &self.status)
      .field("components", &self.components)
      .field("connections", &self.connections.len())
      .finish()
  }
}
