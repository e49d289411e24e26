//! # Components
//!
//! A [`Component`] is a named computational unit. It declares its input and
//! output port names up front, owns the ports once the graph binds them, tracks
//! its [`ComponentStatus`], and notifies observers on every status change.
//!
//! ## Status Machine
//!
//! ```text
//! Uninitialized -> Initialized -> Activated <-> Running -> Done
//! ```
//!
//! - `Uninitialized -> Initialized`: every declared input port is bound.
//! - `Initialized -> Activated`: the graph starts it (starters) or a packet
//!   arrives on one of its inputs, or an upstream producer finishes.
//! - `Activated <-> Running`: `Running` while the body is being polled,
//!   `Activated` while it is suspended on a read or a send.
//! - `Running -> Done`: the body returned and no activation trigger is left.
//!
//! ## Logic
//!
//! The body is an opaque async callable ([`ComponentLogic`]) receiving a
//! [`ComponentContext`]. It reads with [`ComponentContext::read`] and sends with
//! [`ComponentContext::send`]; both suspend per the connection's state.
//!
//! ## Example
//!
//! ```rust
//! use fbpweave::Component;
//!
//! let doubler = Component::builder("doubler")
//!   .input("in")
//!   .output("out")
//!   .build(|ctx| async move {
//!     while let Some(value) = ctx.read_value::<i32>("in").await? {
//!       ctx.send("out", value * 2).await?;
//!     }
//!     Ok(())
//!   });
//!
//! assert_eq!(doubler.input_port_names(), ["in"]);
//! ```

use crate::error::{ComponentError, GraphError};
use crate::execution::ComponentTask;
use crate::packet::Packet;
use crate::port::{InputPort, OutputPort, PortAddress, PortDirection};
use futures::executor::LocalSpawner;
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;
use std::any::{Any, type_name};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::future::Future;
use std::rc::{Rc, Weak};
use tracing::{debug, error};

/// Lifecycle status of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentStatus {
  /// Some declared input port is not bound yet.
  Uninitialized,
  /// All declared inputs are bound; waiting to be scheduled.
  Initialized,
  /// Scheduled, or suspended on a read or send.
  Activated,
  /// The body is executing.
  Running,
  /// Terminal.
  Done,
}

impl ComponentStatus {
  /// Returns `true` for the terminal status.
  pub fn is_terminal(self) -> bool {
    self == ComponentStatus::Done
  }
}

impl Display for ComponentStatus {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    let name = match self {
      ComponentStatus::Uninitialized => "uninitialized",
      ComponentStatus::Initialized => "initialized",
      ComponentStatus::Activated => "activated",
      ComponentStatus::Running => "running",
      ComponentStatus::Done => "done",
    };
    f.write_str(name)
  }
}

/// Notification emitted on every status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
  /// Component name.
  pub component: String,
  /// Previous status.
  pub from: ComponentStatus,
  /// New status.
  pub to: ComponentStatus,
}

/// How often the body runs once a component is activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationMode {
  /// The body runs once; returning completes the component.
  #[default]
  Once,
  /// The body runs again whenever packets are pending after it returns, and
  /// the component completes only once every input is exhausted.
  Repeat,
}

/// Handle returned by [`Component::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Rc<dyn Fn(&StateChange)>;

/// The computation a component runs when activated.
///
/// Implemented for every `Fn(ComponentContext) -> impl Future` closure, so most
/// components are built from an `async move` closure.
pub trait ComponentLogic {
  /// Runs one activation of the body.
  fn execute(&self, ctx: ComponentContext) -> LocalBoxFuture<'static, Result<(), ComponentError>>;
}

impl<F, Fut> ComponentLogic for F
where
  F: Fn(ComponentContext) -> Fut,
  Fut: Future<Output = Result<(), ComponentError>> + 'static,
{
  fn execute(&self, ctx: ComponentContext) -> LocalBoxFuture<'static, Result<(), ComponentError>> {
    Box::pin(self(ctx))
  }
}

pub(crate) struct ComponentInner {
  name: String,
  declared_inputs: Vec<String>,
  declared_outputs: Vec<String>,
  inputs: RefCell<HashMap<String, InputPort>>,
  outputs: RefCell<HashMap<String, OutputPort>>,
  status: Cell<ComponentStatus>,
  activation: ActivationMode,
  logic: Rc<dyn ComponentLogic>,
  observers: RefCell<Vec<(ObserverId, Observer)>>,
  next_observer: Cell<u64>,
  spawner: RefCell<Option<LocalSpawner>>,
  failure: RefCell<Option<String>>,
  runs: Cell<usize>,
}

/// Builder for [`Component`].
#[derive(Debug, Clone)]
pub struct ComponentBuilder {
  name: String,
  inputs: Vec<String>,
  outputs: Vec<String>,
  activation: ActivationMode,
}

impl ComponentBuilder {
  /// Declares an input port. Declaration order is kept.
  pub fn input(mut self, name: impl Into<String>) -> Self {
    let name = name.into();
    if !self.inputs.contains(&name) {
      self.inputs.push(name);
    }
    self
  }

  /// Declares several input ports.
  pub fn inputs<I, S>(self, names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    names.into_iter().fold(self, |builder, name| builder.input(name))
  }

  /// Declares an output port.
  pub fn output(mut self, name: impl Into<String>) -> Self {
    let name = name.into();
    if !self.outputs.contains(&name) {
      self.outputs.push(name);
    }
    self
  }

  /// Declares several output ports.
  pub fn outputs<I, S>(self, names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    names.into_iter().fold(self, |builder, name| builder.output(name))
  }

  /// Sets the activation mode. Defaults to [`ActivationMode::Once`].
  pub fn activation(mut self, mode: ActivationMode) -> Self {
    self.activation = mode;
    self
  }

  /// Builds the component around an async closure.
  pub fn build<F, Fut>(self, logic: F) -> Component
  where
    F: Fn(ComponentContext) -> Fut + 'static,
    Fut: Future<Output = Result<(), ComponentError>> + 'static,
  {
    self.build_with(logic)
  }

  /// Builds the component around any [`ComponentLogic`] implementation.
  pub fn build_with<L: ComponentLogic + 'static>(self, logic: L) -> Component {
    let inner = Rc::new(ComponentInner {
      name: self.name,
      declared_inputs: self.inputs,
      declared_outputs: self.outputs,
      inputs: RefCell::new(HashMap::new()),
      outputs: RefCell::new(HashMap::new()),
      status: Cell::new(ComponentStatus::Uninitialized),
      activation: self.activation,
      logic: Rc::new(logic),
      observers: RefCell::new(Vec::new()),
      next_observer: Cell::new(0),
      spawner: RefCell::new(None),
      failure: RefCell::new(None),
      runs: Cell::new(0),
    });
    let component = Component { inner };
    component.refresh_initialized();
    component
  }
}

/// Shared handle to a component. Clones refer to the same component; graph
/// membership is by identity, see [`Component::ptr_eq`].
#[derive(Clone)]
pub struct Component {
  inner: Rc<ComponentInner>,
}

impl Component {
  /// Starts building a component named `name`.
  pub fn builder(name: impl Into<String>) -> ComponentBuilder {
    ComponentBuilder {
      name: name.into(),
      inputs: Vec::new(),
      outputs: Vec::new(),
      activation: ActivationMode::Once,
    }
  }

  pub(crate) fn from_inner(inner: Rc<ComponentInner>) -> Self {
    Self { inner }
  }

  pub(crate) fn downgrade(&self) -> Weak<ComponentInner> {
    Rc::downgrade(&self.inner)
  }

  /// Component name.
  pub fn name(&self) -> &str {
    &self.inner.name
  }

  /// Current status.
  pub fn status(&self) -> ComponentStatus {
    self.inner.status.get()
  }

  /// Returns `true` once the component is done.
  pub fn is_terminal(&self) -> bool {
    self.status().is_terminal()
  }

  /// Activation mode.
  pub fn activation(&self) -> ActivationMode {
    self.inner.activation
  }

  /// Declared input port names, in declaration order.
  pub fn input_port_names(&self) -> &[String] {
    &self.inner.declared_inputs
  }

  /// Declared output port names, in declaration order.
  pub fn output_port_names(&self) -> &[String] {
    &self.inner.declared_outputs
  }

  /// Returns `true` if an input port with this name is declared.
  pub fn has_input_port(&self, name: &str) -> bool {
    self.inner.declared_inputs.iter().any(|n| n == name)
  }

  /// Returns `true` if an output port with this name is declared.
  pub fn has_output_port(&self, name: &str) -> bool {
    self.inner.declared_outputs.iter().any(|n| n == name)
  }

  /// The bound input port `name`, if it exists yet.
  pub fn input(&self, name: &str) -> Option<InputPort> {
    self.inner.inputs.borrow().get(name).cloned()
  }

  /// The bound output port `name`, if it exists yet.
  pub fn output(&self, name: &str) -> Option<OutputPort> {
    self.inner.outputs.borrow().get(name).cloned()
  }

  /// Bound input ports, in declaration order.
  pub fn inputs(&self) -> Vec<InputPort> {
    let ports = self.inner.inputs.borrow();
    self
      .inner
      .declared_inputs
      .iter()
      .filter_map(|name| ports.get(name).cloned())
      .collect()
  }

  /// Bound output ports, in declaration order.
  pub fn outputs(&self) -> Vec<OutputPort> {
    let ports = self.inner.outputs.borrow();
    self
      .inner
      .declared_outputs
      .iter()
      .filter_map(|name| ports.get(name).cloned())
      .collect()
  }

  /// Declared input ports that are not bound yet.
  pub fn unbound_inputs(&self) -> Vec<String> {
    let ports = self.inner.inputs.borrow();
    self
      .inner
      .declared_inputs
      .iter()
      .filter(|name| !ports.contains_key(*name))
      .cloned()
      .collect()
  }

  /// A component is a starter if every input is fed by an initial-packet
  /// connection, or it has no inputs at all.
  pub fn is_starter(&self) -> bool {
    self.unbound_inputs().is_empty() && self.inputs().iter().all(InputPort::is_initial)
  }

  /// Error message of a failed body, if the last run returned an error.
  pub fn failure(&self) -> Option<String> {
    self.inner.failure.borrow().clone()
  }

  /// Number of times the body has been started.
  pub fn runs(&self) -> usize {
    self.inner.runs.get()
  }

  /// Returns `true` if both handles refer to the same component.
  pub fn ptr_eq(&self, other: &Component) -> bool {
    Rc::ptr_eq(&self.inner, &other.inner)
  }

  /// Registers `observer` for status changes.
  pub fn subscribe<F>(&self, observer: F) -> ObserverId
  where
    F: Fn(&StateChange) + 'static,
  {
    let id = ObserverId(self.inner.next_observer.get());
    self.inner.next_observer.set(id.0 + 1);
    self
      .inner
      .observers
      .borrow_mut()
      .push((id, Rc::new(observer)));
    id
  }

  /// Removes one observer. Returns `false` if it was not registered.
  pub fn unsubscribe(&self, id: ObserverId) -> bool {
    let mut observers = self.inner.observers.borrow_mut();
    let before = observers.len();
    observers.retain(|(observer, _)| *observer != id);
    observers.len() != before
  }

  /// Removes every observer.
  pub fn clear_observers(&self) {
    self.inner.observers.borrow_mut().clear();
  }

  /// Number of registered observers.
  pub fn observer_count(&self) -> usize {
    self.inner.observers.borrow().len()
  }

  pub(crate) fn create_input_port(&self, name: &str) -> Result<InputPort, GraphError> {
    if !self.has_input_port(name) {
      return Err(GraphError::UnknownPort {
        component: self.name().to_string(),
        port: name.to_string(),
        direction: PortDirection::Input,
      });
    }
    let port = self
      .inner
      .inputs
      .borrow_mut()
      .entry(name.to_string())
      .or_insert_with(|| {
        InputPort::new(self.downgrade(), PortAddress::new(self.name(), name))
      })
      .clone();
    Ok(port)
  }

  pub(crate) fn create_output_port(&self, name: &str) -> Result<OutputPort, GraphError> {
    if !self.has_output_port(name) {
      return Err(GraphError::UnknownPort {
        component: self.name().to_string(),
        port: name.to_string(),
        direction: PortDirection::Output,
      });
    }
    let port = self
      .inner
      .outputs
      .borrow_mut()
      .entry(name.to_string())
      .or_insert_with(|| {
        OutputPort::new(self.downgrade(), PortAddress::new(self.name(), name))
      })
      .clone();
    Ok(port)
  }

  /// Moves to `Initialized` once every declared input is bound.
  pub(crate) fn refresh_initialized(&self) {
    if self.status() == ComponentStatus::Uninitialized && self.unbound_inputs().is_empty() {
      self.transition(ComponentStatus::Initialized);
    }
  }

  pub(crate) fn attach(&self, spawner: LocalSpawner) {
    *self.inner.spawner.borrow_mut() = Some(spawner);
  }

  /// Schedules the body. No-op unless the component is `Initialized`.
  pub(crate) fn activate(&self) -> Result<(), ComponentError> {
    if self.status() != ComponentStatus::Initialized {
      return Ok(());
    }
    let spawner = self
      .inner
      .spawner
      .borrow()
      .clone()
      .ok_or_else(|| ComponentError::Spawn(self.name().to_string()))?;
    self.transition(ComponentStatus::Activated);
    debug!(component = %self.name(), "component activated");
    spawner
      .spawn_local(ComponentTask::new(self.clone()))
      .map_err(|_| ComponentError::Spawn(self.name().to_string()))
  }

  /// Called by a connection when a packet arrives or its producer closes.
  pub(crate) fn on_input_ready(&self) {
    let attached = self.inner.spawner.borrow().is_some();
    if attached && self.status() == ComponentStatus::Initialized {
      if let Err(err) = self.activate() {
        error!(component = %self.name(), error = %err, "activation failed");
      }
    }
  }

  /// Starts one run of the body.
  pub(crate) fn execute(&self) -> LocalBoxFuture<'static, Result<(), ComponentError>> {
    self.inner.runs.set(self.inner.runs.get() + 1);
    let logic = Rc::clone(&self.inner.logic);
    logic.execute(ComponentContext::new(self.clone()))
  }

  /// Returns `true` if some input has a buffered packet.
  pub(crate) fn has_pending_input(&self) -> bool {
    self
      .inputs()
      .iter()
      .filter_map(InputPort::connection)
      .any(|connection| !connection.is_empty())
  }

  /// Returns `true` once no input can deliver another packet.
  pub(crate) fn inputs_exhausted(&self) -> bool {
    self
      .inputs()
      .iter()
      .filter_map(InputPort::connection)
      .all(|connection| connection.is_exhausted())
  }

  /// Records the outcome of the body, closes every bound connection, and
  /// moves to `Done`.
  pub(crate) fn finish(&self, result: Result<(), ComponentError>) {
    if let Err(err) = result {
      error!(component = %self.name(), error = %err, "component failed");
      *self.inner.failure.borrow_mut() = Some(err.to_string());
    }
    for port in self.outputs() {
      if let Some(connection) = port.connection() {
        connection.close_producer();
      }
    }
    for port in self.inputs() {
      if let Some(connection) = port.connection() {
        connection.close_consumer();
      }
    }
    self.transition(ComponentStatus::Done);
  }

  pub(crate) fn transition(&self, to: ComponentStatus) {
    let from = self.inner.status.replace(to);
    if from == to {
      return;
    }
    let change = StateChange {
      component: self.name().to_string(),
      from,
      to,
    };
    let observers: Vec<Observer> = self
      .inner
      .observers
      .borrow()
      .iter()
      .map(|(_, observer)| Rc::clone(observer))
      .collect();
    for observer in observers {
      observer(&change);
    }
  }
}

impl fmt::Debug for Component {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("Component")
      .field("name", &self.inner.name)
      .field("status", &self.status())
      .field("inputs", &self.inner.declared_inputs)
      .field("outputs", &self.inner.declared_outputs)
      .finish()
  }
}

/// What a running body sees of its component: port lookup, reads and sends.
#[derive(Clone)]
pub struct ComponentContext {
  component: Component,
}

impl ComponentContext {
  fn new(component: Component) -> Self {
    Self { component }
  }

  /// Name of the running component.
  pub fn name(&self) -> &str {
    self.component.name()
  }

  /// The running component.
  pub fn component(&self) -> &Component {
    &self.component
  }

  /// Looks up a bound input port.
  ///
  /// # Errors
  ///
  /// [`ComponentError::UnknownPort`] for an undeclared name,
  /// [`ComponentError::UnboundPort`] for a declared but unwired one.
  pub fn input(&self, port: &str) -> Result<InputPort, ComponentError> {
    if !self.component.has_input_port(port) {
      return Err(self.unknown(port, PortDirection::Input));
    }
    self.component.input(port).ok_or_else(|| self.unbound(port))
  }

  /// Looks up a bound output port.
  ///
  /// # Errors
  ///
  /// [`ComponentError::UnknownPort`] for an undeclared name,
  /// [`ComponentError::UnboundPort`] for a declared but unwired one.
  pub fn output(&self, port: &str) -> Result<OutputPort, ComponentError> {
    if !self.component.has_output_port(port) {
      return Err(self.unknown(port, PortDirection::Output));
    }
    self.component.output(port).ok_or_else(|| self.unbound(port))
  }

  /// Reads the next packet from `port`, suspending while it is empty.
  /// `Ok(None)` means the input is exhausted.
  pub async fn read(&self, port: &str) -> Result<Option<Packet>, ComponentError> {
    let input = self.input(port)?;
    Ok(input.read().await)
  }

  /// Reads the next packet from `port` and clones its payload as `T`.
  ///
  /// # Errors
  ///
  /// [`ComponentError::UnexpectedPayload`] if the payload is not a `T`.
  pub async fn read_value<T: Any + Clone>(&self, port: &str) -> Result<Option<T>, ComponentError> {
    match self.read(port).await? {
      Some(packet) => packet
        .data::<T>()
        .cloned()
        .map(Some)
        .ok_or_else(|| ComponentError::UnexpectedPayload {
          port: port.to_string(),
          expected: type_name::<T>(),
        }),
      None => Ok(None),
    }
  }

  /// Sends `value` on `port`, suspending while the connection is full.
  pub async fn send<T: Any + Send + Sync>(&self, port: &str, value: T) -> Result<(), ComponentError> {
    self.send_packet(port, Packet::new(value)).await
  }

  /// Sends an existing packet on `port`, keeping its id.
  pub async fn send_packet(&self, port: &str, packet: Packet) -> Result<(), ComponentError> {
    let output = self.output(port)?;
    output.send(packet).await
  }

  fn unknown(&self, port: &str, direction: PortDirection) -> ComponentError {
    ComponentError::UnknownPort {
      component: self.name().to_string(),
      port: port.to_string(),
      direction,
    }
  }

  fn unbound(&self, port: &str) -> ComponentError {
    ComponentError::UnboundPort {
      component: self.name().to_string(),
      port: port.to_string(),
    }
  }
}

impl fmt::Debug for ComponentContext {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("ComponentContext")
      .field("component", &self.component.name())
      .finish()
  }
}
