//! # Ports
//!
//! Named endpoints of a component. Each port is bound to at most one
//! [`Connection`]: an [`InputPort`] reads from its connection, an [`OutputPort`]
//! sends into it. Ports are created lazily, the first time the graph binds a
//! declared port name, and are owned by their component.
//!
//! Reads and sends are futures. A read on an empty connection, or a send on a
//! full bounded one, suspends the calling component until the other end of the
//! connection makes progress.

use crate::component::ComponentInner;
use crate::connection::Connection;
use crate::error::{ComponentError, ConnectionError};
use crate::packet::Packet;
use futures::future::poll_fn;
use std::cell::RefCell;
use std::fmt::{self, Display, Formatter};
use std::future::Future;
use std::rc::{Rc, Weak};

/// Direction of a port relative to its component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
  /// Packets flow into the component.
  Input,
  /// Packets flow out of the component.
  Output,
}

impl Display for PortDirection {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      PortDirection::Input => write!(f, "input"),
      PortDirection::Output => write!(f, "output"),
    }
  }
}

/// Fully qualified port name: owning component plus port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortAddress {
  /// Owning component name.
  pub component: String,
  /// Port name.
  pub port: String,
}

impl PortAddress {
  /// Creates an address from component and port names.
  pub fn new(component: impl Into<String>, port: impl Into<String>) -> Self {
    Self {
      component: component.into(),
      port: port.into(),
    }
  }
}

impl Display for PortAddress {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}", self.component, self.port)
  }
}

pub(crate) struct PortInner {
  address: PortAddress,
  owner: Weak<ComponentInner>,
  connection: RefCell<Option<Connection>>,
}

impl PortInner {
  fn new(owner: Weak<ComponentInner>, address: PortAddress) -> Rc<Self> {
    Rc::new(Self {
      address,
      owner,
      connection: RefCell::new(None),
    })
  }
}

/// Input endpoint of a component.
#[derive(Clone)]
pub struct InputPort {
  inner: Rc<PortInner>,
}

impl InputPort {
  pub(crate) fn new(owner: Weak<ComponentInner>, address: PortAddress) -> Self {
    Self {
      inner: PortInner::new(owner, address),
    }
  }

  /// Port name.
  pub fn name(&self) -> &str {
    &self.inner.address.port
  }

  /// Component and port name.
  pub fn address(&self) -> &PortAddress {
    &self.inner.address
  }

  /// The bound connection, if any.
  pub fn connection(&self) -> Option<Connection> {
    self.inner.connection.borrow().clone()
  }

  /// Returns `true` if the port is fed by an initial-packet connection.
  pub fn is_initial(&self) -> bool {
    self
      .inner
      .connection
      .borrow()
      .as_ref()
      .is_some_and(Connection::is_initial)
  }

  /// Reads the next packet.
  ///
  /// Resolves to `None` once the connection is exhausted: its producer is done
  /// (or it is an initial-packet connection) and every buffered packet has
  /// been delivered. Until then an empty connection suspends the reader.
  pub fn read(&self) -> impl Future<Output = Option<Packet>> + 'static {
    let connection = self.connection();
    async move {
      match connection {
        Some(connection) => poll_fn(|cx| connection.poll_read(cx)).await,
        None => None,
      }
    }
  }

  /// Reads a packet only if one is buffered right now.
  pub fn try_read(&self) -> Option<Packet> {
    self
      .connection()
      .and_then(|connection| connection.try_read().into_packet())
  }

  pub(crate) fn owner(&self) -> Weak<ComponentInner> {
    self.inner.owner.clone()
  }

  pub(crate) fn bind(&self, connection: Connection) {
    *self.inner.connection.borrow_mut() = Some(connection);
  }
}

impl fmt::Debug for InputPort {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("InputPort")
      .field("address", &self.inner.address)
      .field("connection", &self.connection().map(|c| c.id()))
      .finish()
  }
}

/// Output endpoint of a component.
#[derive(Clone)]
pub struct OutputPort {
  inner: Rc<PortInner>,
}

impl OutputPort {
  pub(crate) fn new(owner: Weak<ComponentInner>, address: PortAddress) -> Self {
    Self {
      inner: PortInner::new(owner, address),
    }
  }

  /// Port name.
  pub fn name(&self) -> &str {
    &self.inner.address.port
  }

  /// Component and port name.
  pub fn address(&self) -> &PortAddress {
    &self.inner.address
  }

  /// The bound connection, if any.
  pub fn connection(&self) -> Option<Connection> {
    self.inner.connection.borrow().clone()
  }

  /// Sends `packet` into the bound connection.
  ///
  /// Suspends while a bounded connection is at capacity and resumes once the
  /// consumer drains a packet.
  ///
  /// # Errors
  ///
  /// [`ComponentError::UnboundPort`] if the port was never wired, and
  /// [`ComponentError::Disconnected`] if the consumer is already done.
  pub fn send(&self, packet: Packet) -> impl Future<Output = Result<(), ComponentError>> + 'static {
    let connection = self.connection();
    let address = self.inner.address.clone();
    async move {
      let connection = connection.ok_or_else(|| ComponentError::UnboundPort {
        component: address.component.clone(),
        port: address.port.clone(),
      })?;
      let mut slot = Some(packet);
      poll_fn(|cx| connection.poll_send(cx, &mut slot))
        .await
        .map_err(|_| ComponentError::Disconnected {
          component: address.component,
          port: address.port,
        })
    }
  }

  /// Sends without suspending.
  ///
  /// # Errors
  ///
  /// Fails with [`ConnectionError::Full`] instead of waiting for space, and with
  /// [`ConnectionError::Unbound`] if the port was never wired.
  pub fn try_send(&self, packet: Packet) -> Result<(), ConnectionError> {
    match self.connection() {
      Some(connection) => connection.put_data(packet),
      None => Err(ConnectionError::Unbound(self.inner.address.clone())),
    }
  }

  pub(crate) fn owner(&self) -> Weak<ComponentInner> {
    self.inner.owner.clone()
  }

  pub(crate) fn bind(&self, connection: Connection) {
    *self.inner.connection.borrow_mut() = Some(connection);
  }
}

impl fmt::Debug for OutputPort {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("OutputPort")
      .field("address", &self.inner.address)
      .field("connection", &self.connection().map(|c| c.id()))
      .finish()
  }
}
