//! # Connections
//!
//! A [`Connection`] is a FIFO channel of [`Packet`]s between exactly one
//! producer ([`OutputPort`]) and one consumer ([`InputPort`]), backed by a
//! [`Queue`]. Two kinds exist:
//!
//! - **Bounded**: optional capacity. A send into a full connection suspends the
//!   sender until the consumer drains a packet. Without a capacity the
//!   connection is unbounded.
//! - **Initial**: the initial-packet (IIP) variant. No producer port; loaded
//!   once with a single packet that its consumer reads once.
//!
//! ## Wakeups
//!
//! The consumer and producer each park at most one waker on the connection.
//! Enqueueing wakes the reader, dequeueing wakes the writer. Enqueueing, and the
//! producer closing, also notify the consumer component so it can be activated
//! if it was waiting for its first packet.
//!
//! ## Exhaustion
//!
//! Once the producer reaches its terminal status the connection is
//! producer-closed. Packets still buffered are drained to the consumer in
//! order; only after the last one does a read report exhaustion.

use crate::component::{Component, ComponentInner};
use crate::error::{ConnectionError, GraphError};
use crate::packet::Packet;
use crate::port::{InputPort, OutputPort, PortAddress};
use crate::queue::Queue;
use std::cell::RefCell;
use std::fmt::{self, Display, Formatter};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, Waker};
use tracing::debug;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(0);

/// Identifier of a connection, unique within the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
  fn next() -> Self {
    ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
  }
}

impl Display for ConnectionId {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "conn-{}", self.0)
  }
}

/// The two connection variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
  /// Producer-to-consumer channel. `None` capacity means unbounded.
  Bounded {
    /// Maximum number of buffered packets.
    capacity: Option<usize>,
  },
  /// Initial-packet connection: no producer, one packet.
  Initial,
}

/// Result of a non-suspending read.
#[derive(Debug)]
pub enum ReadOutcome {
  /// The next packet in send order.
  Packet(Packet),
  /// Nothing buffered, but the producer may still send.
  Empty,
  /// Nothing buffered and nothing more will arrive.
  Exhausted,
}

impl ReadOutcome {
  /// The packet, if one was read.
  pub fn into_packet(self) -> Option<Packet> {
    match self {
      ReadOutcome::Packet(packet) => Some(packet),
      ReadOutcome::Empty | ReadOutcome::Exhausted => None,
    }
  }
}

struct Endpoint {
  address: PortAddress,
  owner: Weak<ComponentInner>,
}

struct ConnectionState {
  id: ConnectionId,
  kind: ConnectionKind,
  queue: Queue<Packet>,
  producer: Option<Endpoint>,
  consumer: Option<Endpoint>,
  producer_closed: bool,
  consumer_closed: bool,
  reader: Option<Waker>,
  writer: Option<Waker>,
  delivered: usize,
}

impl ConnectionState {
  fn is_full(&self) -> bool {
    match self.kind {
      ConnectionKind::Bounded {
        capacity: Some(capacity),
      } => self.queue.len() >= capacity,
      ConnectionKind::Bounded { capacity: None } => false,
      ConnectionKind::Initial => self.delivered > 0 || !self.queue.is_empty(),
    }
  }

  /// No producer can add more packets.
  fn is_closed(&self) -> bool {
    self.producer_closed || self.kind == ConnectionKind::Initial
  }

  fn consumer(&self) -> Option<Component> {
    self
      .consumer
      .as_ref()
      .and_then(|endpoint| endpoint.owner.upgrade())
      .map(Component::from_inner)
  }
}

/// Shared handle to a connection. Clones refer to the same channel.
#[derive(Clone)]
pub struct Connection {
  state: Rc<RefCell<ConnectionState>>,
}

impl Connection {
  fn with_kind(kind: ConnectionKind) -> Self {
    Self {
      state: Rc::new(RefCell::new(ConnectionState {
        id: ConnectionId::next(),
        kind,
        queue: Queue::new(),
        producer: None,
        consumer: None,
        producer_closed: false,
        consumer_closed: false,
        reader: None,
        writer: None,
        delivered: 0,
      })),
    }
  }

  /// Creates a producer-to-consumer connection holding at most `capacity`
  /// packets, or any number if `capacity` is `None`.
  pub fn bounded(capacity: Option<usize>) -> Self {
    Self::with_kind(ConnectionKind::Bounded { capacity })
  }

  /// Creates an initial-packet connection.
  pub fn initial() -> Self {
    Self::with_kind(ConnectionKind::Initial)
  }

  /// Binds the producer (if any) and the consumer port to this connection.
  ///
  /// # Errors
  ///
  /// - [`GraphError::ProducerOnInitial`] if a producer is given for an
  ///   initial-packet connection.
  /// - [`GraphError::OutputAlreadyBound`] / [`GraphError::InputAlreadyBound`]
  ///   if either port is already bound to a different connection.
  pub fn connect(
    &self,
    producer: Option<&OutputPort>,
    consumer: &InputPort,
  ) -> Result<(), GraphError> {
    if producer.is_some() && self.is_initial() {
      return Err(GraphError::ProducerOnInitial);
    }
    if let Some(output) = producer {
      if output.connection().is_some_and(|c| !c.ptr_eq(self)) {
        return Err(GraphError::OutputAlreadyBound {
          component: output.address().component.clone(),
          port: output.address().port.clone(),
        });
      }
    }
    if consumer.connection().is_some_and(|c| !c.ptr_eq(self)) {
      return Err(GraphError::InputAlreadyBound {
        component: consumer.address().component.clone(),
        port: consumer.address().port.clone(),
      });
    }

    {
      let mut state = self.state.borrow_mut();
      state.producer = producer.map(|output| Endpoint {
        address: output.address().clone(),
        owner: output.owner(),
      });
      state.consumer = Some(Endpoint {
        address: consumer.address().clone(),
        owner: consumer.owner(),
      });
      debug!(
        connection = %state.id,
        producer = ?state.producer.as_ref().map(|p| p.address.to_string()),
        consumer = %consumer.address(),
        "connection bound"
      );
    }
    if let Some(output) = producer {
      output.bind(self.clone());
    }
    consumer.bind(self.clone());
    Ok(())
  }

  /// Enqueues `packet` without suspending.
  ///
  /// # Errors
  ///
  /// - [`ConnectionError::Full`] if a bounded connection is at capacity.
  /// - [`ConnectionError::AlreadyLoaded`] on a second load of an
  ///   initial-packet connection.
  /// - [`ConnectionError::Disconnected`] if the consumer is done.
  pub fn put_data(&self, packet: Packet) -> Result<(), ConnectionError> {
    {
      let mut state = self.state.borrow_mut();
      if state.consumer_closed {
        return Err(ConnectionError::Disconnected(state.id));
      }
      if state.is_full() {
        return Err(match state.kind {
          ConnectionKind::Initial => ConnectionError::AlreadyLoaded(state.id),
          ConnectionKind::Bounded { capacity } => ConnectionError::Full {
            connection: state.id,
            capacity: capacity.unwrap_or(usize::MAX),
            packet,
          },
        });
      }
      state.queue.enqueue(packet);
    }
    self.packet_arrived();
    Ok(())
  }

  /// Dequeues the next packet without suspending.
  pub fn try_read(&self) -> ReadOutcome {
    let (outcome, writer) = {
      let mut state = self.state.borrow_mut();
      match state.queue.dequeue() {
        Ok(packet) => {
          state.delivered += 1;
          (ReadOutcome::Packet(packet), state.writer.take())
        }
        Err(_) if state.is_closed() => (ReadOutcome::Exhausted, None),
        Err(_) => (ReadOutcome::Empty, None),
      }
    };
    if let Some(writer) = writer {
      writer.wake();
    }
    outcome
  }

  /// Polls for the next packet, parking the reader's waker while empty.
  ///
  /// `Ready(None)` signals exhaustion.
  pub fn poll_read(&self, cx: &mut Context<'_>) -> Poll<Option<Packet>> {
    match self.try_read() {
      ReadOutcome::Packet(packet) => Poll::Ready(Some(packet)),
      ReadOutcome::Exhausted => Poll::Ready(None),
      ReadOutcome::Empty => {
        self.state.borrow_mut().reader = Some(cx.waker().clone());
        Poll::Pending
      }
    }
  }

  /// Polls to enqueue the packet held in `slot`, parking the writer's waker
  /// while a bounded connection is full.
  ///
  /// The packet is taken out of `slot` once it is enqueued.
  pub fn poll_send(
    &self,
    cx: &mut Context<'_>,
    slot: &mut Option<Packet>,
  ) -> Poll<Result<(), ConnectionError>> {
    {
      let mut state = self.state.borrow_mut();
      if state.consumer_closed {
        return Poll::Ready(Err(ConnectionError::Disconnected(state.id)));
      }
      let Some(packet) = slot.take() else {
        return Poll::Ready(Ok(()));
      };
      if state.is_full() {
        *slot = Some(packet);
        state.writer = Some(cx.waker().clone());
        return Poll::Pending;
      }
      state.queue.enqueue(packet);
    }
    self.packet_arrived();
    Poll::Ready(Ok(()))
  }

  /// Registers `waker` to be woken when a packet arrives or the producer closes.
  pub(crate) fn register_reader(&self, waker: &Waker) {
    self.state.borrow_mut().reader = Some(waker.clone());
  }

  /// Marks the producer as terminal. Buffered packets remain readable.
  pub(crate) fn close_producer(&self) {
    let (reader, consumer) = {
      let mut state = self.state.borrow_mut();
      if state.producer_closed {
        return;
      }
      state.producer_closed = true;
      (state.reader.take(), state.consumer())
    };
    if let Some(reader) = reader {
      reader.wake();
    }
    if let Some(consumer) = consumer {
      consumer.on_input_ready();
    }
  }

  /// Marks the consumer as terminal. A blocked sender is woken and fails.
  pub(crate) fn close_consumer(&self) {
    let writer = {
      let mut state = self.state.borrow_mut();
      state.consumer_closed = true;
      state.writer.take()
    };
    if let Some(writer) = writer {
      writer.wake();
    }
  }

  fn packet_arrived(&self) {
    let (reader, consumer) = {
      let mut state = self.state.borrow_mut();
      (state.reader.take(), state.consumer())
    };
    if let Some(reader) = reader {
      reader.wake();
    }
    if let Some(consumer) = consumer {
      consumer.on_input_ready();
    }
  }

  /// Connection identifier.
  pub fn id(&self) -> ConnectionId {
    self.state.borrow().id
  }

  /// Connection variant.
  pub fn kind(&self) -> ConnectionKind {
    self.state.borrow().kind
  }

  /// Returns `true` for an initial-packet connection.
  pub fn is_initial(&self) -> bool {
    self.kind() == ConnectionKind::Initial
  }

  /// Capacity bound. Initial-packet connections hold exactly one packet.
  pub fn capacity(&self) -> Option<usize> {
    match self.kind() {
      ConnectionKind::Bounded { capacity } => capacity,
      ConnectionKind::Initial => Some(1),
    }
  }

  /// Number of buffered packets.
  pub fn len(&self) -> usize {
    self.state.borrow().queue.len()
  }

  /// Returns `true` if no packet is buffered.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Number of packets handed to the consumer so far.
  pub fn delivered(&self) -> usize {
    self.state.borrow().delivered
  }

  /// Returns `true` once nothing is buffered and no producer can add more.
  pub fn is_exhausted(&self) -> bool {
    let state = self.state.borrow();
    state.queue.is_empty() && state.is_closed()
  }

  /// Returns `true` once the producer reached its terminal status.
  pub fn is_producer_closed(&self) -> bool {
    self.state.borrow().producer_closed
  }

  /// Producer port address. `None` for initial-packet connections.
  pub fn producer(&self) -> Option<PortAddress> {
    self
      .state
      .borrow()
      .producer
      .as_ref()
      .map(|endpoint| endpoint.address.clone())
  }

  /// Consumer port address, once bound.
  pub fn consumer(&self) -> Option<PortAddress> {
    self
      .state
      .borrow()
      .consumer
      .as_ref()
      .map(|endpoint| endpoint.address.clone())
  }

  /// Returns `true` if both handles refer to the same connection.
  pub fn ptr_eq(&self, other: &Connection) -> bool {
    Rc::ptr_eq(&self.state, &other.state)
  }
}

impl fmt::Debug for Connection {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    let state = self.state.borrow();
    f.debug_struct("Connection")
      .field("id", &state.id)
      .field("kind", &state.kind)
      .field("buffered", &state.queue.len())
      .field("producer_closed", &state.producer_closed)
      .finish()
  }
}
