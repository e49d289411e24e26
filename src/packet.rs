//! Information packets.
//!
//! Every value that travels through a [`crate::Connection`] is wrapped in a
//! [`Packet`]: a type-erased payload plus a [`PacketId`] taken from a process-wide
//! sequence. Components downcast the payload to the type they expect.
//!
//! # Example
//!
//! ```rust
//! use fbpweave::Packet;
//!
//! let packet = Packet::new(42i32);
//! assert_eq!(packet.data::<i32>(), Some(&42));
//! assert!(packet.data::<String>().is_none());
//! ```

use std::any::{Any, type_name};
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_PACKET_ID: AtomicU64 = AtomicU64::new(0);

/// Sequence-based packet identifier, unique within the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacketId(u64);

impl PacketId {
  fn next() -> Self {
    PacketId(NEXT_PACKET_ID.fetch_add(1, Ordering::Relaxed))
  }

  /// Raw sequence number.
  #[must_use]
  pub fn get(self) -> u64 {
    self.0
  }
}

impl Display for PacketId {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "ip-{}", self.0)
  }
}

/// A single information packet.
///
/// Cloning a packet is cheap: the payload is shared behind an `Arc`.
#[derive(Clone)]
pub struct Packet {
  id: PacketId,
  payload: Arc<dyn Any + Send + Sync>,
  type_name: &'static str,
}

impl Packet {
  /// Wraps `value` in a new packet with a fresh id.
  #[must_use]
  pub fn new<T: Any + Send + Sync>(value: T) -> Self {
    Self {
      id: PacketId::next(),
      payload: Arc::new(value),
      type_name: type_name::<T>(),
    }
  }

  /// The packet id.
  #[must_use]
  pub fn id(&self) -> PacketId {
    self.id
  }

  /// Name of the payload's Rust type, for diagnostics.
  #[must_use]
  pub fn type_name(&self) -> &'static str {
    self.type_name
  }

  /// Borrows the payload as `T`, if that is its type.
  #[must_use]
  pub fn data<T: Any>(&self) -> Option<&T> {
    self.payload.downcast_ref::<T>()
  }

  /// Returns `true` if the payload is a `T`.
  #[must_use]
  pub fn is<T: Any>(&self) -> bool {
    self.payload.is::<T>()
  }

  /// Takes the shared payload as `Arc<T>`, or hands the packet back on a type mismatch.
  pub fn downcast<T: Any + Send + Sync>(self) -> Result<Arc<T>, Packet> {
    let Packet {
      id,
      payload,
      type_name,
    } = self;
    payload.downcast::<T>().map_err(|payload| Packet {
      id,
      payload,
      type_name,
    })
  }
}

impl fmt::Debug for Packet {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("Packet")
      .field("id", &self.id)
      .field("type", &self.type_name)
      .finish()
  }
}
