//! Seed values for [`crate::Graph::initialize`].
//!
//! A [`Seeds`] value names every input port that receives an initial packet.
//! The single-value form targets the default port, [`DEFAULT_INPUT_PORT`].

use crate::packet::Packet;
use std::any::Any;

/// Port seeded by [`Seeds::single`].
pub const DEFAULT_INPUT_PORT: &str = "in";

/// Named initial packets, one per input port.
///
/// # Example
///
/// ```rust
/// use fbpweave::Seeds;
///
/// let seeds = Seeds::new().with("length", 3u32).with("interval", 10u32);
/// assert_eq!(seeds.port_names().collect::<Vec<_>>(), ["length", "interval"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Seeds {
  entries: Vec<(String, Packet)>,
}

impl Seeds {
  /// Creates an empty seed set.
  pub fn new() -> Self {
    Self::default()
  }

  /// One value for the default `in` port.
  pub fn single<T: Any + Send + Sync>(value: T) -> Self {
    Self::new().with(DEFAULT_INPUT_PORT, value)
  }

  /// Adds `value` for `port`. A later value for the same port replaces the
  /// earlier one.
  pub fn with<T: Any + Send + Sync>(self, port: impl Into<String>, value: T) -> Self {
    self.with_packet(port, Packet::new(value))
  }

  /// Adds a ready-made packet for `port`.
  pub fn with_packet(mut self, port: impl Into<String>, packet: Packet) -> Self {
    let port = port.into();
    match self.entries.iter_mut().find(|(name, _)| *name == port) {
      Some(entry) => entry.1 = packet,
      None => self.entries.push((port, packet)),
    }
    self
  }

  /// Seeded port names, in insertion order.
  pub fn port_names(&self) -> impl Iterator<Item = &str> {
    self.entries.iter().map(|(name, _)| name.as_str())
  }

  /// Number of seeded ports.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Returns `true` if nothing is seeded.
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub(crate) fn into_entries(self) -> Vec<(String, Packet)> {
    self.entries
  }
}
