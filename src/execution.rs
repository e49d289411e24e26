//! # Execution
//!
//! Cooperative, single-threaded scheduling of component bodies.
//!
//! Every activated component becomes one task on the graph's
//! [`futures::executor::LocalPool`]. The task wrapper, [`ComponentTask`],
//! reports `Running` while it is polled and `Activated` while it is parked on
//! a read or a send. When the body resolves, the component is finished: its
//! connections are closed and it moves to `Done`.
//!
//! Every poll that ends in `Pending` is reported as a `Running -> Activated`
//! pair, so a component that parks often (a consumer on a one-slot
//! connection, say) emits two notifications per packet. Observers that only
//! care about completion should filter on `Done`.
//!
//! ## Repeat Activation
//!
//! An [`ActivationMode::Repeat`] body is re-run only after input progress: it
//! consumed a packet and more are buffered, or a packet arrived or a producer
//! closed since the run started. A body that leaves its input untouched parks
//! until one of those happens, so an idle component shows up as a stall
//! instead of spinning the executor.
//!
//! [`CompletionBarrier`] is the join primitive `run` uses to detect global
//! completion: a count of non-terminal components, decremented on each `Done`
//! transition. At zero it detaches every observer and fires the callback once.

use crate::component::{ActivationMode, Component, ComponentInner, ComponentStatus, StateChange};
use crate::error::ComponentError;
use crate::port::InputPort;
use futures::future::{LocalBoxFuture, poll_fn};
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};
use tracing::{debug, info};

/// Task that drives one component from activation to `Done`.
pub(crate) struct ComponentTask {
  component: Component,
  body: LocalBoxFuture<'static, Result<(), ComponentError>>,
}

impl ComponentTask {
  pub(crate) fn new(component: Component) -> Self {
    let body = Box::pin(drive(component.clone()));
    Self { component, body }
  }
}

impl Future for ComponentTask {
  type Output = ();

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
    let this = self.get_mut();
    this.component.transition(ComponentStatus::Running);
    match this.body.as_mut().poll(cx) {
      Poll::Ready(result) => {
        this.component.finish(result);
        Poll::Ready(())
      }
      Poll::Pending => {
        this.component.transition(ComponentStatus::Activated);
        Poll::Pending
      }
    }
  }
}

/// Counters over a component's input connections, compared across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InputProgress {
  consumed: usize,
  arrived: usize,
  closed: usize,
}

impl InputProgress {
  fn of(component: &Component) -> Self {
    component
      .inputs()
      .iter()
      .filter_map(InputPort::connection)
      .fold(
        Self {
          consumed: 0,
          arrived: 0,
          closed: 0,
        },
        |acc, connection| Self {
          consumed: acc.consumed + connection.delivered(),
          arrived: acc.arrived + connection.delivered() + connection.len(),
          closed: acc.closed + usize::from(connection.is_producer_closed()),
        },
      )
  }

  /// A packet arrived or a producer closed since `earlier`.
  fn has_news_since(&self, earlier: &Self) -> bool {
    self.arrived != earlier.arrived || self.closed != earlier.closed
  }
}

/// Runs the body once, or repeatedly for [`ActivationMode::Repeat`] while
/// inputs keep delivering packets.
async fn drive(component: Component) -> Result<(), ComponentError> {
  loop {
    let before = InputProgress::of(&component);
    component.execute().await?;
    if component.activation() == ActivationMode::Once || component.inputs_exhausted() {
      return Ok(());
    }
    let consumed = InputProgress::of(&component).consumed != before.consumed;
    wait_for_input(&component, consumed, before).await;
    if component.inputs_exhausted() {
      return Ok(());
    }
    debug!(component = %component.name(), "component reactivated");
  }
}

/// Resolves once every input is exhausted, once new input arrived since
/// `baseline`, or, if the last run consumed something, once a packet is
/// buffered.
async fn wait_for_input(component: &Component, consumed: bool, baseline: InputProgress) {
  let inputs: Vec<_> = component
    .inputs()
    .iter()
    .filter_map(InputPort::connection)
    .collect();
  poll_fn(|cx| {
    if component.inputs_exhausted()
      || (consumed && component.has_pending_input())
      || InputProgress::of(component).has_news_since(&baseline)
    {
      return Poll::Ready(());
    }
    for connection in &inputs {
      connection.register_reader(cx.waker());
    }
    Poll::Pending
  })
  .await
}

/// Join barrier over the graph's components.
pub(crate) struct CompletionBarrier {
  remaining: Cell<usize>,
  members: Vec<Weak<ComponentInner>>,
  callback: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl CompletionBarrier {
  pub(crate) fn new<F>(members: &[Component], callback: F) -> Rc<Self>
  where
    F: FnOnce() + 'static,
  {
    let remaining = members.iter().filter(|c| !c.is_terminal()).count();
    Rc::new(Self {
      remaining: Cell::new(remaining),
      members: members.iter().map(Component::downgrade).collect(),
      callback: RefCell::new(Some(Box::new(callback))),
    })
  }

  /// Observer hook: counts `Done` transitions.
  pub(crate) fn observe(&self, change: &StateChange) {
    if change.to != ComponentStatus::Done {
      return;
    }
    let remaining = self.remaining.get().saturating_sub(1);
    self.remaining.set(remaining);
    debug!(component = %change.component, remaining, "component done");
    if remaining == 0 {
      self.complete();
    }
  }

  /// Fires the callback if nothing is left to wait for.
  pub(crate) fn complete_if_idle(&self) {
    if self.remaining.get() == 0 {
      self.complete();
    }
  }

  pub(crate) fn is_complete(&self) -> bool {
    self.callback.borrow().is_none()
  }

  fn complete(&self) {
    let Some(callback) = self.callback.borrow_mut().take() else {
      return;
    };
    for member in self.members.iter().filter_map(Weak::upgrade) {
      Component::from_inner(member).clear_observers();
    }
    info!(components = self.members.len(), "graph completed");
    callback();
  }
}
