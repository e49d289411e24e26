//! # Graph Test Suite
//!
//! Tests for [`Graph`] wiring and execution.
//!
//! ## Test Coverage
//!
//! - **Wiring**: `add`, `initialize` and `connect`, including every rejected call
//! - **Scheduling**: starter detection, activation on packet arrival, backpressure
//! - **Completion**: the callback, stalls, failures and repeat activation

use crate::component::{ActivationMode, Component, ComponentStatus};
use crate::config::GraphConfig;
use crate::error::{ComponentError, GraphError};
use crate::graph::{Graph, GraphStatus};
use crate::port::PortDirection;
use crate::seeds::Seeds;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

// ============================================================================
// Helpers
// ============================================================================

/// Source emitting `values` on `out`.
fn source(name: &str, values: Vec<i32>) -> Component {
  Component::builder(name)
    .output("out")
    .build(move |ctx| {
      let values = values.clone();
      async move {
        for value in values {
          ctx.send("out", value).await?;
        }
        Ok(())
      }
    })
}

/// Sink collecting every `i32` read from `in`.
fn sink(name: &str, seen: &Rc<RefCell<Vec<i32>>>) -> Component {
  let seen = Rc::clone(seen);
  Component::builder(name).input("in").build(move |ctx| {
    let seen = Rc::clone(&seen);
    async move {
      while let Some(value) = ctx.read_value::<i32>("in").await? {
        seen.borrow_mut().push(value);
      }
      Ok(())
    }
  })
}

fn counter() -> (Rc<Cell<usize>>, impl FnOnce() + 'static) {
  let calls = Rc::new(Cell::new(0));
  let hits = Rc::clone(&calls);
  (calls, move || hits.set(hits.get() + 1))
}

fn names(components: &[Component]) -> Vec<String> {
  components.iter().map(|c| c.name().to_string()).collect()
}

// ============================================================================
// Execution
// ============================================================================

#[test]
fn test_single_value_flows_and_callback_fires_once() {
  let seen = Rc::new(RefCell::new(Vec::new()));
  let a = source("a", vec![42]);
  let b = sink("b", &seen);

  let mut graph = Graph::new("pair");
  let connection = graph.connect(&a, "out", &b, "in", Some(1)).unwrap();
  assert_eq!(b.status(), ComponentStatus::Initialized);

  let (calls, callback) = counter();
  let starters = graph.run(callback).unwrap();

  assert_eq!(names(&starters), ["a"]);
  assert_eq!(*seen.borrow(), [42]);
  assert_eq!(calls.get(), 1);
  assert_eq!(graph.status(), GraphStatus::Completed);
  assert!(graph.pending_components().is_empty());
  assert_eq!(a.status(), ComponentStatus::Done);
  assert_eq!(b.status(), ComponentStatus::Done);
  assert!(connection.is_exhausted());
  assert_eq!(connection.delivered(), 1);
}

#[test]
fn test_observers_detached_after_completion() {
  let seen = Rc::new(RefCell::new(Vec::new()));
  let a = source("a", vec![1]);
  let b = sink("b", &seen);
  let mut graph = Graph::with_config(GraphConfig::new("detach").with_state_tracing(true));
  graph.connect(&a, "out", &b, "in", None).unwrap();

  let (calls, callback) = counter();
  graph.run(callback).unwrap();

  assert_eq!(calls.get(), 1);
  assert_eq!(a.observer_count(), 0);
  assert_eq!(b.observer_count(), 0);
}

#[test]
fn test_initialize_seeds_each_port_once() {
  let seen = Rc::new(RefCell::new(Vec::new()));
  let generator = Component::builder("generator")
    .inputs(["length", "interval"])
    .output("out")
    .build(|ctx| async move {
      let length = ctx.read_value::<i32>("length").await?.unwrap_or(0);
      let interval = ctx.read_value::<i32>("interval").await?.unwrap_or(1);
      // Initial packets are delivered exactly once.
      assert!(ctx.read("length").await?.is_none());
      assert!(ctx.read("interval").await?.is_none());
      for n in 0..length {
        ctx.send("out", n * interval).await?;
      }
      Ok(())
    });
  let collector = sink("collector", &seen);

  let mut graph = Graph::new("generator");
  let seeded = graph
    .initialize(
      &generator,
      Seeds::new().with("length", 3i32).with("interval", 10i32),
    )
    .unwrap();
  assert_eq!(seeded.len(), 2);
  assert!(seeded.iter().all(|c| c.is_initial() && c.len() == 1));
  // Both declared inputs are seeded; output wiring plays no part.
  assert_eq!(generator.status(), ComponentStatus::Initialized);

  assert_eq!(collector.status(), ComponentStatus::Uninitialized);
  graph
    .connect(&generator, "out", &collector, "in", Some(1))
    .unwrap();
  assert_eq!(collector.status(), ComponentStatus::Initialized);

  let (calls, callback) = counter();
  let starters = graph.run(callback).unwrap();

  assert_eq!(names(&starters), ["generator"]);
  assert_eq!(*seen.borrow(), [0, 10, 20]);
  assert!(seeded.iter().all(|c| c.delivered() == 1));
  assert!(generator.failure().is_none());
  assert_eq!(calls.get(), 1);
}

#[test]
fn test_starters_exclude_components_with_regular_inputs() {
  let seen = Rc::new(RefCell::new(Vec::new()));
  let mixed = Component::builder("mixed")
    .inputs(["config", "in"])
    .output("out")
    .build(|ctx| async move {
      let offset = ctx.read_value::<i32>("config").await?.unwrap_or(0);
      while let Some(value) = ctx.read_value::<i32>("in").await? {
        ctx.send("out", value + offset).await?;
      }
      Ok(())
    });
  let upstream = source("upstream", vec![1, 2]);
  let downstream = sink("downstream", &seen);

  let mut graph = Graph::new("mixed");
  graph
    .initialize(&mixed, Seeds::new().with("config", 100i32))
    .unwrap();
  graph.connect(&upstream, "out", &mixed, "in", Some(1)).unwrap();
  graph.connect(&mixed, "out", &downstream, "in", Some(1)).unwrap();

  let (calls, callback) = counter();
  let starters = graph.run(callback).unwrap();

  assert_eq!(names(&starters), ["upstream"]);
  assert!(!mixed.is_starter());
  assert_eq!(*seen.borrow(), [101, 102]);
  assert_eq!(calls.get(), 1);
}

#[test]
fn test_backpressure_bounds_in_flight_packets() {
  let sent = Rc::new(Cell::new(0usize));
  let received = Rc::new(RefCell::new(Vec::new()));
  let max_in_flight = Rc::new(Cell::new(0usize));

  let producer = {
    let sent = Rc::clone(&sent);
    let received = Rc::clone(&received);
    let max_in_flight = Rc::clone(&max_in_flight);
    Component::builder("producer").output("out").build(move |ctx| {
      let sent = Rc::clone(&sent);
      let received = Rc::clone(&received);
      let max_in_flight = Rc::clone(&max_in_flight);
      async move {
        for value in 1..=5 {
          ctx.send("out", value).await?;
          sent.set(sent.get() + 1);
          let in_flight = sent.get() - received.borrow().len();
          max_in_flight.set(max_in_flight.get().max(in_flight));
        }
        Ok(())
      }
    })
  };
  let consumer = sink("consumer", &received);

  let mut graph = Graph::new("backpressure");
  graph
    .connect(&producer, "out", &consumer, "in", Some(1))
    .unwrap();
  let (calls, callback) = counter();
  graph.run(callback).unwrap();

  assert_eq!(*received.borrow(), [1, 2, 3, 4, 5]);
  assert_eq!(max_in_flight.get(), 1);
  assert_eq!(calls.get(), 1);
}

#[test]
fn test_buffered_packet_drained_after_producer_done() {
  let seen = Rc::new(RefCell::new(Vec::new()));
  let producer = source("producer", vec![7]);
  let producer_done_first = Rc::new(Cell::new(false));

  let consumer = {
    let seen = Rc::clone(&seen);
    let upstream = producer.clone();
    let flag = Rc::clone(&producer_done_first);
    Component::builder("consumer").input("in").build(move |ctx| {
      let seen = Rc::clone(&seen);
      let upstream = upstream.clone();
      let flag = Rc::clone(&flag);
      async move {
        flag.set(upstream.status() == ComponentStatus::Done);
        while let Some(value) = ctx.read_value::<i32>("in").await? {
          seen.borrow_mut().push(value);
        }
        Ok(())
      }
    })
  };

  let mut graph = Graph::new("drain");
  graph
    .connect(&producer, "out", &consumer, "in", Some(1))
    .unwrap();
  graph.run(|| {}).unwrap();

  assert!(producer_done_first.get());
  assert_eq!(*seen.borrow(), [7]);
  assert_eq!(graph.status(), GraphStatus::Completed);
}

#[test]
fn test_repeat_activation_reruns_body_per_packet() {
  let seen = Rc::new(RefCell::new(Vec::new()));
  let producer = source("producer", vec![1, 2, 3]);
  let consumer = {
    let seen = Rc::clone(&seen);
    Component::builder("consumer")
      .input("in")
      .activation(ActivationMode::Repeat)
      .build(move |ctx| {
        let seen = Rc::clone(&seen);
        async move {
          if let Some(value) = ctx.read_value::<i32>("in").await? {
            seen.borrow_mut().push(value);
          }
          Ok(())
        }
      })
  };

  let mut graph = Graph::new("repeat");
  graph.connect(&producer, "out", &consumer, "in", None).unwrap();
  let (calls, callback) = counter();
  graph.run(callback).unwrap();

  assert_eq!(*seen.borrow(), [1, 2, 3]);
  assert_eq!(consumer.runs(), 3);
  assert_eq!(producer.runs(), 1);
  assert_eq!(calls.get(), 1);
}

#[test]
fn test_repeat_body_ignoring_input_stalls_instead_of_spinning() {
  let producer = source("producer", vec![1]);
  let idle = Component::builder("idle")
    .input("in")
    .activation(ActivationMode::Repeat)
    .build(|_ctx| async { Ok(()) });

  let mut graph = Graph::new("idle");
  let connection = graph.connect(&producer, "out", &idle, "in", None).unwrap();
  let (calls, callback) = counter();
  graph.run(callback).unwrap();

  assert_eq!(graph.status(), GraphStatus::Stalled);
  assert_eq!(graph.pending_components(), ["idle"]);
  assert_eq!(producer.status(), ComponentStatus::Done);
  assert_eq!(idle.status(), ComponentStatus::Activated);
  assert_eq!(idle.runs(), 1);
  assert_eq!(connection.len(), 1);
  assert_eq!(calls.get(), 0);
}

#[test]
fn test_repeat_with_initial_and_streamed_inputs() {
  let seen = Rc::new(RefCell::new(Vec::new()));
  let offset = Rc::new(Cell::new(0));
  let producer = source("producer", vec![1, 2, 3]);
  let adder = {
    let seen = Rc::clone(&seen);
    let offset = Rc::clone(&offset);
    Component::builder("adder")
      .inputs(["config", "in"])
      .activation(ActivationMode::Repeat)
      .build(move |ctx| {
        let seen = Rc::clone(&seen);
        let offset = Rc::clone(&offset);
        async move {
          // The initial packet is only there on the first run.
          if let Some(value) = ctx.read_value::<i32>("config").await? {
            offset.set(value);
          }
          if let Some(value) = ctx.read_value::<i32>("in").await? {
            seen.borrow_mut().push(value + offset.get());
          }
          Ok(())
        }
      })
  };

  let mut graph = Graph::new("adder");
  graph
    .initialize(&adder, Seeds::new().with("config", 100i32))
    .unwrap();
  graph.connect(&producer, "out", &adder, "in", None).unwrap();
  let (calls, callback) = counter();
  let starters = graph.run(callback).unwrap();

  assert_eq!(names(&starters), ["producer"]);
  assert_eq!(*seen.borrow(), [101, 102, 103]);
  assert_eq!(adder.runs(), 3);
  assert_eq!(adder.status(), ComponentStatus::Done);
  assert_eq!(graph.status(), GraphStatus::Completed);
  assert_eq!(calls.get(), 1);
}

#[test]
fn test_parked_consumer_alternates_running_and_activated() {
  let seen = Rc::new(RefCell::new(Vec::new()));
  let producer = source("producer", vec![1, 2, 3]);
  let consumer = sink("consumer", &seen);
  let statuses = Rc::new(RefCell::new(Vec::new()));
  let log = Rc::clone(&statuses);
  consumer.subscribe(move |change| log.borrow_mut().push((change.from, change.to)));

  let mut graph = Graph::new("churn");
  graph
    .connect(&producer, "out", &consumer, "in", Some(1))
    .unwrap();
  graph.run(|| {}).unwrap();

  let statuses = statuses.borrow();
  assert_eq!(statuses.last(), Some(&(ComponentStatus::Running, ComponentStatus::Done)));
  // Each wake is one Activated -> Running step, each park one Running -> Activated step.
  for pair in statuses.windows(2) {
    assert_eq!(pair[0].1, pair[1].0);
  }
  let parks = statuses
    .iter()
    .filter(|change| **change == (ComponentStatus::Running, ComponentStatus::Activated))
    .count();
  let wakes = statuses
    .iter()
    .filter(|change| **change == (ComponentStatus::Activated, ComponentStatus::Running))
    .count();
  assert_eq!(wakes, parks + 1);
  assert_eq!(*seen.borrow(), [1, 2, 3]);
}

#[test]
fn test_failed_body_still_completes_graph() {
  let seen = Rc::new(RefCell::new(Vec::new()));
  let broken = Component::builder("broken")
    .output("out")
    .build(|_ctx| async { Err(ComponentError::other("boom")) });
  let consumer = sink("consumer", &seen);

  let mut graph = Graph::new("failure");
  graph.connect(&broken, "out", &consumer, "in", Some(1)).unwrap();
  let (calls, callback) = counter();
  graph.run(callback).unwrap();

  assert_eq!(broken.failure().as_deref(), Some("boom"));
  assert!(consumer.failure().is_none());
  assert!(seen.borrow().is_empty());
  assert_eq!(calls.get(), 1);
  assert_eq!(graph.status(), GraphStatus::Completed);
}

#[test]
fn test_send_to_finished_consumer_fails_producer() {
  let producer = source("producer", vec![1, 2, 3]);
  let consumer = Component::builder("consumer")
    .input("in")
    .build(|ctx| async move {
      ctx.read("in").await?;
      Ok(())
    });

  let mut graph = Graph::new("disconnect");
  graph
    .connect(&producer, "out", &consumer, "in", Some(1))
    .unwrap();
  let (calls, callback) = counter();
  graph.run(callback).unwrap();

  let failure = producer.failure().unwrap();
  assert!(failure.contains("lost its consumer"), "{failure}");
  assert_eq!(calls.get(), 1);
}

#[test]
fn test_cycle_without_packets_stalls() {
  let ping = Component::builder("ping")
    .input("in")
    .output("out")
    .build(|ctx| async move {
      while let Some(packet) = ctx.read("in").await? {
        ctx.send_packet("out", packet).await?;
      }
      Ok(())
    });
  let pong = Component::builder("pong")
    .input("in")
    .output("out")
    .build(|ctx| async move {
      while let Some(packet) = ctx.read("in").await? {
        ctx.send_packet("out", packet).await?;
      }
      Ok(())
    });

  let mut graph = Graph::new("cycle");
  graph.connect(&ping, "out", &pong, "in", Some(1)).unwrap();
  graph.connect(&pong, "out", &ping, "in", Some(1)).unwrap();

  let (calls, callback) = counter();
  let starters = graph.run(callback).unwrap();

  assert!(starters.is_empty());
  assert_eq!(calls.get(), 0);
  assert_eq!(graph.status(), GraphStatus::Stalled);
  assert_eq!(graph.pending_components(), ["ping", "pong"]);
}

#[test]
fn test_empty_graph_completes_immediately() {
  let mut graph = Graph::new("empty");
  let (calls, callback) = counter();
  let starters = graph.run(callback).unwrap();
  assert!(starters.is_empty());
  assert_eq!(calls.get(), 1);
  assert_eq!(graph.status(), GraphStatus::Completed);
}

#[test]
fn test_standalone_component_runs_as_starter() {
  let ran = Rc::new(Cell::new(false));
  let flag = Rc::clone(&ran);
  let lonely = Component::builder("lonely").build(move |_ctx| {
    let flag = Rc::clone(&flag);
    async move {
      flag.set(true);
      Ok(())
    }
  });

  let mut graph = Graph::new("lonely");
  graph.add(&lonely).unwrap();
  graph.add(&lonely).unwrap();
  assert_eq!(graph.components().len(), 1);

  let (calls, callback) = counter();
  graph.run(callback).unwrap();
  assert!(ran.get());
  assert_eq!(calls.get(), 1);
}

// ============================================================================
// Wiring
// ============================================================================

#[test]
fn test_output_port_cannot_fan_out() {
  let seen = Rc::new(RefCell::new(Vec::new()));
  let a = source("a", vec![1]);
  let b = sink("b", &seen);
  let c = sink("c", &seen);

  let mut graph = Graph::new("fanout");
  let original = graph.connect(&a, "out", &b, "in", Some(1)).unwrap();

  assert_eq!(
    graph.connect(&a, "out", &c, "in", Some(1)).unwrap_err(),
    GraphError::OutputAlreadyBound {
      component: "a".to_string(),
      port: "out".to_string(),
    }
  );
  assert!(c.input("in").is_none());
  assert!(!graph.contains(&c));
  let bound = a.output("out").and_then(|p| p.connection()).unwrap();
  assert!(bound.ptr_eq(&original));
  assert_eq!(graph.connections().len(), 1);
}

#[test]
fn test_input_port_accepts_one_connection() {
  let seen = Rc::new(RefCell::new(Vec::new()));
  let a = source("a", vec![1]);
  let other = source("other", vec![2]);
  let b = sink("b", &seen);

  let mut graph = Graph::new("fanin");
  let original = graph.connect(&a, "out", &b, "in", Some(1)).unwrap();

  assert!(matches!(
    graph.connect(&other, "out", &b, "in", Some(1)),
    Err(GraphError::InputAlreadyBound { .. })
  ));
  assert!(other.output("out").is_none());
  assert!(
    b.input("in")
      .and_then(|p| p.connection())
      .unwrap()
      .ptr_eq(&original)
  );

  assert!(matches!(
    graph.initialize(&b, Seeds::single(5)),
    Err(GraphError::InputAlreadyBound { .. })
  ));
}

#[test]
fn test_reconnecting_same_pair_returns_existing_connection() {
  let seen = Rc::new(RefCell::new(Vec::new()));
  let a = source("a", vec![1]);
  let b = sink("b", &seen);

  let mut graph = Graph::new("idempotent");
  let first = graph.connect(&a, "out", &b, "in", Some(1)).unwrap();
  let second = graph.connect(&a, "out", &b, "in", Some(4)).unwrap();
  assert!(first.ptr_eq(&second));
  assert_eq!(second.capacity(), Some(1));
  assert_eq!(graph.connections().len(), 1);
}

#[test]
fn test_unknown_ports_rejected() {
  let seen = Rc::new(RefCell::new(Vec::new()));
  let a = source("a", vec![1]);
  let b = sink("b", &seen);
  let mut graph = Graph::new("unknown");

  assert_eq!(
    graph.connect(&a, "missing", &b, "in", None).unwrap_err(),
    GraphError::UnknownPort {
      component: "a".to_string(),
      port: "missing".to_string(),
      direction: PortDirection::Output,
    }
  );
  assert_eq!(
    graph.connect(&a, "out", &b, "missing", None).unwrap_err(),
    GraphError::UnknownPort {
      component: "b".to_string(),
      port: "missing".to_string(),
      direction: PortDirection::Input,
    }
  );
  assert!(graph.components().is_empty());
}

#[test]
fn test_initialize_validates_all_seeds_before_binding() {
  let c = Component::builder("c")
    .inputs(["a", "b"])
    .build(|_ctx| async { Ok(()) });
  let mut graph = Graph::new("seeds");

  assert_eq!(
    graph.initialize(&c, Seeds::new()).unwrap_err(),
    GraphError::EmptySeeds("c".to_string())
  );
  assert!(matches!(
    graph.initialize(&c, Seeds::new().with("a", 1).with("zzz", 2)),
    Err(GraphError::UnknownPort { .. })
  ));
  assert!(c.input("a").is_none());
  assert!(graph.connections().is_empty());
}

#[test]
fn test_capacity_rules() {
  let seen = Rc::new(RefCell::new(Vec::new()));
  let a = source("a", vec![1]);
  let b = sink("b", &seen);

  let mut graph = Graph::with_config(GraphConfig::new("capacity").with_default_capacity(2));
  assert_eq!(
    graph.connect(&a, "out", &b, "in", Some(0)).unwrap_err(),
    GraphError::InvalidCapacity
  );
  let connection = graph.connect(&a, "out", &b, "in", None).unwrap();
  assert_eq!(connection.capacity(), Some(2));
}

#[test]
fn test_run_rejects_unbound_inputs() {
  let seen = Rc::new(RefCell::new(Vec::new()));
  let b = sink("b", &seen);
  let mut graph = Graph::new("unbound");
  graph.add(&b).unwrap();

  assert_eq!(
    graph.run(|| {}).unwrap_err(),
    GraphError::UnboundInput {
      component: "b".to_string(),
      port: "in".to_string(),
    }
  );
  assert!(!graph.is_sealed());
  assert_eq!(graph.status(), GraphStatus::Wiring);

  graph.initialize(&b, Seeds::single(3)).unwrap();
  graph.run(|| {}).unwrap();
  assert_eq!(*seen.borrow(), [3]);
}

#[test]
fn test_wiring_after_run_is_rejected() {
  let seen = Rc::new(RefCell::new(Vec::new()));
  let a = source("a", vec![1]);
  let b = sink("b", &seen);
  let extra = sink("extra", &seen);

  let mut graph = Graph::new("sealed");
  graph.connect(&a, "out", &b, "in", None).unwrap();
  graph.run(|| {}).unwrap();
  assert!(graph.is_sealed());

  let sealed = GraphError::Sealed("sealed".to_string());
  assert_eq!(graph.add(&extra).unwrap_err(), sealed);
  assert_eq!(
    graph.initialize(&extra, Seeds::single(1)).unwrap_err(),
    sealed
  );
  assert_eq!(
    graph.connect(&a, "out", &extra, "in", None).unwrap_err(),
    sealed
  );
  assert_eq!(graph.run(|| {}).unwrap_err(), sealed);
  assert!(extra.input("in").is_none());
}

#[test]
fn test_find_component_by_name() {
  let seen = Rc::new(RefCell::new(Vec::new()));
  let a = source("a", vec![1]);
  let b = sink("b", &seen);
  let mut graph = Graph::new("lookup");
  graph.connect(&a, "out", &b, "in", None).unwrap();

  assert!(graph.find_component("b").unwrap().ptr_eq(&b));
  assert!(graph.find_component("zzz").is_none());
  assert_eq!(graph.name(), "lookup");
}
