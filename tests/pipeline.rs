use fbpweave::{
  ActivationMode, Component, ComponentContext, ComponentError, ComponentLogic, ComponentStatus,
  Graph, GraphConfig, GraphStatus, Seeds,
};
use futures::future::LocalBoxFuture;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn init_tracing() {
  let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// A transformer written as a struct instead of a closure
struct Scale {
  factor: i64,
}

impl ComponentLogic for Scale {
  fn execute(&self, ctx: ComponentContext) -> LocalBoxFuture<'static, Result<(), ComponentError>> {
    let factor = self.factor;
    Box::pin(async move {
      if let Some(value) = ctx.read_value::<i64>("in").await? {
        ctx.send("out", value * factor).await?;
      }
      Ok(())
    })
  }
}

fn numbers() -> Component {
  Component::builder("numbers")
    .input("count")
    .output("out")
    .build(|ctx| async move {
      let count = ctx.read_value::<i64>("count").await?.unwrap_or(0);
      for n in 1..=count {
        ctx.send("out", n).await?;
      }
      Ok(())
    })
}

fn collector(seen: &Rc<RefCell<Vec<i64>>>) -> Component {
  let seen = Rc::clone(seen);
  Component::builder("collector").input("in").build(move |ctx| {
    let seen = Rc::clone(&seen);
    async move {
      while let Some(value) = ctx.read_value::<i64>("in").await? {
        seen.borrow_mut().push(value);
      }
      Ok(())
    }
  })
}

#[test]
fn test_three_stage_pipeline() {
  init_tracing();
  let seen = Rc::new(RefCell::new(Vec::new()));
  let source = numbers();
  let scale = Component::builder("scale")
    .input("in")
    .output("out")
    .activation(ActivationMode::Repeat)
    .build_with(Scale { factor: 3 });
  let sink = collector(&seen);

  let config = GraphConfig::from_json_str(
    r#"{ "name": "pipeline", "default_capacity": 1, "trace_state_changes": true }"#,
  )
  .unwrap();
  let mut graph = Graph::with_config(config);
  graph.initialize(&source, Seeds::new().with("count", 4i64)).unwrap();
  graph.connect(&source, "out", &scale, "in", None).unwrap();
  graph.connect(&scale, "out", &sink, "in", None).unwrap();
  assert!(
    graph
      .connections()
      .iter()
      .filter(|c| !c.is_initial())
      .all(|c| c.capacity() == Some(1))
  );

  let finished = Rc::new(Cell::new(0));
  let hits = Rc::clone(&finished);
  let starters = graph.run(move || hits.set(hits.get() + 1)).unwrap();

  assert_eq!(starters.len(), 1);
  assert!(starters[0].ptr_eq(&source));
  assert_eq!(*seen.borrow(), [3, 6, 9, 12]);
  assert_eq!(scale.runs(), 4);
  assert_eq!(finished.get(), 1);
  assert_eq!(graph.status(), GraphStatus::Completed);
  assert!(
    [&source, &scale, &sink]
      .iter()
      .all(|c| c.status() == ComponentStatus::Done)
  );
}

#[test]
fn test_status_transitions_observed_in_order() {
  init_tracing();
  let seen = Rc::new(RefCell::new(Vec::new()));
  let source = numbers();
  let sink = collector(&seen);

  let transitions = Rc::new(RefCell::new(Vec::new()));
  let log = Rc::clone(&transitions);
  sink.subscribe(move |change| log.borrow_mut().push(change.to));
  assert_eq!(sink.status(), ComponentStatus::Uninitialized);

  let mut graph = Graph::new("observed");
  graph.initialize(&source, Seeds::new().with("count", 2i64)).unwrap();
  graph.connect(&source, "out", &sink, "in", Some(1)).unwrap();
  graph.run(|| {}).unwrap();

  let transitions = transitions.borrow();
  assert_eq!(transitions.first(), Some(&ComponentStatus::Initialized));
  assert_eq!(transitions.get(1), Some(&ComponentStatus::Activated));
  assert_eq!(transitions.last(), Some(&ComponentStatus::Done));
  assert!(transitions.contains(&ComponentStatus::Running));
  assert_eq!(*seen.borrow(), [1, 2]);
}
