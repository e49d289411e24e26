//! # Generator
//!
//! A seeded generator feeding a printer through a one-slot connection.
//!
//! The generator is configured entirely by initial packets: `length` values,
//! spaced `interval` apart. The printer is activated by the first packet and
//! keeps reading until the generator is done and the connection drains.
//!
//! Run with `RUST_LOG=debug` to see the component lifecycle.

use fbpweave::{Component, Graph, GraphConfig, Seeds};
use std::error::Error;

fn generator() -> Component {
  Component::builder("generator")
    .inputs(["length", "interval"])
    .output("out")
    .build(|ctx| async move {
      let length = ctx.read_value::<u64>("length").await?.unwrap_or(0);
      let interval = ctx.read_value::<u64>("interval").await?.unwrap_or(1);
      for n in 0..length {
        ctx.send("out", n * interval).await?;
      }
      Ok(())
    })
}

fn printer() -> Component {
  Component::builder("printer")
    .input("in")
    .build(|ctx| async move {
      while let Some(value) = ctx.read_value::<u64>("in").await? {
        println!("{}: {}", ctx.name(), value);
      }
      Ok(())
    })
}

fn main() -> Result<(), Box<dyn Error>> {
  tracing_subscriber::fmt::init();

  let config = GraphConfig::new("generator-demo").with_state_tracing(true);
  let mut graph = Graph::with_config(config);

  let generator = generator();
  let printer = printer();
  graph.initialize(
    &generator,
    Seeds::new().with("length", 3u64).with("interval", 10u64),
  )?;
  graph.connect(&generator, "out", &printer, "in", Some(1))?;

  let starters = graph.run(|| println!("all components finished"))?;
  println!(
    "started {:?}, graph {}",
    starters.iter().map(|c| c.name()).collect::<Vec<_>>(),
    graph.status()
  );
  Ok(())
}
