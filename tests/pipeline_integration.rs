//! End-to-end pipeline behaviour: delivery, faults, merges and shutdown.

mod common;

use common::builders::FailingStage;
use common::mock_helpers::RecordingHandler;
use flowline::pipeline::nodes::{Broadcast, Interleave, MapStage, PassThrough};
use flowline::pipeline::{
    AnyNode, GenericInputChannel, Message, NodeOutcome, OutputChannel, PipelineBuilder,
    PipelineError, PopResult, Processable, Typed,
};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

fn passthrough(name: &str) -> AnyNode {
    AnyNode::stage(PassThrough::new(name))
}

/// Weighs each `(u32, String)` message as weight times label length.
struct Weigher;

impl Processable for Weigher {
    fn process(&self, input: GenericInputChannel, output: OutputChannel) -> anyhow::Result<()> {
        for pair in input.typed_all::<(u32, String)>() {
            let (weight, label) = pair?;
            output.push(weight as u64 * label.len() as u64)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "weigher"
    }
}

#[test]
fn test_fault_in_middle_stage() {
    let handler = Arc::new(RecordingHandler::new());
    let mut builder = PipelineBuilder::new().error_handler(handler.clone());
    builder
        .add_chain([
            passthrough("A"),
            AnyNode::stage(FailingStage::new("B", 1)),
            passthrough("C"),
        ])
        .unwrap();

    let mut pipeline = builder.start().unwrap();
    let output = pipeline.take_output("C.out").unwrap();
    pipeline.push(String::from("m1")).unwrap();
    pipeline.push(String::from("m2")).unwrap();

    let received = common::drain_typed::<String>(output);
    assert_eq!(received, vec!["m1".to_string()]);

    // B is dead by now; A still accepts and forwards.
    pipeline.push(String::from("m3")).unwrap();

    let report = pipeline.join();
    assert_eq!(report.outcome("A"), Some(&NodeOutcome::Completed));
    assert_eq!(report.outcome("C"), Some(&NodeOutcome::Completed));
    assert!(report.outcome("B").is_some_and(NodeOutcome::is_faulted));
    assert_eq!(handler.nodes(), vec!["B".to_string()]);
}

#[test]
fn test_fault_in_merge_input_leaves_sibling_running() {
    let handler = Arc::new(RecordingHandler::new());
    let mut builder = PipelineBuilder::new()
        .with_capacity(Some(1))
        .error_handler(handler.clone());
    let fan = builder.add_branch(Broadcast::new("fan"), ["a", "b"]).unwrap();
    let bad = builder.add_stage(FailingStage::new("bad", 0)).unwrap();
    let good = builder.add_node(passthrough("good")).unwrap();
    let merge = builder.add_merge(Interleave::new("merge"), ["a", "b"]).unwrap();
    builder.connect_ports(fan, "a", bad, "in").unwrap();
    builder.connect_ports(fan, "b", good, "in").unwrap();
    builder.connect_ports(bad, "out", merge, "a").unwrap();
    builder.connect_ports(good, "out", merge, "b").unwrap();

    let mut pipeline = builder.start().unwrap();
    let output = pipeline.take_output("merge.out").unwrap();
    let reader = thread::spawn(move || common::drain_typed::<u32>(output));

    for i in 0..50u32 {
        pipeline.push(i).unwrap();
    }
    let report = pipeline.join();

    assert_eq!(reader.join().unwrap(), (0..50).collect::<Vec<_>>());
    assert_eq!(report.outcome("fan"), Some(&NodeOutcome::Completed));
    assert_eq!(handler.nodes(), vec!["bad".to_string()]);
}

#[test]
fn test_merge_with_one_silent_branch() {
    let mut builder = PipelineBuilder::new();
    let left = builder.add_node(passthrough("left")).unwrap();
    let right = builder.add_node(passthrough("right")).unwrap();
    let merge = builder.add_merge(Interleave::new("merge"), ["l", "r"]).unwrap();
    builder.connect_ports(left, "out", merge, "l").unwrap();
    builder.connect_ports(right, "out", merge, "r").unwrap();

    let mut pipeline = builder.start().unwrap();
    let output = pipeline.take_output("merge.out").unwrap();

    pipeline.push_to("left.in", Message::new(1i32)).unwrap();
    pipeline.push_to("left.in", Message::new(2i32)).unwrap();
    pipeline.close_inputs();

    assert_eq!(common::drain_typed::<i32>(output), vec![1, 2]);
    assert!(pipeline.join().is_success());
}

#[test]
fn test_broadcast_then_merge_diamond() {
    let mut builder = PipelineBuilder::new();
    let fan = builder.add_branch(Broadcast::new("fan"), ["a", "b"]).unwrap();
    let a = builder
        .add_stage(Typed(MapStage::new("plus", |x: i64| Ok(x + 1000))))
        .unwrap();
    let b = builder
        .add_stage(Typed(MapStage::new("minus", |x: i64| Ok(-x))))
        .unwrap();
    let merge = builder.add_merge(Interleave::new("merge"), ["a", "b"]).unwrap();
    builder.connect_ports(fan, "a", a, "in").unwrap();
    builder.connect_ports(fan, "b", b, "in").unwrap();
    builder.connect_ports(a, "out", merge, "a").unwrap();
    builder.connect_ports(b, "out", merge, "b").unwrap();

    let mut pipeline = builder.start().unwrap();
    assert_eq!(pipeline.stats().total_nodes, 4);
    let output = pipeline.take_output("merge.out").unwrap();

    for i in 1..=20i64 {
        pipeline.push(i).unwrap();
    }
    let report = pipeline.join();
    assert!(report.is_success());

    let mut merged = common::drain_typed::<i64>(output);
    merged.sort_unstable();
    let mut expected: Vec<i64> = (1..=20).flat_map(|i| [i + 1000, -i]).collect();
    expected.sort_unstable();
    assert_eq!(merged, expected);
}

#[test]
fn test_tuple_stage_and_type_mismatch() {
    let handler = Arc::new(RecordingHandler::new());
    let mut builder = PipelineBuilder::new().error_handler(handler.clone());
    builder.add_stage(Weigher).unwrap();

    let mut pipeline = builder.start().unwrap();
    let output = pipeline.take_output("weigher.out").unwrap();

    // Chunk order does not matter for tuple extraction.
    pipeline
        .push_message(Message::new(String::from("abc")).with(4u32))
        .unwrap();
    pipeline.push(7u32).unwrap();

    assert_eq!(common::drain_typed::<u64>(output), vec![12]);
    let report = pipeline.join();
    assert!(!report.is_success());

    let faults = handler.faults();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].0, "weigher");
    assert!(faults[0].1.contains("Type mismatch"));
}

#[test]
fn test_escalation_tears_down_without_further_input() {
    let (builder, handler) = PipelineBuilder::new().escalate_faults();
    let mut builder = builder;
    builder
        .add_chain([
            passthrough("head"),
            AnyNode::stage(FailingStage::new("fragile", 0)),
            passthrough("tail"),
        ])
        .unwrap();

    let mut pipeline = builder.start().unwrap();
    let output = pipeline.take_output("tail.out").unwrap();
    pipeline.push(1u8).unwrap();

    assert!(matches!(
        output.pop_timeout(common::test_timeout()),
        PopResult::Closed
    ));

    // Nothing else is pushed: the head must end because its entry was closed.
    let deadline = Instant::now() + common::test_timeout();
    while !pipeline.is_finished() {
        assert!(Instant::now() < deadline, "nodes still running after abort");
        thread::yield_now();
    }

    assert!(pipeline.is_aborted());
    assert_eq!(pipeline.is_input_closed("head.in"), Some(true));
    assert!(matches!(pipeline.push(2u8), Err(PipelineError::Aborted)));

    let report = pipeline.join();
    assert_eq!(report.outcome("head"), Some(&NodeOutcome::Completed));
    assert_eq!(report.outcome("tail"), Some(&NodeOutcome::Completed));
    assert_eq!(handler.faults().len(), 1);
    assert_eq!(handler.faults()[0].node, "fragile");
}

#[test]
fn test_entry_fed_from_another_thread() {
    let mut builder = PipelineBuilder::new().with_capacity(Some(2));
    builder
        .add_chain([passthrough("head"), passthrough("tail")])
        .unwrap();

    let mut pipeline = builder.start().unwrap();
    let mut input = pipeline.take_input("head.in").unwrap();
    let output = pipeline.take_output("tail.out").unwrap();

    // Bounded channels: the producer blocks until the consumer catches up.
    let producer = thread::spawn(move || {
        for i in 0..500u32 {
            input.push(i).unwrap();
        }
        input.close();
    });

    let received = common::drain_typed::<u32>(output);
    producer.join().unwrap();
    assert_eq!(received, (0..500).collect::<Vec<_>>());
    assert!(pipeline.join().is_success());
}

#[test]
fn test_drop_shuts_down() {
    let mut builder = PipelineBuilder::new();
    builder.add_node(passthrough("only")).unwrap();
    let mut pipeline = builder.start().unwrap();
    let output = pipeline.take_output("only.out").unwrap();
    pipeline.push(1u8).unwrap();

    drop(pipeline);
    assert_eq!(common::drain(output).len(), 1);
}
