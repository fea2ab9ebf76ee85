mod common;

use common::*;
use libdn::fir::*;
use libdn::{Annotation, Config, Fame1Pass, PassOutput, ReferenceTarget, StaticAnalysis, TransformError};
use test_case::test_case;

fn dual_clock_circuit() -> Circuit { Circuit::new("Top", vec![dual_clock_top(), dual_clock_module()]) }

fn dual_clock_top_analysis() -> StaticAnalysis {
    let mut analysis = dual_clock_analysis();
    add_dual_clock_top_channels(&mut analysis);
    analysis
}

fn run(circuit: &Circuit, analysis: &StaticAnalysis, annotations: Vec<Annotation>) -> Result<PassOutput, TransformError> {
    init_logger();
    Fame1Pass::new(Config::default()).run(circuit, analysis, annotations)
}

#[test_case("Dual", "clock_a", "clock_sink.bits.a")]
#[test_case("Dual", "in_b", "in_b_sink.bits")]
#[test_case("Dual", "out_a", "out_a_source.bits")]
#[test_case("Top", "clock_b", "clock_sink.bits.b")]
#[test_case("Top", "in_a", "in_a_sink.bits")]
#[test_case("Top", "out_b", "out_b_source.bits")]
fn ports_are_renamed_into_channels(module: &str, port: &str, reference: &str) {
    let output = run(&dual_clock_circuit(), &dual_clock_top_analysis(), Vec::new()).unwrap();

    assert_eq!(
        output.renames.get(&ReferenceTarget::new(module, port)),
        Some(&ReferenceTarget::new(module, reference))
    );
}

#[test]
fn every_channelized_port_is_renamed_once() {
    let circuit = dual_clock_circuit();
    let output = run(&circuit, &dual_clock_top_analysis(), Vec::new()).unwrap();

    let expected = ["Dual", "Top"]
        .iter()
        .flat_map(|module| circuit.module(module).unwrap().ports.iter().map(move |port| ReferenceTarget::new(*module, port.name.clone())))
        .collect::<Vec<_>>();
    let renamed = output.renames.iter().map(|(from, _)| from.clone()).collect::<Vec<_>>();

    assert_eq!(renamed, expected);
}

#[test]
fn timestamped_top_channel_renames_into_data() {
    let mut analysis = dual_clock_analysis();
    analysis.set_timestamp("clock").set_timestamp("in_a");
    add_dual_clock_top_channels(&mut analysis);
    let output = run(&dual_clock_circuit(), &analysis, Vec::new()).unwrap();

    assert_eq!(
        output.renames.get(&ReferenceTarget::new("Top", "in_a")).unwrap().to_string(),
        "Top>in_a_sink.bits.data"
    );
    assert_eq!(
        output.renames.get(&ReferenceTarget::new("Dual", "clock_b")).unwrap().to_string(),
        "Dual>clock_sink.bits.data.b"
    );
}

#[test]
fn clock_gate_is_declared_once() {
    let mut circuit = dual_clock_circuit();
    let output = run(&circuit, &dual_clock_top_analysis(), Vec::new()).unwrap();
    assert_eq!(output.circuit.ext_modules.len(), 1);

    circuit.ext_modules = output.circuit.ext_modules.clone();
    let output = run(&circuit, &dual_clock_top_analysis(), Vec::new()).unwrap();
    assert_eq!(output.circuit.ext_modules.len(), 1);

    let text = output.circuit.to_string();
    assert!(text.contains("extmodule ClockGateBuffer :"));
    assert!(text.contains("input CE : UInt<1>"));
    assert!(text.contains("defname = ClockGateBuffer"));
}

#[test]
fn circuit_modules_are_replaced_in_place() {
    let output = run(&dual_clock_circuit(), &dual_clock_top_analysis(), Vec::new()).unwrap();
    let names = output.circuit.modules.iter().map(|module| module.name.as_str()).collect::<Vec<_>>();

    assert_eq!(names, vec!["Top", "Dual"]);
    assert!(output.circuit.module("Dual").unwrap().port("clock_sink").is_some());
    assert!(output.circuit.module("Top").unwrap().port("clock_a").is_none());
}

#[test]
fn dont_touch_of_transformed_modules_is_pruned() {
    let annotations = vec![
        Annotation::DontTouch(ReferenceTarget::new("Dual", "ra")),
        Annotation::DontTouch(ReferenceTarget::new("Top", "dual")),
        Annotation::NoDedup { module: "Dual".to_string() },
    ];
    let output = run(&dual_clock_circuit(), &dual_clock_top_analysis(), annotations).unwrap();

    assert_eq!(output.annotations, vec![
        Annotation::DontTouch(ReferenceTarget::new("Top", "dual")),
        Annotation::NoDedup { module: "Dual".to_string() },
    ]);
}

#[test]
fn missing_target_module_aborts() {
    let mut analysis = dual_clock_top_analysis();
    analysis.add_transformed_module("Missing");

    assert_eq!(
        run(&dual_clock_circuit(), &analysis, Vec::new()).unwrap_err(),
        TransformError::UnknownModule("Missing".to_string())
    );
}

#[test]
fn missing_main_module_aborts() {
    let circuit = Circuit::new("Nowhere", vec![dual_clock_module()]);

    assert_eq!(
        run(&circuit, &dual_clock_top_analysis(), Vec::new()).unwrap_err(),
        TransformError::UnknownModule("Nowhere".to_string())
    );
}

#[test]
fn dropped_top_ports_are_recorded_as_deleted() {
    let mut analysis = StaticAnalysis::new();
    add_single_clock_channels(&mut analysis, "Adder");
    analysis
        .add_top_channel("io", Direction::Input, &["io_x", "io_y"])
        .add_top_channel("out", Direction::Output, &["out"])
        .add_stale_top_port("debug");

    let mut top = single_clock_module("Top");
    top.ports.push(Port::output("debug", Type::uint(1)));
    top.body = Statement::block(vec![Statement::def_inst("adder", "Adder")]);
    let circuit = Circuit::new("Top", vec![top, single_clock_module("Adder")]);
    let output = run(&circuit, &analysis, Vec::new()).unwrap();

    let renamed = output
        .renames
        .iter()
        .filter(|(from, _)| from.module == "Top")
        .map(|(from, to)| format!("{} -> {}", from.reference, to.map_or("(deleted)", |to| to.reference.as_str())))
        .collect::<Vec<_>>();
    assert_eq!(renamed, vec![
        "io_x -> io_sink.bits.x",
        "io_y -> io_sink.bits.y",
        "out -> out_source.bits",
        "clock -> (deleted)",
        "debug -> (deleted)",
    ]);
    assert!(output.renames.is_deleted(&ReferenceTarget::new("Top", "debug")));
}
