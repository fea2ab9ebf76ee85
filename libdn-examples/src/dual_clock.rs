//! Two clock domains sharing one module: a fast counter sampled by a slow register.

use libdn::fir::*;
use libdn::StaticAnalysis;

fn reg(name: &str, clock: &str, width: usize) -> Statement {
    Statement::def_reg(
        name,
        Type::uint(width),
        Expression::reference(clock),
        Expression::reference("in_reset"),
        Expression::literal(0, width),
    )
}

fn sampler() -> Module {
    Module {
        name: "Sampler".to_string(),
        ports: vec![
            Port::input("clock_fast", Type::clock()),
            Port::input("clock_slow", Type::clock()),
            Port::input("in_reset", Type::uint(1)),
            Port::input("in_step", Type::uint(8)),
            Port::output("count", Type::uint(8)),
            Port::output("sample", Type::uint(8)),
        ],
        body: Statement::block(vec![
            reg("counter", "clock_fast", 8),
            reg("sampled", "clock_slow", 8),
            Statement::connect(
                Expression::reference("counter"),
                Expression::do_prim(
                    PrimOp::Add,
                    vec![Expression::reference("counter"), Expression::reference("in_step")],
                    vec![],
                ),
            ),
            Statement::connect(Expression::reference("sampled"), Expression::reference("counter")),
            Statement::connect(Expression::reference("count"), Expression::reference("counter")),
            Statement::connect(Expression::reference("sample"), Expression::reference("sampled")),
        ]),
    }
}

fn top() -> Module {
    let sampler = |port: &str| Expression::sub_field(Expression::reference("sampler"), port);
    Module {
        name: "Top".to_string(),
        ports: self::sampler().ports,
        body: Statement::block(vec![
            Statement::def_inst("sampler", "Sampler"),
            Statement::connect(sampler("clock_fast"), Expression::reference("clock_fast")),
            Statement::connect(sampler("clock_slow"), Expression::reference("clock_slow")),
            Statement::connect(sampler("in_reset"), Expression::reference("in_reset")),
            Statement::connect(sampler("in_step"), Expression::reference("in_step")),
            Statement::connect(Expression::reference("count"), sampler("count")),
            Statement::connect(Expression::reference("sample"), sampler("sample")),
        ]),
    }
}

/// The circuit and the channel analysis describing it.
pub(crate) fn circuit() -> (Circuit, StaticAnalysis) {
    let mut analysis = StaticAnalysis::new();
    analysis
        .add_input_channel("Sampler", "clock", None, &["clock_fast", "clock_slow"])
        .add_input_channel("Sampler", "in", Some("clock_fast"), &["in_reset", "in_step"])
        .add_output_channel("Sampler", "count", Some("clock_fast"), &["count"])
        .add_output_channel("Sampler", "sample", Some("clock_slow"), &["sample"])
        .add_edge("Sampler", "count", "counter")
        .add_edge("Sampler", "sample", "sampled")
        .add_transformed_module("Sampler")
        .set_timestamp("clock")
        .set_timestamp("sample")
        .add_top_channel("clock", Direction::Input, &["clock_fast", "clock_slow"])
        .add_top_channel("in", Direction::Input, &["in_reset", "in_step"])
        .add_top_channel("count", Direction::Output, &["count"])
        .add_top_channel("sample", Direction::Output, &["sample"]);

    (Circuit::new("Top", vec![top(), sampler()]), analysis)
}
