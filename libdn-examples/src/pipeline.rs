//! Two single-clock stages chained inside the top module.

use libdn::fir::*;
use libdn::StaticAnalysis;

fn stage() -> Module {
    Module {
        name: "Stage".to_string(),
        ports: vec![
            Port::input("clock", Type::clock()),
            Port::input("io_lhs", Type::uint(16)),
            Port::input("io_rhs", Type::uint(16)),
            Port::output("sum", Type::uint(16)),
        ],
        body: Statement::block(vec![Statement::connect(
            Expression::reference("sum"),
            Expression::do_prim(PrimOp::Add, vec![Expression::reference("io_lhs"), Expression::reference("io_rhs")], vec![]),
        )]),
    }
}

fn top() -> Module {
    let port = |instance: &str, port: &str| Expression::sub_field(Expression::reference(instance), port);
    Module {
        name: "Top".to_string(),
        ports: stage().ports,
        body: Statement::block(vec![
            Statement::def_inst("first", "Stage"),
            Statement::def_inst("second", "Stage"),
            Statement::connect(port("first", "clock"), Expression::reference("clock")),
            Statement::connect(port("second", "clock"), Expression::reference("clock")),
            Statement::connect(port("first", "io_lhs"), Expression::reference("io_lhs")),
            Statement::connect(port("first", "io_rhs"), Expression::reference("io_rhs")),
            Statement::connect(port("second", "io_lhs"), port("first", "sum")),
            Statement::connect(port("second", "io_rhs"), port("first", "sum")),
            Statement::connect(Expression::reference("sum"), port("second", "sum")),
        ]),
    }
}

/// The circuit and the channel analysis describing it.
pub(crate) fn circuit() -> (Circuit, StaticAnalysis) {
    let mut analysis = StaticAnalysis::new();
    analysis
        .add_input_channel("Stage", "io", Some("clock"), &["io_lhs", "io_rhs"])
        .add_output_channel("Stage", "sum", Some("clock"), &["sum"])
        .add_edge("Stage", "sum", "io_lhs")
        .add_edge("Stage", "sum", "io_rhs")
        .add_transformed_module("Stage")
        .add_top_channel("io", Direction::Input, &["io_lhs", "io_rhs"])
        .add_top_channel("sum", Direction::Output, &["sum"]);

    (Circuit::new("Top", vec![top(), stage()]), analysis)
}
