//! Fixtures and a small cycle-level simulator for transformed modules.

#![allow(dead_code)]

use std::collections::HashMap;

use libdn::fir::*;
use libdn::{Config, HostSignals, StaticAnalysis, TransformError, TransformedModule};

pub fn init_logger() { let _ = env_logger::builder().is_test(true).try_init(); }

fn uint8() -> Type { Type::uint(8) }

fn reg(name: &str, clock: &str) -> Statement {
    Statement::def_reg(name, uint8(), Expression::reference(clock), Expression::bool(false), Expression::literal(0, 8))
}

fn connect(loc: &str, expr: Expression) -> Statement { Statement::connect(Expression::reference(loc), expr) }

/// Two clock domains `a` and `b`. `out_b` depends combinationally on `in_b`; `out_a` only through a register.
pub fn dual_clock_module() -> Module {
    Module {
        name: "Dual".to_string(),
        ports: vec![
            Port::input("clock_a", Type::clock()),
            Port::input("clock_b", Type::clock()),
            Port::input("in_a", uint8()),
            Port::input("in_b", uint8()),
            Port::output("out_a", uint8()),
            Port::output("out_b", uint8()),
        ],
        body: Statement::block(vec![
            reg("ra", "clock_a"),
            reg("rb", "clock_b"),
            connect("ra", Expression::reference("in_a")),
            connect("rb", Expression::reference("in_b")),
            connect("out_a", Expression::reference("ra")),
            connect(
                "out_b",
                Expression::do_prim(PrimOp::Add, vec![Expression::reference("rb"), Expression::reference("in_b")], vec![]),
            ),
        ]),
    }
}

pub fn dual_clock_analysis() -> StaticAnalysis {
    let mut analysis = StaticAnalysis::new();
    analysis
        .add_input_channel("Dual", "clock", None, &["clock_a", "clock_b"])
        .add_input_channel("Dual", "in_a", Some("clock_a"), &["in_a"])
        .add_input_channel("Dual", "in_b", Some("clock_b"), &["in_b"])
        .add_output_channel("Dual", "out_a", Some("clock_a"), &["out_a"])
        .add_output_channel("Dual", "out_b", Some("clock_b"), &["out_b"])
        .add_edge("Dual", "out_a", "ra")
        .add_edge("Dual", "out_b", "rb")
        .add_edge("Dual", "out_b", "in_b")
        .add_transformed_module("Dual");
    analysis
}

/// Like `Dual`, but each output depends combinationally on the input of its domain.
pub fn paired_module() -> Module {
    let add = |reg: &str, input: &str| {
        Expression::do_prim(PrimOp::Add, vec![Expression::reference(reg), Expression::reference(input)], vec![])
    };
    Module {
        name: "Paired".to_string(),
        ports: dual_clock_module().ports,
        body: Statement::block(vec![
            reg("ra", "clock_a"),
            reg("rb", "clock_b"),
            connect("ra", Expression::reference("in_a")),
            connect("rb", Expression::reference("in_b")),
            connect("out_a", add("ra", "in_a")),
            connect("out_b", add("rb", "in_b")),
        ]),
    }
}

pub fn paired_analysis() -> StaticAnalysis {
    let mut analysis = StaticAnalysis::new();
    analysis
        .add_input_channel("Paired", "clock", None, &["clock_a", "clock_b"])
        .add_input_channel("Paired", "in_a", Some("clock_a"), &["in_a"])
        .add_input_channel("Paired", "in_b", Some("clock_b"), &["in_b"])
        .add_output_channel("Paired", "out_a", Some("clock_a"), &["out_a"])
        .add_output_channel("Paired", "out_b", Some("clock_b"), &["out_b"])
        .add_edge("Paired", "out_a", "ra")
        .add_edge("Paired", "out_a", "in_a")
        .add_edge("Paired", "out_b", "rb")
        .add_edge("Paired", "out_b", "in_b")
        .add_transformed_module("Paired");
    analysis
}

/// Single clock, one output fed by two input channels: `o <= add(a, b)`.
pub fn merge_module() -> Module {
    Module {
        name: "Merge".to_string(),
        ports: vec![
            Port::input("clock", Type::clock()),
            Port::input("a", uint8()),
            Port::input("b", uint8()),
            Port::output("o", uint8()),
        ],
        body: Statement::block(vec![connect(
            "o",
            Expression::do_prim(PrimOp::Add, vec![Expression::reference("a"), Expression::reference("b")], vec![]),
        )]),
    }
}

pub fn merge_analysis() -> StaticAnalysis {
    let mut analysis = StaticAnalysis::new();
    analysis
        .add_input_channel("Merge", "a", Some("clock"), &["a"])
        .add_input_channel("Merge", "b", Some("clock"), &["b"])
        .add_output_channel("Merge", "o", Some("clock"), &["o"])
        .add_edge("Merge", "o", "a")
        .add_edge("Merge", "o", "b")
        .add_transformed_module("Merge");
    analysis
}

/// Single clock, no clock channel: `out <= add(io_x, io_y)`.
pub fn single_clock_module(name: &str) -> Module {
    Module {
        name: name.to_string(),
        ports: vec![
            Port::input("clock", Type::clock()),
            Port::input("io_x", uint8()),
            Port::input("io_y", uint8()),
            Port::output("out", uint8()),
        ],
        body: Statement::block(vec![connect(
            "out",
            Expression::do_prim(PrimOp::Add, vec![Expression::reference("io_x"), Expression::reference("io_y")], vec![]),
        )]),
    }
}

pub fn add_single_clock_channels(analysis: &mut StaticAnalysis, module: &str) {
    analysis
        .add_input_channel(module, "io", Some("clock"), &["io_x", "io_y"])
        .add_output_channel(module, "out", Some("clock"), &["out"])
        .add_edge(module, "out", "io_x")
        .add_edge(module, "out", "io_y")
        .add_transformed_module(module);
}

/// Top module instantiating `Dual` as `dual`, every port passed through.
pub fn dual_clock_top() -> Module {
    let instance = |port: &str| Expression::sub_field(Expression::reference("dual"), port);
    Module {
        name: "Top".to_string(),
        ports: dual_clock_module().ports,
        body: Statement::block(vec![
            Statement::def_inst("dual", "Dual"),
            Statement::connect(instance("clock_a"), Expression::reference("clock_a")),
            Statement::connect(instance("clock_b"), Expression::reference("clock_b")),
            Statement::connect(instance("in_a"), Expression::reference("in_a")),
            Statement::connect(instance("in_b"), Expression::reference("in_b")),
            Statement::connect(Expression::reference("out_a"), instance("out_a")),
            Statement::connect(Expression::reference("out_b"), instance("out_b")),
        ]),
    }
}

pub fn add_dual_clock_top_channels(analysis: &mut StaticAnalysis) {
    analysis
        .add_top_channel("clock", Direction::Input, &["clock_a", "clock_b"])
        .add_top_channel("in_a", Direction::Input, &["in_a"])
        .add_top_channel("in_b", Direction::Input, &["in_b"])
        .add_top_channel("out_a", Direction::Output, &["out_a"])
        .add_top_channel("out_b", Direction::Output, &["out_b"]);
}

pub fn transform(module: &Module, analysis: &StaticAnalysis) -> Result<TransformedModule, TransformError> {
    init_logger();
    let config = Config::default();
    libdn::transform_module(module, analysis, &HostSignals::from_config(&config), &config)
}

/// Statements of a block, printed.
pub fn lines(stmt: &Statement) -> Vec<String> {
    match stmt {
        Statement::Block { stmts } => stmts.iter().map(|stmt| stmt.to_string()).collect(),
        stmt => vec![stmt.to_string()],
    }
}

struct Register {
    name: String,
    clock: Expression,
    reset: Expression,
    init: Expression,
}

/// Cycle-level simulator of a transformed module.
///
/// Signals are keyed by their printed reference (`io_sink.bits.x`). Unset signals read as 0. Registers clocked by the
/// host clock update every step; registers clocked by `<buffer>.O` update only when `<buffer>.CE` is set.
pub struct Sim {
    body: Statement,
    registers: Vec<Register>,
    state: HashMap<String, u64>,
    inputs: HashMap<String, u64>,
    env: HashMap<String, u64>,
    next: HashMap<String, u64>,
}

impl Sim {
    pub fn new(module: &Module) -> Self {
        let mut registers = Vec::new();
        module.body.for_each(&mut |stmt| {
            if let Statement::DefRegister { name, clock, reset, init, .. } = stmt {
                registers.push(Register { name: name.clone(), clock: clock.clone(), reset: reset.clone(), init: init.clone() });
            }
        });
        let state = registers.iter().map(|register| (register.name.clone(), 0)).collect();

        Self {
            body: module.body.clone(),
            registers,
            state,
            inputs: HashMap::new(),
            env: HashMap::new(),
            next: HashMap::new(),
        }
    }

    pub fn set(&mut self, signal: &str, value: u64) { self.inputs.insert(signal.to_string(), value); }

    pub fn get(&self, signal: &str) -> u64 { self.env.get(signal).copied().unwrap_or(0) }

    fn is_register(&self, name: &str) -> bool { self.registers.iter().any(|register| register.name == name) }

    fn eval(&self, expr: &Expression) -> u64 {
        match expr {
            Expression::Reference { .. } | Expression::SubField { .. } | Expression::SubIndex { .. } => {
                self.get(&expr.to_string())
            }
            Expression::Literal { value, .. } => *value,
            Expression::Mux { cond, tval, fval } => {
                if self.eval(cond) != 0 {
                    self.eval(tval)
                } else {
                    self.eval(fval)
                }
            }
            Expression::DoPrim { op, args, .. } => {
                let args = args.iter().map(|arg| self.eval(arg)).collect::<Vec<_>>();
                match op {
                    PrimOp::And => args[0] & args[1],
                    PrimOp::Or => args[0] | args[1],
                    PrimOp::Not => u64::from(args[0] == 0),
                    PrimOp::Add => args[0].wrapping_add(args[1]),
                    PrimOp::Eq => u64::from(args[0] == args[1]),
                    op => panic!("unsupported operator {}", op),
                }
            }
            expr => panic!("unsupported expression {}", expr),
        }
    }

    fn exec(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Block { stmts } => stmts.iter().for_each(|stmt| self.exec(stmt)),
            Statement::Conditionally { pred, conseq, alt } => {
                if self.eval(pred) != 0 {
                    self.exec(conseq)
                } else {
                    self.exec(alt)
                }
            }
            Statement::DefNode { name, value } => {
                let value = self.eval(value);
                self.env.insert(name.clone(), value);
            }
            Statement::Connect { loc, expr } => {
                let value = self.eval(expr);
                let loc = loc.to_string();
                if self.is_register(&loc) {
                    self.next.insert(loc, value);
                } else {
                    self.env.insert(loc, value);
                }
            }
            _ => {}
        }
    }

    /// Evaluates the combinational logic of the current host cycle to a fixpoint.
    pub fn settle(&mut self) {
        self.env.clear();
        let body = self.body.clone();
        for _ in 0..64 {
            let before = (self.env.clone(), self.next.clone());
            self.next.clear();
            self.env.extend(self.inputs.clone());
            self.env.extend(self.state.clone());
            self.exec(&body);
            if before == (self.env.clone(), self.next.clone()) {
                return;
            }
        }
        panic!("combinational logic does not settle");
    }

    fn ticks(&self, clock: &Expression) -> bool {
        let clock = clock.to_string();
        match clock.strip_suffix(".O") {
            Some(buffer) => self.get(&format!("{}.CE", buffer)) != 0,
            None => clock == Config::default().host_clock,
        }
    }

    /// Settles, then advances one host cycle.
    pub fn step(&mut self) {
        self.settle();
        let updates = self
            .registers
            .iter()
            .filter(|register| self.ticks(&register.clock))
            .map(|register| {
                let value = if self.eval(&register.reset) != 0 {
                    self.eval(&register.init)
                } else {
                    self.next.get(&register.name).or_else(|| self.state.get(&register.name)).copied().unwrap_or(0)
                };
                (register.name.clone(), value)
            })
            .collect::<Vec<_>>();
        self.state.extend(updates);
    }

    /// Applies the host reset for one cycle.
    pub fn reset(&mut self) {
        self.set("hostReset", 1);
        self.step();
        self.set("hostReset", 0);
    }
}
