//! FIRRTL.
//!
//! For simplicity, we omitted some items such as `Info`, `StringLit`, analog and fixed-point types, ..

use std::fmt;

use itertools::Itertools;

use crate::utils::indent;

const INDENT: usize = 2;

/// Width of the simulation-time field carried by timestamped tokens.
pub const TIMESTAMP_WIDTH: usize = 64;

/// Primitive operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimOp {
    /// Addition
    Add,

    /// Subtraction
    Sub,

    /// Less Than
    Lt,

    /// Less Than Or Equal To
    Leq,

    /// Greater Than
    Gt,

    /// Greater Than Or Equal To
    Geq,

    /// Equal To
    Eq,

    /// Not Equal To
    Neq,

    /// Padding
    Pad,

    /// Static Shift Left
    Shl,

    /// Static Shift Right
    Shr,

    /// Bitwise Complement
    Not,

    /// Bitwise And
    And,

    /// Bitwise Or
    Or,

    /// Bitwise Exclusive Or
    Xor,

    /// Bitwise And Reduce
    Andr,

    /// Bitwise Or Reduce
    Orr,

    /// Concatenate
    Cat,

    /// Bit Extraction
    Bits,

    /// Interpret As UInt
    AsUInt,

    /// Interpret As Clock
    AsClock,
}

impl fmt::Display for PrimOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            PrimOp::Add => "add",
            PrimOp::Sub => "sub",
            PrimOp::Lt => "lt",
            PrimOp::Leq => "leq",
            PrimOp::Gt => "gt",
            PrimOp::Geq => "geq",
            PrimOp::Eq => "eq",
            PrimOp::Neq => "neq",
            PrimOp::Pad => "pad",
            PrimOp::Shl => "shl",
            PrimOp::Shr => "shr",
            PrimOp::Not => "not",
            PrimOp::And => "and",
            PrimOp::Or => "or",
            PrimOp::Xor => "xor",
            PrimOp::Andr => "andr",
            PrimOp::Orr => "orr",
            PrimOp::Cat => "cat",
            PrimOp::Bits => "bits",
            PrimOp::AsUInt => "asUInt",
            PrimOp::AsClock => "asClock",
        };
        write!(f, "{}", op)
    }
}

impl PrimOp {
    /// Returns true if `self` is binary bitwise operator.
    #[inline]
    pub fn is_binary_bitwise(self) -> bool { matches!(self, PrimOp::And | PrimOp::Or | PrimOp::Xor) }
}

/// Expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expression {
    /// Previously declared circuit component.
    Reference {
        /// Name of the component
        name: String,
    },
    /// Sub-element of an expression with a bundle type.
    SubField {
        /// Input signal
        expr: Box<Expression>,
        /// Name of the field
        name: String,
    },
    /// Sub-element of an expression with a vector type.
    SubIndex {
        /// Input signal
        expr: Box<Expression>,
        /// Index of the element
        value: usize,
    },
    /// Sub-element of a vector-typed expression using a calculated index.
    SubAccess {
        /// Input signal
        expr: Box<Expression>,
        /// Index of the element
        index: Box<Expression>,
    },
    /// One of two input expressions depending on the value of an unsigned selection signal.
    Mux {
        /// Selection signal
        cond: Box<Expression>,
        /// Selected signal when `cond` is true
        tval: Box<Expression>,
        /// Selected signal when `cond` is false
        fval: Box<Expression>,
    },
    /// Input expression guarded with an unsigned single bit valid signal.
    ValidIf {
        /// Valid signal
        cond: Box<Expression>,
        /// Input signal
        valid: Box<Expression>,
    },
    /// Unsigned literal.
    Literal {
        /// Value
        value: u64,
        /// Width
        width: usize,
    },
    /// Primitive operation.
    DoPrim {
        /// Primitive operator
        op: PrimOp,
        /// Arguments
        args: Vec<Expression>,
        /// Constants
        consts: Vec<usize>,
    },
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Reference { name } => write!(f, "{}", name),
            Expression::SubField { expr, name } => write!(f, "{}.{}", expr, name),
            Expression::SubIndex { expr, value } => write!(f, "{}[{}]", expr, value),
            Expression::SubAccess { expr, index } => write!(f, "{}[{}]", expr, index),
            Expression::Mux { cond, tval, fval } => write!(f, "mux({}, {}, {})", cond, tval, fval),
            Expression::ValidIf { cond, valid } => write!(f, "validif({}, {})", cond, valid),
            Expression::Literal { value, width } => write!(f, "UInt<{}>({})", width, value),
            Expression::DoPrim { op, args, consts } => write!(
                f,
                "{}({})",
                op,
                args.iter().map(|s| s.to_string()).chain(consts.iter().map(|s| s.to_string())).join(", ")
            ),
        }
    }
}

#[allow(clippy::should_implement_trait)]
impl Expression {
    /// Reference expression.
    #[inline]
    pub fn reference<S: Into<String>>(name: S) -> Self { Expression::Reference { name: name.into() } }

    /// Subfield expression.
    #[inline]
    pub fn sub_field<S: Into<String>>(expr: Expression, name: S) -> Self {
        Expression::SubField { expr: Box::new(expr), name: name.into() }
    }

    /// Mux expression.
    #[inline]
    pub fn mux(cond: Expression, tval: Expression, fval: Expression) -> Self {
        Expression::Mux { cond: Box::new(cond), tval: Box::new(tval), fval: Box::new(fval) }
    }

    /// Literal expression.
    #[inline]
    pub fn literal(value: u64, width: usize) -> Self { Expression::Literal { value, width } }

    /// Single-bit literal.
    #[inline]
    pub fn bool(value: bool) -> Self { Expression::literal(u64::from(value), 1) }

    /// Primitive operation.
    #[inline]
    pub fn do_prim(op: PrimOp, args: Vec<Expression>, consts: Vec<usize>) -> Self {
        Expression::DoPrim { op, args, consts }
    }

    /// Bitwise complement operation.
    ///
    /// Result width is `w_e`.
    #[inline]
    pub fn not(e: Self) -> Self { Expression::do_prim(PrimOp::Not, vec![e], Vec::new()) }

    /// Binary bitwise operations. (and, or, xor)
    ///
    /// Result width is `max(w_e1, w_e2)`.
    #[inline]
    pub fn binary_bitwise(op: PrimOp, e1: Self, e2: Self) -> Self {
        assert!(op.is_binary_bitwise());
        Expression::do_prim(op, vec![e1, e2], Vec::new())
    }

    /// Bitwise and.
    #[inline]
    pub fn and(e1: Self, e2: Self) -> Self { Expression::binary_bitwise(PrimOp::And, e1, e2) }

    /// Bitwise or.
    #[inline]
    pub fn or(e1: Self, e2: Self) -> Self { Expression::binary_bitwise(PrimOp::Or, e1, e2) }

    /// Conjunction of the given single-bit expressions. An empty conjunction is `UInt<1>(1)`.
    pub fn and_reduce<I: IntoIterator<Item = Expression>>(exprs: I) -> Self {
        exprs.into_iter().reduce(Expression::and).unwrap_or_else(|| Expression::bool(true))
    }

    /// Returns the name of the reference at the base of a sub-field/sub-index/sub-access chain.
    pub fn root_name(&self) -> Option<&str> {
        match self {
            Expression::Reference { name } => Some(name),
            Expression::SubField { expr, .. } | Expression::SubIndex { expr, .. } | Expression::SubAccess { expr, .. } => {
                expr.root_name()
            }
            _ => None,
        }
    }

    /// Rewrites the expression bottom-up: every child is rewritten before `f` sees its parent.
    pub fn map_post_order<F>(self, f: &mut F) -> Self
    where F: FnMut(Expression) -> Expression {
        let expr = match self {
            Expression::Reference { .. } | Expression::Literal { .. } => self,
            Expression::SubField { expr, name } => Expression::SubField { expr: Box::new(expr.map_post_order(f)), name },
            Expression::SubIndex { expr, value } => {
                Expression::SubIndex { expr: Box::new(expr.map_post_order(f)), value }
            }
            Expression::SubAccess { expr, index } => Expression::SubAccess {
                expr: Box::new(expr.map_post_order(f)),
                index: Box::new(index.map_post_order(f)),
            },
            Expression::Mux { cond, tval, fval } => Expression::Mux {
                cond: Box::new(cond.map_post_order(f)),
                tval: Box::new(tval.map_post_order(f)),
                fval: Box::new(fval.map_post_order(f)),
            },
            Expression::ValidIf { cond, valid } => Expression::ValidIf {
                cond: Box::new(cond.map_post_order(f)),
                valid: Box::new(valid.map_post_order(f)),
            },
            Expression::DoPrim { op, args, consts } => {
                Expression::DoPrim { op, args: args.into_iter().map(|arg| arg.map_post_order(f)).collect(), consts }
            }
        };

        f(expr)
    }
}

/// Statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Wire definition.
    DefWire {
        /// Name of the wire
        name: String,
        /// Type of the signal
        tpe: Type,
    },
    /// Register definition.
    DefRegister {
        /// Name of the register
        name: String,
        /// Type of the signal
        tpe: Type,
        /// Clock signal
        clock: Expression,
        /// Reset signal
        reset: Expression,
        /// Initialization signal
        init: Expression,
    },
    /// Module instantiation.
    DefInstance {
        /// Name of the instance
        name: String,
        /// Name of the module
        module: String,
    },
    /// Intermediate value.
    DefNode {
        /// Name of the value
        name: String,
        /// Value
        value: Expression,
    },
    /// Conditional statement.
    Conditionally {
        /// Predicate signal
        pred: Expression,
        /// Then statement
        conseq: Box<Statement>,
        /// Else statement
        alt: Box<Statement>,
    },
    /// Block of statements.
    Block {
        /// Statements
        stmts: Vec<Statement>,
    },
    /// Physically wired connection between two circuit components.
    PartialConnect {
        /// L-value
        loc: Expression,
        /// R-value
        expr: Expression,
    },
    /// Physically wired connection between two circuit components.
    ///
    /// # Note
    ///
    /// Difference between `PartialConnect` is that `PartialConnect` enforces fewer restrictions on
    /// the types and widths of the circuit components it connects.
    Connect {
        /// L-value
        loc: Expression,
        /// R-value
        expr: Expression,
    },
    /// Indicate that a circuit component contains indeterminate value.
    IsInvalid {
        /// Expression
        expr: Expression,
    },
    /// Empty statement.
    EmptyStmt,
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::DefWire { name, tpe } => write!(f, "wire {} : {}", name, tpe),
            Statement::DefRegister { name, tpe, clock, reset, init } => write!(
                f,
                "reg {} : {}, {} with :\n{}",
                name,
                tpe,
                clock,
                indent(format!("reset => ({}, {})", reset, init), INDENT)
            ),
            Statement::DefInstance { name, module } => write!(f, "inst {} of {}", name, module),
            Statement::DefNode { name, value } => write!(f, "node {} = {}", name, value),
            Statement::Conditionally { pred, conseq, alt } => {
                write!(f, "when {} :\n{}", pred, indent(conseq.to_string(), INDENT))?;
                if !matches!(**alt, Statement::EmptyStmt) {
                    write!(f, "\nelse :\n{}", indent(alt.to_string(), INDENT))?;
                }
                Ok(())
            }
            Statement::Block { stmts } => {
                let res = stmts.iter().map(|s| s.to_string()).filter(|s| !s.is_empty()).join("\n");

                if res.is_empty() {
                    write!(f, "{}", Statement::EmptyStmt)
                } else {
                    write!(f, "{}", res)
                }
            }
            Statement::PartialConnect { loc, expr } => write!(f, "{} <- {}", loc, expr),
            Statement::Connect { loc, expr } => write!(f, "{} <= {}", loc, expr),
            Statement::IsInvalid { expr } => write!(f, "{} is invalid", expr),
            Statement::EmptyStmt => write!(f, "skip"),
        }
    }
}

impl Statement {
    /// Creates new wire definition.
    #[inline]
    pub fn def_wire<S: Into<String>>(name: S, tpe: Type) -> Self { Statement::DefWire { name: name.into(), tpe } }

    /// Creates new reg definition.
    #[inline]
    pub fn def_reg<S: Into<String>>(name: S, tpe: Type, clock: Expression, reset: Expression, init: Expression) -> Self {
        Statement::DefRegister { name: name.into(), tpe, clock, reset, init }
    }

    /// Creates new module instantiation.
    #[inline]
    pub fn def_inst<S: Into<String>, T: Into<String>>(name: S, module: T) -> Self {
        Statement::DefInstance { name: name.into(), module: module.into() }
    }

    /// Creates new node definition.
    #[inline]
    pub fn def_node<S: Into<String>>(name: S, value: Expression) -> Self {
        Statement::DefNode { name: name.into(), value }
    }

    /// Creates new conditional statement.
    #[inline]
    pub fn when(pred: Expression, conseq: Statement, alt: Statement) -> Self {
        Statement::Conditionally { pred, conseq: Box::new(conseq), alt: Box::new(alt) }
    }

    /// Creates new block statement.
    #[inline]
    pub fn block(stmts: Vec<Statement>) -> Self { Statement::Block { stmts } }

    /// Creates new connect statement.
    #[inline]
    pub fn connect(loc: Expression, expr: Expression) -> Self { Statement::Connect { loc, expr } }

    /// Creates new partial connect statement.
    #[inline]
    pub fn partial_connect(loc: Expression, expr: Expression) -> Self { Statement::PartialConnect { loc, expr } }

    /// Rewrites every directly nested statement with `f`.
    pub fn map_stmts<F>(self, f: &mut F) -> Self
    where F: FnMut(Statement) -> Statement {
        match self {
            Statement::Conditionally { pred, conseq, alt } => {
                Statement::Conditionally { pred, conseq: Box::new(f(*conseq)), alt: Box::new(f(*alt)) }
            }
            Statement::Block { stmts } => Statement::Block { stmts: stmts.into_iter().map(|stmt| f(stmt)).collect() },
            stmt => stmt,
        }
    }

    /// Rewrites every expression held directly by this statement with `f`. Nested statements are left untouched.
    pub fn map_exprs<F>(self, f: &mut F) -> Self
    where F: FnMut(Expression) -> Expression {
        match self {
            Statement::DefRegister { name, tpe, clock, reset, init } => {
                Statement::DefRegister { name, tpe, clock: f(clock), reset: f(reset), init: f(init) }
            }
            Statement::DefNode { name, value } => Statement::DefNode { name, value: f(value) },
            Statement::Conditionally { pred, conseq, alt } => Statement::Conditionally { pred: f(pred), conseq, alt },
            Statement::PartialConnect { loc, expr } => Statement::PartialConnect { loc: f(loc), expr: f(expr) },
            Statement::Connect { loc, expr } => Statement::Connect { loc: f(loc), expr: f(expr) },
            Statement::IsInvalid { expr } => Statement::IsInvalid { expr: f(expr) },
            stmt @ (Statement::DefWire { .. }
            | Statement::DefInstance { .. }
            | Statement::Block { .. }
            | Statement::EmptyStmt) => stmt,
        }
    }

    /// Visits this statement and every nested statement in pre-order.
    pub fn for_each<F>(&self, f: &mut F)
    where F: FnMut(&Statement) {
        f(self);
        match self {
            Statement::Conditionally { conseq, alt, .. } => {
                conseq.for_each(f);
                alt.for_each(f);
            }
            Statement::Block { stmts } => stmts.iter().for_each(|stmt| stmt.for_each(f)),
            _ => {}
        }
    }

    /// Returns the name declared by this statement, if any.
    pub fn declared_name(&self) -> Option<&str> {
        match self {
            Statement::DefWire { name, .. }
            | Statement::DefRegister { name, .. }
            | Statement::DefInstance { name, .. }
            | Statement::DefNode { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Collects the names declared by this statement and every nested statement.
    pub fn declared_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.for_each(&mut |stmt| {
            if let Some(name) = stmt.declared_name() {
                names.push(name.to_string());
            }
        });
        names
    }
}

/// Field of a bundle type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Name of the field
    pub name: String,
    /// Whether the field flows against the bundle
    pub flip: bool,
    /// Type of the field
    pub tpe: Type,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} : {}", if self.flip { "flip " } else { "" }, self.name, self.tpe)
    }
}

impl Field {
    /// Creates new field.
    pub fn new<S: Into<String>>(name: S, tpe: Type) -> Self { Field { name: name.into(), flip: false, tpe } }

    /// Creates new flipped field.
    pub fn flipped<S: Into<String>>(name: S, tpe: Type) -> Self { Field { name: name.into(), flip: true, tpe } }
}

/// Type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// Clock type.
    ClockType,
    /// Unsigned integer type.
    UIntType(usize),
    /// Signed integer type.
    SIntType(usize),
    /// Vector type.
    VectorType {
        /// Type of the element
        tpe: Box<Type>,
        /// Number of elements
        size: usize,
    },
    /// Bundle type.
    BundleType(Vec<Field>),
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::ClockType => write!(f, "Clock"),
            Type::UIntType(width) => write!(f, "UInt<{}>", width),
            Type::SIntType(width) => write!(f, "SInt<{}>", width),
            Type::VectorType { tpe, size } => write!(f, "{}[{}]", tpe, size),
            Type::BundleType(fields) => write!(f, "{{{}}}", fields.iter().join(", ")),
        }
    }
}

impl Type {
    /// Creates new clock type.
    #[inline]
    pub fn clock() -> Self { Type::ClockType }

    /// Creates new unsigned integer type.
    #[inline]
    pub fn uint(width: usize) -> Self { Type::UIntType(width) }

    /// Creates new bundle type.
    #[inline]
    pub fn bundle(fields: Vec<Field>) -> Self { Type::BundleType(fields) }

    /// Decoupled (valid/ready) wrapper around `bits`.
    pub fn decoupled(bits: Type) -> Self {
        Type::bundle(vec![Field::flipped("ready", Type::uint(1)), Field::new("valid", Type::uint(1)), Field::new("bits", bits)])
    }

    /// Payload `data` paired with a simulation-time field.
    pub fn timestamped(data: Type) -> Self {
        Type::bundle(vec![Field::new("data", data), Field::new("time", Type::uint(TIMESTAMP_WIDTH))])
    }

    /// Returns true if `self` is clock type.
    #[inline]
    pub fn is_clock(&self) -> bool { matches!(self, Type::ClockType) }

    /// Returns the type of the named field if `self` is a bundle.
    pub fn field(&self, name: &str) -> Option<&Type> {
        match self {
            Type::BundleType(fields) => fields.iter().find(|field| field.name == name).map(|field| &field.tpe),
            _ => None,
        }
    }
}

/// Direction of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Input.
    Input,
    /// Output.
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// Port of module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    /// Name of the port
    pub name: String,
    /// Direction of the port
    pub direction: Direction,
    /// Type of the port
    pub tpe: Type,
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} : {}", self.direction, self.name, self.tpe)
    }
}

impl Port {
    /// Creates new input port.
    pub fn input<S: Into<String>>(name: S, tpe: Type) -> Self {
        Port { name: name.into(), direction: Direction::Input, tpe }
    }

    /// Creates new output port.
    pub fn output<S: Into<String>>(name: S, tpe: Type) -> Self {
        Port { name: name.into(), direction: Direction::Output, tpe }
    }

    /// Reference to the port.
    pub fn reference(&self) -> Expression { Expression::reference(self.name.clone()) }
}

/// An instantiable hardware block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Name of the module
    pub name: String,
    /// Ports of the module
    pub ports: Vec<Port>,
    /// Body of the module
    pub body: Statement,
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "module {} :\n{}\n\n{}",
            self.name,
            indent(self.ports.iter().join("\n"), INDENT),
            indent(self.body.to_string(), INDENT)
        )
    }
}

impl Module {
    /// Returns the port with the given name.
    pub fn port(&self, name: &str) -> Option<&Port> { self.ports.iter().find(|port| port.name == name) }
}

/// An externally defined module (blackbox).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtModule {
    /// Name of the module
    pub name: String,
    /// Ports of the module
    pub ports: Vec<Port>,
    /// Name of the definition in the target language
    pub defname: String,
}

impl fmt::Display for ExtModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "extmodule {} :\n{}\n{}",
            self.name,
            indent(self.ports.iter().join("\n"), INDENT),
            indent(format!("defname = {}", self.defname), INDENT)
        )
    }
}

/// Circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Circuit {
    /// Inner modules
    pub modules: Vec<Module>,
    /// External modules
    pub ext_modules: Vec<ExtModule>,
    /// Name of the circuit
    pub main: String,
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "circuit {} :\n{}",
            self.main,
            self.ext_modules
                .iter()
                .map(|s| s.to_string())
                .chain(self.modules.iter().map(|s| s.to_string()))
                .map(|s| indent(s, INDENT))
                .join("\n\n")
        )
    }
}

impl Circuit {
    /// Creates new circuit without external modules.
    pub fn new<S: Into<String>>(main: S, modules: Vec<Module>) -> Self {
        Circuit { modules, ext_modules: Vec::new(), main: main.into() }
    }

    /// Returns the module with the given name.
    pub fn module(&self, name: &str) -> Option<&Module> { self.modules.iter().find(|module| module.name == name) }

    /// Returns the module with the given name.
    pub fn module_mut(&mut self, name: &str) -> Option<&mut Module> {
        self.modules.iter_mut().find(|module| module.name == name)
    }
}
