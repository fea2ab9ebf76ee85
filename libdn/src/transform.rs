//! Module transformation.
//!
//! Rewrites one target module into its token-driven form:
//!
//! 1. The module's ports are classified into a clock channel (real or virtual) and input/output data channels.
//! 2. Every target clock gets a gated clock domain (see [`crate::clock`]).
//! 3. The combinational dependencies of every output channel on input channels are computed from the connectivity
//!    graph.
//! 4. The body is rewritten so that port references read from (or drive) the channels' payloads and clock references
//!    read the gated clocks.
//! 5. Firing rules driving the decoupled protocol are appended.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::iter;

use itertools::Itertools;
use linked_hash_map::LinkedHashMap;
use log::{debug, trace, warn};
use thiserror::Error;

use crate::analysis::{ChannelAnalysis, ChannelInfo, ConnectivityGraph};
use crate::channel::*;
use crate::clock::{ClockDomain, ClockDomains, HostSignals};
use crate::config::Config;
use crate::fir::*;

#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error(
        "clock `{clock}` of channel `{channel}` in module `{module}` must be driven by exactly one clock channel port, found [{}]",
        .drivers.join(", ")
    )]
    AmbiguousClockDriver { module: String, channel: String, clock: String, drivers: Vec<String> },
    #[error("clock channel `{channel}` of module `{module}` must not belong to a clock domain")]
    ClockChannelWithDomain { module: String, channel: String },
    #[error("channel `{channel}` of module `{module}` declares no clock, but the module has a clock channel")]
    UnresolvableDomain { module: String, channel: String },
    #[error("channel `{channel}` of module `{module}` is timestamped, but the module has no timestamped clock channel")]
    TimestampWithoutTimeBase { module: String, channel: String },
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("module `{module}` has no clock channel and {clocks} clock inputs")]
    MissingClockChannel { module: String, clocks: usize },
    #[error("channel `{channel}` names port `{port}` that module `{module}` does not have")]
    UnknownPort { module: String, channel: String, port: String },
    #[error("module `{0}` is not part of the circuit")]
    UnknownModule(String),
    #[error("host port `{port}` of channel `{channel}` collides with a signal of module `{module}`")]
    HostPortCollision { module: String, channel: String, port: String },
}

/// Output data channel -> input data channels combinationally influencing it.
pub type DependencyMap = BTreeMap<ChannelId, BTreeSet<ChannelId>>;

/// Location of an original port in the transformed module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortLocation {
    /// Payload field of a channel's host port.
    Channel {
        /// Name of the host port
        host_port: String,
        /// Path from the host port to the field, e.g. `["bits", "foo"]`
        path: Vec<String>,
    },
    /// Output of a clock-gate buffer.
    GatedClock(Expression),
}

impl PortLocation {
    /// Dotted reference to the location, e.g. `io_sink.bits.foo`.
    pub fn reference(&self) -> String {
        match self {
            PortLocation::Channel { host_port, path } => iter::once(host_port).chain(path).join("."),
            PortLocation::GatedClock(clock) => clock.to_string(),
        }
    }
}

/// Where every channelized port of the original module went.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChannelLayout {
    /// Original port name -> location, in channel order
    pub ports: LinkedHashMap<String, PortLocation>,
}

impl ChannelLayout {
    /// Returns the location of the given original port.
    pub fn location(&self, port: &str) -> Option<&PortLocation> { self.ports.get(port) }
}

/// Result of transforming one module.
#[derive(Debug, Clone)]
pub struct TransformedModule {
    /// The rewritten module
    pub module: Module,
    /// Channels of the module; the clock channel comes first
    pub channels: Channels,
    /// Combinational dependencies of the output channels
    pub dependencies: DependencyMap,
    /// Where the original ports went
    pub layout: ChannelLayout,
}

/// Resolves a data channel's declared clock to one of the module's clock domains.
struct DomainResolver<'a> {
    module: &'a str,
    graph: &'a ConnectivityGraph,
    domains: &'a ClockDomains,
    is_virtual: bool,
}

impl<'a> DomainResolver<'a> {
    fn resolve(&self, channel: &str, clock: Option<&str>) -> Result<&'a ClockDomain, TransformError> {
        let unresolvable =
            || TransformError::UnresolvableDomain { module: self.module.to_string(), channel: channel.to_string() };

        let clock = match clock {
            Some(clock) => clock,
            None if self.is_virtual => return self.domains.iter().next().ok_or_else(unresolvable),
            None => return Err(unresolvable()),
        };

        let drivers = iter::once(clock.to_string())
            .chain(self.graph.reachable_from(clock))
            .filter(|signal| self.domains.domain(signal).is_some())
            .unique()
            .collect::<Vec<_>>();

        if let [driver] = drivers.as_slice() {
            if let Some(domain) = self.domains.domain(driver) {
                return Ok(domain);
            }
        }

        Err(TransformError::AmbiguousClockDriver {
            module: self.module.to_string(),
            channel: channel.to_string(),
            clock: clock.to_string(),
            drivers,
        })
    }
}

fn resolve_ports(module: &Module, channel: &str, names: &[String]) -> Result<Vec<Port>, TransformError> {
    names
        .iter()
        .map(|name| {
            module.port(name).cloned().ok_or_else(|| TransformError::UnknownPort {
                module: module.name.clone(),
                channel: channel.to_string(),
                port: name.clone(),
            })
        })
        .collect()
}

/// Finds the clock channel: the input channel whose ports are all clocks. A module without one falls back to the
/// virtual clock channel if it has exactly one clock input.
fn classify_clock_channel<A: ChannelAnalysis + ?Sized>(
    module: &Module, inputs: &LinkedHashMap<String, ChannelInfo>, analysis: &A,
) -> Result<Channel, TransformError> {
    let is_clock_channel = |info: &ChannelInfo| {
        !info.ports.is_empty() && info.ports.iter().all(|port| module.port(port).map_or(false, |port| port.tpe.is_clock()))
    };

    if let Some((name, info)) = inputs.iter().find(|(_, info)| is_clock_channel(info)) {
        if info.clock.is_some() {
            return Err(TransformError::ClockChannelWithDomain { module: module.name.clone(), channel: name.clone() });
        }
        return Ok(Channel::Clock(ClockChannel {
            name: name.clone(),
            ports: resolve_ports(module, name, &info.ports)?,
            has_timestamp: analysis.has_timestamp(name),
        }));
    }

    let clocks =
        module.ports.iter().filter(|port| port.direction == Direction::Input && port.tpe.is_clock()).collect::<Vec<_>>();
    match clocks.as_slice() {
        [clock] => Ok(Channel::VirtualClock(VirtualClockChannel { clock: (*clock).clone() })),
        _ => Err(TransformError::MissingClockChannel { module: module.name.clone(), clocks: clocks.len() }),
    }
}

/// Computes, for every output channel, the input channels owning a port that transitively influences one of its
/// ports.
fn dependencies(channels: &Channels, owners: &HashMap<String, ChannelId>, graph: &ConnectivityGraph) -> DependencyMap {
    channels
        .outputs()
        .map(|(id, output)| {
            let deps = output
                .ports
                .iter()
                .flat_map(|port| graph.reachable_from(&port.name))
                .filter_map(|signal| owners.get(&signal).copied())
                .filter(|owner| matches!(channels[*owner], Channel::Input(_)))
                .collect::<BTreeSet<_>>();
            (id, deps)
        })
        .collect()
}

fn rewrite_expr(expr: Expression, replacements: &HashMap<String, Expression>) -> Expression {
    expr.map_post_order(&mut |expr| match expr {
        Expression::Reference { name } => match replacements.get(&name) {
            Some(replacement) => replacement.clone(),
            None => Expression::Reference { name },
        },
        expr => expr,
    })
}

/// Rewrites port and clock references. Connects driving a clock-typed signal keep their left-hand side.
fn rewrite_stmt(
    stmt: Statement, replacements: &HashMap<String, Expression>, clock_signals: &HashSet<String>,
) -> Statement {
    let stmt = stmt.map_stmts(&mut |stmt| rewrite_stmt(stmt, replacements, clock_signals));
    let drives_clock = |loc: &Expression| loc.root_name().map_or(false, |root| clock_signals.contains(root));

    match stmt {
        Statement::Connect { loc, expr } if drives_clock(&loc) => {
            Statement::Connect { loc, expr: rewrite_expr(expr, replacements) }
        }
        Statement::PartialConnect { loc, expr } if drives_clock(&loc) => {
            Statement::PartialConnect { loc, expr: rewrite_expr(expr, replacements) }
        }
        stmt => stmt.map_exprs(&mut |expr| rewrite_expr(expr, replacements)),
    }
}

/// Emits the statements driving the decoupled protocol.
fn firing_rules(
    channels: &Channels, clock: ChannelId, dependencies: &DependencyMap, domains: &ClockDomains, host: &HostSignals,
    finishing: &Expression,
) -> Vec<Statement> {
    let mut stmts = vec![domains.done_init_update(finishing)];
    stmts.extend(domains.gating(host, finishing));
    stmts.extend(channels.iter().filter_map(|(_, channel)| channel.as_data()).map(|data| data.update_fired_register(finishing)));

    stmts.extend(
        channels
            .iter()
            .filter(|(_, channel)| matches!(channel, Channel::Input(_)))
            .filter_map(|(_, channel)| channel.set_ready(finishing)),
    );

    let no_dependencies = BTreeSet::new();
    stmts.extend(channels.outputs().filter_map(|(id, _)| {
        let deps = dependencies.get(&id).unwrap_or(&no_dependencies);
        channels[id].set_validity(deps.iter().map(|dep| &channels[*dep]))
    }));

    let all_fired_or_firing = Expression::and_reduce(
        channels
            .outputs()
            .map(|(_, output)| output.is_fired_or_firing())
            .chain(channels.inputs().map(|(_, input)| input.valid())),
    );
    stmts.extend(channels[clock].set_ready(&all_fired_or_firing));
    stmts.push(Statement::connect(finishing.clone(), Expression::and(all_fired_or_firing, channels[clock].validity())));

    if let Some(sim_time) = domains.sim_time() {
        stmts.extend(channels.outputs().filter_map(|(id, _)| channels[id].connect_timestamp(&sim_time)));
    }
    stmts.extend(domains.sim_time_update(finishing));

    stmts
}

/// Transforms `module` into its token-driven form.
pub fn transform_module<A: ChannelAnalysis + ?Sized>(
    module: &Module, analysis: &A, host: &HostSignals, config: &Config,
) -> Result<TransformedModule, TransformError> {
    debug!("transforming module `{}`", module.name);

    let mut namespace = Namespace::for_module(module);
    namespace.reserve(&config.host_clock);
    namespace.reserve(&config.host_reset);

    let inputs = analysis.input_channels(&module.name);
    let outputs = analysis.output_channels(&module.name);
    let graph = analysis.connectivity(&module.name);

    let clock_channel = classify_clock_channel(module, &inputs, analysis)?;
    let clock_channel_name = match &clock_channel {
        Channel::Clock(channel) => Some(channel.name.clone()),
        _ => None,
    };

    let host_ports = clock_channel
        .host_port_name()
        .map(|port| (clock_channel.name().to_string(), port))
        .into_iter()
        .chain(
            inputs
                .keys()
                .filter(|name| Some(*name) != clock_channel_name.as_ref())
                .map(|name| (name.clone(), sink_name(name))),
        )
        .chain(outputs.keys().map(|name| (name.clone(), source_name(name))))
        .collect::<Vec<_>>();
    for (channel, port) in host_ports {
        if !namespace.reserve(&port) {
            return Err(TransformError::HostPortCollision { module: module.name.clone(), channel, port });
        }
    }

    let finishing = Expression::reference(namespace.new_name(&config.finishing));
    let domains = ClockDomains::synthesize(&clock_channel, config, &mut namespace)?;
    let resolver = DomainResolver {
        module: &module.name,
        graph,
        domains: &domains,
        is_virtual: matches!(clock_channel, Channel::VirtualClock(_)),
    };

    let mut channels = Channels::new();
    let clock = channels.push(clock_channel);

    let mut data_channel = |direction: Direction, name: &String, info: &ChannelInfo| -> Result<Channel, TransformError> {
        let ports = resolve_ports(module, name, &info.ports)?;
        let has_timestamp = analysis.has_timestamp(name);
        if has_timestamp && domains.sim_time.is_none() {
            return Err(TransformError::TimestampWithoutTimeBase { module: module.name.clone(), channel: name.clone() });
        }

        let domain = resolver.resolve(name, info.clock.as_deref())?;
        let fired = namespace.new_name(&format!("{}_fired", name));
        trace!("{} channel `{}` in clock domain `{}`", direction, name, domain.clock);

        Ok(match direction {
            Direction::Input => {
                Channel::Input(DataChannel::new(name.clone(), direction, ports, has_timestamp, domain.high_phase_enable(), fired))
            }
            Direction::Output => {
                Channel::Output(DataChannel::new(name.clone(), direction, ports, has_timestamp, domain.low_phase_enable(), fired))
            }
        })
    };

    for (name, info) in inputs.iter().filter(|(name, _)| Some(*name) != clock_channel_name.as_ref()) {
        channels.push(data_channel(Direction::Input, name, info)?);
    }
    for (name, info) in outputs.iter() {
        channels.push(data_channel(Direction::Output, name, info)?);
    }

    let mut owners = HashMap::new();
    let mut replacements = HashMap::new();
    let mut layout = ChannelLayout::default();
    for (id, channel) in channels.iter() {
        for port in channel.ports() {
            let location = match channel {
                Channel::VirtualClock(_) | Channel::Clock(_) => {
                    let gated = domains.domain(&port.name).map(ClockDomain::gated_clock);
                    if let Some(gated) = &gated {
                        replacements.insert(port.name.clone(), gated.clone());
                    }
                    match (channel.host_port_name(), gated) {
                        (Some(host_port), _) => {
                            PortLocation::Channel { host_port, path: channel.payload_path(&port.name)? }
                        }
                        (None, Some(gated)) => PortLocation::GatedClock(gated),
                        (None, None) => continue,
                    }
                }
                Channel::Input(data) | Channel::Output(data) => {
                    owners.insert(port.name.clone(), id);
                    replacements.insert(port.name.clone(), channel.payload(&port.name)?);
                    PortLocation::Channel { host_port: data.host_port.clone(), path: channel.payload_path(&port.name)? }
                }
            };
            layout.ports.insert(port.name.clone(), location);
        }
    }

    let dependencies = dependencies(&channels, &owners, graph);
    for (output, inputs) in &dependencies {
        trace!(
            "`{}` depends on [{}]",
            channels[*output].name(),
            inputs.iter().map(|input| channels[*input].name()).join(", ")
        );
    }

    // Ports claimed by no channel survive as internal wires.
    let retained = module.ports.iter().filter(|port| !layout.ports.contains_key(&port.name)).collect::<Vec<_>>();
    for port in &retained {
        if !(port.direction == Direction::Output && port.tpe.is_clock()) {
            warn!("port `{}` of module `{}` belongs to no channel, keeping it as a wire", port.name, module.name);
        }
    }

    let mut clock_signals =
        module.ports.iter().filter(|port| port.tpe.is_clock()).map(|port| port.name.clone()).collect::<HashSet<_>>();
    module.body.for_each(&mut |stmt| match stmt {
        Statement::DefWire { name, tpe } | Statement::DefRegister { name, tpe, .. } if tpe.is_clock() => {
            clock_signals.insert(name.clone());
        }
        _ => {}
    });

    let mut ports = vec![Port::input(config.host_clock.clone(), Type::clock()), Port::input(config.host_reset.clone(), Type::uint(1))];
    for (_, channel) in channels.iter().filter(|(_, channel)| matches!(channel, Channel::Input(_))) {
        ports.extend(channel.host_port()?);
    }
    for (id, _) in channels.outputs() {
        ports.extend(channels[id].host_port()?);
    }
    ports.extend(channels[clock].host_port()?);

    let mut stmts = vec![Statement::def_wire(finishing.to_string(), Type::uint(1)), domains.done_init_decl(host)];
    stmts.extend(retained.iter().map(|port| Statement::def_wire(port.name.clone(), port.tpe.clone())));
    stmts.extend(domains.domain_decls(host, config));
    stmts.extend(channels.iter().filter_map(|(_, channel)| channel.as_data()).map(|data| data.fired_reg(&host.clock, &host.reset)));
    stmts.extend(domains.sim_time_decl(host));

    match rewrite_stmt(module.body.clone(), &replacements, &clock_signals) {
        Statement::Block { stmts: body } => stmts.extend(body),
        body => stmts.push(body),
    }

    stmts.extend(firing_rules(&channels, clock, &dependencies, &domains, host, &finishing));

    debug!(
        "module `{}`: {} channels, {} clock domains",
        module.name,
        channels.len(),
        domains.domains.len()
    );

    Ok(TransformedModule {
        module: Module { name: module.name.clone(), ports, body: Statement::block(stmts) },
        channels,
        dependencies,
        layout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::StaticAnalysis;

    fn single_clock_module() -> Module {
        Module {
            name: "Adder".to_string(),
            ports: vec![
                Port::input("clock", Type::clock()),
                Port::input("io_a", Type::uint(8)),
                Port::input("io_b", Type::uint(8)),
                Port::output("out", Type::uint(8)),
            ],
            body: Statement::block(vec![
                Statement::def_reg(
                    "acc",
                    Type::uint(8),
                    Expression::reference("clock"),
                    Expression::bool(false),
                    Expression::literal(0, 8),
                ),
                Statement::connect(
                    Expression::reference("acc"),
                    Expression::do_prim(PrimOp::Add, vec![Expression::reference("io_a"), Expression::reference("io_b")], vec![]),
                ),
                Statement::connect(Expression::reference("out"), Expression::reference("acc")),
            ]),
        }
    }

    fn single_clock_analysis() -> StaticAnalysis {
        let mut analysis = StaticAnalysis::new();
        analysis
            .add_input_channel("Adder", "io", Some("clock"), &["io_a", "io_b"])
            .add_output_channel("Adder", "out", Some("clock"), &["out"])
            .add_edge("Adder", "out", "acc")
            .add_edge("Adder", "acc", "io_a");
        analysis
    }

    fn transform(module: &Module, analysis: &StaticAnalysis) -> Result<TransformedModule, TransformError> {
        let config = Config::default();
        transform_module(module, analysis, &HostSignals::from_config(&config), &config)
    }

    #[test]
    fn body_references_are_rewritten() {
        let transformed = transform(&single_clock_module(), &single_clock_analysis()).unwrap();
        let body = transformed.module.body.to_string();

        assert!(body.contains("reg acc : UInt<8>, clock_buffer.O with :"));
        assert!(body.contains("acc <= add(io_sink.bits.a, io_sink.bits.b)"));
        assert!(body.contains("out_source.bits <= acc"));
        assert!(!body.contains("io_a"));
    }

    #[test]
    fn ports_follow_host_channel_order() {
        let transformed = transform(&single_clock_module(), &single_clock_analysis()).unwrap();
        let names = transformed.module.ports.iter().map(|port| port.name.as_str()).collect::<Vec<_>>();

        assert_eq!(names, vec!["hostClock", "hostReset", "io_sink", "out_source"]);
    }

    #[test]
    fn register_path_creates_dependency() {
        let transformed = transform(&single_clock_module(), &single_clock_analysis()).unwrap();
        let (output, deps) = transformed.dependencies.iter().next().unwrap();

        assert_eq!(transformed.channels[*output].name(), "out");
        assert_eq!(deps.iter().map(|dep| transformed.channels[*dep].name()).collect::<Vec<_>>(), vec!["io"]);
    }

    #[test]
    fn layout_records_payload_paths() {
        let transformed = transform(&single_clock_module(), &single_clock_analysis()).unwrap();

        assert_eq!(transformed.layout.location("io_b").unwrap().reference(), "io_sink.bits.b");
        assert_eq!(transformed.layout.location("out").unwrap().reference(), "out_source.bits");
        assert_eq!(transformed.layout.location("clock").unwrap().reference(), "clock_buffer.O");
    }

    #[test]
    fn unknown_port_is_reported() {
        let mut analysis = single_clock_analysis();
        analysis.add_output_channel("Adder", "ghost", Some("clock"), &["ghost"]);

        assert_eq!(
            transform(&single_clock_module(), &analysis).unwrap_err(),
            TransformError::UnknownPort {
                module: "Adder".to_string(),
                channel: "ghost".to_string(),
                port: "ghost".to_string()
            }
        );
    }

    #[test]
    fn firing_rules_come_last_in_fixed_order() {
        let transformed = transform(&single_clock_module(), &single_clock_analysis()).unwrap();
        let stmts = match &transformed.module.body {
            Statement::Block { stmts } => stmts.iter().map(|stmt| stmt.to_string()).collect::<Vec<_>>(),
            _ => panic!("body is not a block"),
        };
        let position = |prefix: &str| stmts.iter().position(|stmt| stmt.starts_with(prefix)).unwrap();

        assert!(position("reg io_fired") < position("acc <="));

        assert!(position("when targetCycleFinishing :\n  doneInit") < position("clock_buffer.I"));
        assert!(position("clock_buffer.I") < position("when targetCycleFinishing :\n  io_fired"));
        assert!(position("io_sink.ready") < position("out_source.valid"));
        assert!(position("out_source.valid") < position("targetCycleFinishing <="));
    }
}
