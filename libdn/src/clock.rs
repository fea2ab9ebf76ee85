//! Clock domain synthesis.
//!
//! Every target clock gets an enable register, a clock-gate buffer driving all internal consumers of the clock, and a
//! clock flag read from the clock channel's token. The buffers are held low until the first host cycle completes
//! (`doneInit`), so no domain observes a clock edge while the model is being initialized or reset.
//!
//! # Note
//!
//! Layout of the generated state for a clock `c`:
//!
//! ```firrtl
//! reg c_enabled : UInt<1>, hostClock with :
//!   reset => (hostReset, UInt<1>(1))
//! inst c_buffer of ClockGateBuffer
//! node c_flag = clock_sink.bits.c
//!
//! c_buffer.I <= hostClock
//! c_buffer.CE <= and(and(and(c_enabled, finishing), not(hostReset)), doneInit)
//! c_enabled <= mux(finishing, c_flag, c_enabled)
//! ```

use linked_hash_map::LinkedHashMap;
use log::trace;

use crate::channel::Channel;
use crate::config::Config;
use crate::fir::*;
use crate::transform::TransformError;

/// Input of the clock-gate blackbox.
const GATE_INPUT: &str = "I";

/// Enable of the clock-gate blackbox.
const GATE_ENABLE: &str = "CE";

/// Output of the clock-gate blackbox.
const GATE_OUTPUT: &str = "O";

/// Host clock and reset, threaded explicitly through the pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSignals {
    /// Host clock.
    pub clock: Expression,

    /// Host reset.
    pub reset: Expression,
}

impl HostSignals {
    /// Creates new host signals.
    pub fn new(clock: Expression, reset: Expression) -> Self { Self { clock, reset } }

    /// References to the host clock and reset ports named by `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(Expression::reference(config.host_clock.clone()), Expression::reference(config.host_reset.clone()))
    }
}

/// Declaration of the clock-gate blackbox instantiated for every target clock.
pub fn clock_gate_module(config: &Config) -> ExtModule {
    ExtModule {
        name: config.clock_gate.clone(),
        ports: vec![
            Port::input(GATE_INPUT, Type::clock()),
            Port::input(GATE_ENABLE, Type::uint(1)),
            Port::output(GATE_OUTPUT, Type::clock()),
        ],
        defname: config.clock_gate.clone(),
    }
}

/// Synthesized state of one target clock domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockDomain {
    /// Name of the target clock port
    pub clock: String,
    /// Name of the enable register
    pub enable_reg: String,
    /// Name of the clock-gate buffer instance
    pub buffer: String,
    /// Name of the node holding the clock flag
    pub flag: String,
    /// Value of the clock flag
    pub flag_value: Expression,
    /// Whether the domain is driven by the virtual clock channel
    pub is_virtual: bool,
}

impl ClockDomain {
    /// Enable register.
    pub fn enable(&self) -> Expression { Expression::reference(self.enable_reg.clone()) }

    /// Clock flag of the current token.
    pub fn clock_flag(&self) -> Expression { Expression::reference(self.flag.clone()) }

    /// Gated clock replacing the target clock inside the module.
    pub fn gated_clock(&self) -> Expression { Expression::sub_field(Expression::reference(self.buffer.clone()), GATE_OUTPUT) }

    /// Enable of input channels: their token is consumed while the clock rises into its next value.
    ///
    /// Every host cycle is a tick under the virtual clock channel.
    pub fn high_phase_enable(&self) -> Expression {
        if self.is_virtual {
            Expression::bool(true)
        } else {
            self.clock_flag()
        }
    }

    /// Enable of output channels: their token is produced while the domain is between ticks.
    ///
    /// Every host cycle is a tick under the virtual clock channel.
    pub fn low_phase_enable(&self) -> Expression {
        if self.is_virtual {
            Expression::bool(true)
        } else {
            Expression::not(self.clock_flag())
        }
    }

    /// Declares the enable register, the clock-gate buffer and the clock flag.
    pub fn decls(&self, host: &HostSignals, config: &Config) -> Vec<Statement> {
        vec![
            Statement::def_reg(
                self.enable_reg.clone(),
                Type::uint(1),
                host.clock.clone(),
                host.reset.clone(),
                Expression::bool(true),
            ),
            Statement::def_inst(self.buffer.clone(), config.clock_gate.clone()),
            Statement::def_node(self.flag.clone(), self.flag_value.clone()),
        ]
    }

    /// Drives the clock-gate buffer and latches the clock flag when the host cycle finishes.
    pub fn connects(&self, host: &HostSignals, finishing: &Expression, done_init: &Expression) -> Vec<Statement> {
        let buffer = Expression::reference(self.buffer.clone());
        vec![
            Statement::connect(Expression::sub_field(buffer.clone(), GATE_INPUT), host.clock.clone()),
            Statement::connect(
                Expression::sub_field(buffer, GATE_ENABLE),
                Expression::and_reduce([
                    self.enable(),
                    finishing.clone(),
                    Expression::not(host.reset.clone()),
                    done_init.clone(),
                ]),
            ),
            Statement::connect(self.enable(), Expression::mux(finishing.clone(), self.clock_flag(), self.enable())),
        ]
    }
}

/// Shared simulation-time register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimTime {
    /// Name of the register
    pub reg: String,
    /// Time field of the clock channel's token
    pub source: Expression,
}

/// Clock domains of one module plus the state shared between them.
#[derive(Debug, Clone)]
pub struct ClockDomains {
    /// Domains keyed by target clock port name
    pub domains: LinkedHashMap<String, ClockDomain>,
    /// Name of the `doneInit` register
    pub done_init: String,
    /// Simulation-time register, present only with a timestamped clock channel
    pub sim_time: Option<SimTime>,
}

impl ClockDomains {
    /// Synthesizes one clock domain per port of the (real or virtual) clock channel.
    pub fn synthesize(clock_channel: &Channel, config: &Config, namespace: &mut Namespace) -> Result<Self, TransformError> {
        let is_virtual = matches!(clock_channel, Channel::VirtualClock(_));

        let mut domains = LinkedHashMap::new();
        for port in clock_channel.ports() {
            let flag_value = if is_virtual { Expression::bool(true) } else { clock_channel.payload(&port.name)? };
            let domain = ClockDomain {
                clock: port.name.clone(),
                enable_reg: namespace.new_name(&format!("{}_enabled", port.name)),
                buffer: namespace.new_name(&format!("{}_buffer", port.name)),
                flag: namespace.new_name(&format!("{}_flag", port.name)),
                flag_value,
                is_virtual,
            };
            trace!("clock domain `{}` gated by `{}`", domain.clock, domain.buffer);
            domains.insert(port.name.clone(), domain);
        }

        let done_init = namespace.new_name(&config.done_init);
        let sim_time = match clock_channel {
            Channel::Clock(channel) => {
                channel.time().map(|source| SimTime { reg: namespace.new_name(&config.sim_time), source })
            }
            _ => None,
        };

        Ok(Self { domains, done_init, sim_time })
    }

    /// Returns the domain of the given target clock.
    pub fn domain(&self, clock: &str) -> Option<&ClockDomain> { self.domains.get(clock) }

    /// Iterates over the domains.
    pub fn iter(&self) -> impl Iterator<Item = &ClockDomain> { self.domains.values() }

    /// `doneInit` register.
    pub fn done_init(&self) -> Expression { Expression::reference(self.done_init.clone()) }

    /// Simulation-time register, if any.
    pub fn sim_time(&self) -> Option<Expression> {
        self.sim_time.as_ref().map(|sim_time| Expression::reference(sim_time.reg.clone()))
    }

    /// Declares `doneInit`, cleared by the host reset.
    pub fn done_init_decl(&self, host: &HostSignals) -> Statement {
        Statement::def_reg(self.done_init.clone(), Type::uint(1), host.clock.clone(), host.reset.clone(), Expression::bool(false))
    }

    /// Declares the state of every domain.
    pub fn domain_decls(&self, host: &HostSignals, config: &Config) -> Vec<Statement> {
        self.iter().flat_map(|domain| domain.decls(host, config)).collect()
    }

    /// Declares the simulation-time register.
    pub fn sim_time_decl(&self, host: &HostSignals) -> Option<Statement> {
        self.sim_time.as_ref().map(|sim_time| {
            Statement::def_reg(
                sim_time.reg.clone(),
                Type::uint(TIMESTAMP_WIDTH),
                host.clock.clone(),
                host.reset.clone(),
                Expression::literal(0, TIMESTAMP_WIDTH),
            )
        })
    }

    /// Sets `doneInit` for good once the first host cycle finishes.
    pub fn done_init_update(&self, finishing: &Expression) -> Statement {
        Statement::when(
            finishing.clone(),
            Statement::connect(self.done_init(), Expression::bool(true)),
            Statement::EmptyStmt,
        )
    }

    /// Drives every clock-gate buffer and enable register.
    pub fn gating(&self, host: &HostSignals, finishing: &Expression) -> Vec<Statement> {
        let done_init = self.done_init();
        self.iter().flat_map(|domain| domain.connects(host, finishing, &done_init)).collect()
    }

    /// Advances the simulation time to the token's time field when the host cycle finishes.
    pub fn sim_time_update(&self, finishing: &Expression) -> Option<Statement> {
        self.sim_time.as_ref().map(|sim_time| {
            Statement::when(
                finishing.clone(),
                Statement::connect(Expression::reference(sim_time.reg.clone()), sim_time.source.clone()),
                Statement::EmptyStmt,
            )
        })
    }
}
