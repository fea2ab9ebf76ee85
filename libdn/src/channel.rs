//! Channels: decoupled (valid/ready) aggregations of same-direction, same-domain ports.
//!
//! A channel exchanges exactly one token per host cycle in which its clock domain is enabled. Every channel except the
//! virtual clock channel is backed by a host-side decoupled port named `<channel>_sink` (inputs) or
//! `<channel>_source` (outputs).

use std::collections::HashSet;
use std::ops::Index;

use itertools::izip;
use thiserror::Error;

use crate::fir::*;
use crate::some_or;

#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("cannot derive an unambiguous field name for port `{port}` of channel `{channel}`")]
    AmbiguousFieldSuffix { channel: String, port: String },
    #[error("channel `{0}` carries no payload")]
    NoPayload(String),
}

/// Name of the host port of an input channel.
pub fn sink_name(channel: &str) -> String { format!("{}_sink", channel) }

/// Name of the host port of an output channel.
pub fn source_name(channel: &str) -> String { format!("{}_source", channel) }

/// Name of the host port of a channel with the given direction.
pub fn host_port_name(channel: &str, direction: Direction) -> String {
    match direction {
        Direction::Input => sink_name(channel),
        Direction::Output => source_name(channel),
    }
}

/// Derives the payload field name of `port` by stripping the channel name as a prefix.
///
/// `<channel>_` is tried before `<channel>`; the first prefix leaving a proper suffix wins.
pub fn field_suffix(channel: &str, port: &str) -> Result<String, ChannelError> {
    [format!("{}_", channel), channel.to_string()]
        .iter()
        .filter_map(|prefix| port.strip_prefix(prefix.as_str()))
        .find(|suffix| !suffix.is_empty() && !suffix.starts_with('_'))
        .map(String::from)
        .ok_or_else(|| ChannelError::AmbiguousFieldSuffix { channel: channel.to_string(), port: port.to_string() })
}

/// Field names of a multi-port channel, in port order. Fails if two ports map to the same field.
pub fn field_names<S: AsRef<str>>(channel: &str, ports: &[S]) -> Result<Vec<String>, ChannelError> {
    let mut seen = HashSet::new();
    ports
        .iter()
        .map(|port| {
            let suffix = field_suffix(channel, port.as_ref())?;
            if !seen.insert(suffix.clone()) {
                return Err(ChannelError::AmbiguousFieldSuffix {
                    channel: channel.to_string(),
                    port: port.as_ref().to_string(),
                });
            }
            Ok(suffix)
        })
        .collect()
}

/// Path from the host port to the payload field carrying `port`, e.g. `["bits", "data", "foo"]`.
///
/// The field name is omitted when the channel aggregates a single port.
pub fn payload_path<S: AsRef<str>>(
    channel: &str, ports: &[S], port: &str, has_timestamp: bool,
) -> Result<Vec<String>, ChannelError> {
    let mut path = vec!["bits".to_string()];
    if has_timestamp {
        path.push("data".to_string());
    }

    if ports.len() > 1 {
        let names = field_names(channel, ports)?;
        let index = ports.iter().position(|p| p.as_ref() == port).ok_or_else(|| {
            ChannelError::AmbiguousFieldSuffix { channel: channel.to_string(), port: port.to_string() }
        })?;
        path.push(names[index].clone());
    }

    Ok(path)
}

/// Payload type of a channel aggregating `ports`. Clock-typed ports are carried as single-bit flags.
pub fn payload_type(channel: &str, ports: &[Port], has_timestamp: bool) -> Result<Type, ChannelError> {
    let field_type = |port: &Port| if port.tpe.is_clock() { Type::uint(1) } else { port.tpe.clone() };

    let data = match ports {
        [port] => field_type(port),
        _ => {
            let names = field_names(channel, &ports.iter().map(|port| port.name.as_str()).collect::<Vec<_>>())?;
            Type::bundle(izip!(names, ports).map(|(name, port)| Field::new(name, field_type(port))).collect())
        }
    };

    Ok(if has_timestamp { Type::timestamped(data) } else { data })
}

/// Index of a channel in [`Channels`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(usize);

impl ChannelId {
    /// Returns the index into the arena.
    pub fn index(self) -> usize { self.0 }
}

/// Clock channel: one high-phase flag per target clock, optionally with a simulation-time field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockChannel {
    /// Name of the channel
    pub name: String,
    /// Clock ports of the original module
    pub ports: Vec<Port>,
    /// Whether the token carries a simulation-time field
    pub has_timestamp: bool,
}

impl ClockChannel {
    /// Reference to the host port.
    pub fn port_ref(&self) -> Expression { Expression::reference(sink_name(&self.name)) }

    /// Simulation-time field of the current token.
    pub fn time(&self) -> Option<Expression> {
        self.has_timestamp.then(|| Expression::sub_field(Expression::sub_field(self.port_ref(), "bits"), "time"))
    }
}

/// Stand-in for the clock channel of a single-clock module: always valid, no payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualClockChannel {
    /// The only target clock of the module
    pub clock: Port,
}

/// Input or output data channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChannel {
    /// Name of the channel
    pub name: String,
    /// Name of the host port
    pub host_port: String,
    /// Aggregated ports of the original module
    pub ports: Vec<Port>,
    /// Whether the payload carries a simulation-time field
    pub has_timestamp: bool,
    /// True while the owning clock domain should exchange a token in the next host cycle
    pub clock_domain_enable: Expression,
    /// Name of the fired register
    pub fired: String,
}

impl DataChannel {
    /// Creates new data channel. The host port name follows `direction`.
    pub fn new(
        name: String, direction: Direction, ports: Vec<Port>, has_timestamp: bool, clock_domain_enable: Expression,
        fired: String,
    ) -> Self {
        let host_port = host_port_name(&name, direction);
        Self { name, host_port, ports, has_timestamp, clock_domain_enable, fired }
    }

    fn port_ref(&self) -> Expression { Expression::reference(self.host_port.clone()) }

    /// `valid` of the host port.
    pub fn valid(&self) -> Expression { Expression::sub_field(self.port_ref(), "valid") }

    /// `ready` of the host port.
    pub fn ready(&self) -> Expression { Expression::sub_field(self.port_ref(), "ready") }

    /// Whether the token has already been exchanged during this host cycle.
    pub fn is_fired(&self) -> Expression { Expression::reference(self.fired.clone()) }

    /// Whether the token is being exchanged right now.
    pub fn is_firing(&self) -> Expression { Expression::and(self.valid(), self.ready()) }

    /// Fired or firing.
    pub fn is_fired_or_firing(&self) -> Expression { Expression::or(self.is_fired(), self.is_firing()) }

    /// Declares the fired register, cleared by the host reset.
    pub fn fired_reg(&self, host_clock: &Expression, host_reset: &Expression) -> Statement {
        Statement::def_reg(self.fired.clone(), Type::uint(1), host_clock.clone(), host_reset.clone(), Expression::bool(false))
    }

    /// Updates the fired register. When the host cycle finishes, a channel whose domain is enabled for the next cycle
    /// starts unfired and a disabled one is skipped by starting fired.
    pub fn update_fired_register(&self, finishing: &Expression) -> Statement {
        Statement::when(
            finishing.clone(),
            Statement::connect(self.is_fired(), Expression::not(self.clock_domain_enable.clone())),
            Statement::connect(self.is_fired(), self.is_fired_or_firing()),
        )
    }
}

/// Channel of a transformed module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    /// Clock channel.
    Clock(ClockChannel),
    /// Virtual clock channel.
    VirtualClock(VirtualClockChannel),
    /// Input data channel.
    Input(DataChannel),
    /// Output data channel.
    Output(DataChannel),
}

impl Channel {
    /// Returns the name of the channel. The virtual clock channel is named after its clock.
    pub fn name(&self) -> &str {
        match self {
            Channel::Clock(channel) => &channel.name,
            Channel::VirtualClock(channel) => &channel.clock.name,
            Channel::Input(channel) | Channel::Output(channel) => &channel.name,
        }
    }

    /// Returns the direction of the channel.
    pub fn direction(&self) -> Direction {
        match self {
            Channel::Clock(_) | Channel::VirtualClock(_) | Channel::Input(_) => Direction::Input,
            Channel::Output(_) => Direction::Output,
        }
    }

    /// Returns the aggregated ports of the original module.
    pub fn ports(&self) -> &[Port] {
        match self {
            Channel::Clock(channel) => &channel.ports,
            Channel::VirtualClock(channel) => std::slice::from_ref(&channel.clock),
            Channel::Input(channel) | Channel::Output(channel) => &channel.ports,
        }
    }

    /// Whether the payload carries a simulation-time field.
    pub fn has_timestamp(&self) -> bool {
        match self {
            Channel::Clock(channel) => channel.has_timestamp,
            Channel::VirtualClock(_) => false,
            Channel::Input(channel) | Channel::Output(channel) => channel.has_timestamp,
        }
    }

    /// Returns the data channel, if `self` is one.
    pub fn as_data(&self) -> Option<&DataChannel> {
        match self {
            Channel::Input(channel) | Channel::Output(channel) => Some(channel),
            Channel::Clock(_) | Channel::VirtualClock(_) => None,
        }
    }

    /// Name of the host port. The virtual clock channel has none.
    pub fn host_port_name(&self) -> Option<String> {
        match self {
            Channel::Clock(channel) => Some(sink_name(&channel.name)),
            Channel::VirtualClock(_) => None,
            Channel::Input(channel) | Channel::Output(channel) => Some(channel.host_port.clone()),
        }
    }

    /// True exactly when a token is present this host cycle.
    pub fn validity(&self) -> Expression {
        match self {
            Channel::VirtualClock(_) => Expression::bool(true),
            Channel::Clock(channel) => Expression::sub_field(channel.port_ref(), "valid"),
            Channel::Input(channel) | Channel::Output(channel) => channel.valid(),
        }
    }

    /// Path from the host port to the payload field carrying `port`.
    pub fn payload_path(&self, port: &str) -> Result<Vec<String>, ChannelError> {
        match self {
            Channel::VirtualClock(channel) => Err(ChannelError::NoPayload(channel.clock.name.clone())),
            _ => {
                let ports = self.ports().iter().map(|port| port.name.as_str()).collect::<Vec<_>>();
                payload_path(self.name(), &ports, port, self.has_timestamp())
            }
        }
    }

    /// Maps a reference to one of the channel's original ports to the payload field carrying it.
    ///
    /// A single-port channel maps to the bare payload.
    pub fn payload(&self, port: &str) -> Result<Expression, ChannelError> {
        let host_port = self.host_port_name().ok_or_else(|| ChannelError::NoPayload(self.name().to_string()))?;
        Ok(self.payload_path(port)?.into_iter().fold(Expression::reference(host_port), Expression::sub_field))
    }

    /// Synthesizes the decoupled host port of the channel. The virtual clock channel has none.
    pub fn host_port(&self) -> Result<Option<Port>, ChannelError> {
        let name = some_or!(self.host_port_name(), return Ok(None));
        let tpe = Type::decoupled(payload_type(self.name(), self.ports(), self.has_timestamp())?);

        Ok(Some(Port { name, direction: self.direction(), tpe }))
    }

    /// Drives the readiness of an input channel.
    ///
    /// Data inputs accept a token when `advance` holds and they have not fired yet; the clock channel accepts one
    /// whenever `advance` holds. Returns `None` for channels without readiness.
    pub fn set_ready(&self, advance: &Expression) -> Option<Statement> {
        match self {
            Channel::Clock(channel) => Some(Statement::connect(
                Expression::sub_field(channel.port_ref(), "ready"),
                advance.clone(),
            )),
            Channel::Input(channel) => Some(Statement::connect(
                channel.ready(),
                Expression::and(advance.clone(), Expression::not(channel.is_fired())),
            )),
            Channel::VirtualClock(_) | Channel::Output(_) => None,
        }
    }

    /// Drives the validity of an output channel from the validity of its combinational dependencies.
    ///
    /// Returns `None` for non-output channels.
    pub fn set_validity<'a, I>(&self, dependencies: I) -> Option<Statement>
    where I: IntoIterator<Item = &'a Channel> {
        match self {
            Channel::Output(channel) => Some(Statement::connect(
                channel.valid(),
                Expression::and_reduce(
                    dependencies
                        .into_iter()
                        .map(Channel::validity)
                        .chain(std::iter::once(Expression::not(channel.is_fired()))),
                ),
            )),
            Channel::Clock(_) | Channel::VirtualClock(_) | Channel::Input(_) => None,
        }
    }

    /// Connects the time field of a timestamped output channel.
    pub fn connect_timestamp(&self, sim_time: &Expression) -> Option<Statement> {
        match self {
            Channel::Output(channel) if channel.has_timestamp => Some(Statement::connect(
                Expression::sub_field(Expression::sub_field(Expression::reference(channel.host_port.clone()), "bits"), "time"),
                sim_time.clone(),
            )),
            _ => None,
        }
    }
}

/// Arena of the channels of one module.
#[derive(Debug, Default, Clone)]
pub struct Channels {
    inner: Vec<Channel>,
}

impl Index<ChannelId> for Channels {
    type Output = Channel;

    fn index(&self, id: ChannelId) -> &Channel { &self.inner[id.0] }
}

impl Channels {
    /// Creates new empty arena.
    pub fn new() -> Self { Self::default() }

    /// Adds a channel.
    pub fn push(&mut self, channel: Channel) -> ChannelId {
        self.inner.push(channel);
        ChannelId(self.inner.len() - 1)
    }

    /// Returns the number of channels.
    pub fn len(&self) -> usize { self.inner.len() }

    /// Returns true if there are no channels.
    pub fn is_empty(&self) -> bool { self.inner.is_empty() }

    /// Iterates over all channels.
    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &Channel)> {
        self.inner.iter().enumerate().map(|(index, channel)| (ChannelId(index), channel))
    }

    /// Iterates over input data channels.
    pub fn inputs(&self) -> impl Iterator<Item = (ChannelId, &DataChannel)> {
        self.iter().filter_map(|(id, channel)| match channel {
            Channel::Input(channel) => Some((id, channel)),
            _ => None,
        })
    }

    /// Iterates over output data channels.
    pub fn outputs(&self) -> impl Iterator<Item = (ChannelId, &DataChannel)> {
        self.iter().filter_map(|(id, channel)| match channel {
            Channel::Output(channel) => Some((id, channel)),
            _ => None,
        })
    }

    /// Returns the clock channel, real or virtual.
    pub fn clock(&self) -> Option<&Channel> {
        self.inner.iter().find(|channel| matches!(channel, Channel::Clock(_) | Channel::VirtualClock(_)))
    }
}
