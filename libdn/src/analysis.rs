//! Results of the channel analysis consumed by the pass.
//!
//! Channel membership, per-channel clock association and port connectivity are discovered upstream. The pass only
//! queries them through [`ChannelAnalysis`]; [`StaticAnalysis`] is an in-memory implementation a driver can fill in.

use std::collections::{HashMap, HashSet, VecDeque};

use linked_hash_map::LinkedHashMap;

use crate::fir::Direction;

/// Membership of one channel inside a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    /// Signal declared as the channel's clock, if any.
    pub clock: Option<String>,

    /// Names of the aggregated ports, in payload order.
    pub ports: Vec<String>,
}

impl ChannelInfo {
    /// Creates new channel info.
    pub fn new(clock: Option<&str>, ports: &[&str]) -> Self {
        Self { clock: clock.map(String::from), ports: ports.iter().map(|port| port.to_string()).collect() }
    }
}

/// Channel of the top module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopChannel {
    /// `Input` for sinks, `Output` for sources.
    pub direction: Direction,

    /// Names of the aggregated top-level ports, in payload order.
    pub ports: Vec<String>,

    /// Whether the channel's payload carries a simulation-time field.
    pub has_timestamp: bool,
}

/// Port-level structural dependency graph of a module.
///
/// An edge `sink -> source` states that `source` structurally influences `sink`.
#[derive(Debug, Default, Clone)]
pub struct ConnectivityGraph {
    edges: LinkedHashMap<String, Vec<String>>,
}

impl ConnectivityGraph {
    /// Creates new empty graph.
    pub fn new() -> Self { Self::default() }

    /// Records that `source` structurally influences `sink`.
    pub fn add_edge<S: Into<String>, T: Into<String>>(&mut self, sink: S, source: T) {
        let sources = self.edges.entry(sink.into()).or_insert_with(Vec::new);
        let source = source.into();
        if !sources.contains(&source) {
            sources.push(source);
        }
    }

    /// Returns the signals directly influencing `signal`.
    pub fn drivers(&self, signal: &str) -> &[String] { self.edges.get(signal).map(Vec::as_slice).unwrap_or(&[]) }

    /// Returns every signal that transitively influences `signal`, in breadth-first order.
    ///
    /// `signal` itself is only included when it lies on a cycle.
    pub fn reachable_from(&self, signal: &str) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut queue = self.drivers(signal).iter().collect::<VecDeque<_>>();

        while let Some(node) = queue.pop_front() {
            if !visited.insert(node.as_str()) {
                continue;
            }
            order.push(node.clone());
            queue.extend(self.drivers(node));
        }

        order
    }
}

/// Queries answered by the upstream channel analysis.
pub trait ChannelAnalysis {
    /// Input-direction channels of `module`, including its clock channel.
    fn input_channels(&self, module: &str) -> LinkedHashMap<String, ChannelInfo>;

    /// Output-direction channels of `module`.
    fn output_channels(&self, module: &str) -> LinkedHashMap<String, ChannelInfo>;

    /// Port-level connectivity of `module`.
    fn connectivity(&self, module: &str) -> &ConnectivityGraph;

    /// Whether the named channel carries a simulation-time field.
    fn has_timestamp(&self, channel: &str) -> bool;

    /// Modules to be transformed.
    fn transformed_modules(&self) -> Vec<String>;

    /// Top-level ports that no longer exist after the transformation.
    fn stale_top_ports(&self) -> Vec<String>;

    /// Channels of the top module.
    fn top_channels(&self) -> LinkedHashMap<String, TopChannel>;
}

/// In-memory analysis results.
#[derive(Debug, Default, Clone)]
pub struct StaticAnalysis {
    inputs: HashMap<String, LinkedHashMap<String, ChannelInfo>>,
    outputs: HashMap<String, LinkedHashMap<String, ChannelInfo>>,
    graphs: HashMap<String, ConnectivityGraph>,
    empty_graph: ConnectivityGraph,
    timestamps: HashSet<String>,
    transformed: Vec<String>,
    stale_top_ports: Vec<String>,
    top_channels: LinkedHashMap<String, TopChannel>,
}

impl StaticAnalysis {
    /// Creates new empty analysis.
    pub fn new() -> Self { Self::default() }

    /// Adds an input channel of `module`.
    pub fn add_input_channel(&mut self, module: &str, name: &str, clock: Option<&str>, ports: &[&str]) -> &mut Self {
        self.inputs.entry(module.to_string()).or_default().insert(name.to_string(), ChannelInfo::new(clock, ports));
        self
    }

    /// Adds an output channel of `module`.
    pub fn add_output_channel(&mut self, module: &str, name: &str, clock: Option<&str>, ports: &[&str]) -> &mut Self {
        self.outputs.entry(module.to_string()).or_default().insert(name.to_string(), ChannelInfo::new(clock, ports));
        self
    }

    /// Records that `source` structurally influences `sink` inside `module`.
    pub fn add_edge(&mut self, module: &str, sink: &str, source: &str) -> &mut Self {
        self.graphs.entry(module.to_string()).or_default().add_edge(sink, source);
        self
    }

    /// Marks the named channel as timestamped.
    pub fn set_timestamp(&mut self, channel: &str) -> &mut Self {
        self.timestamps.insert(channel.to_string());
        self
    }

    /// Marks `module` for transformation.
    pub fn add_transformed_module(&mut self, module: &str) -> &mut Self {
        if !self.transformed.iter().any(|name| name == module) {
            self.transformed.push(module.to_string());
        }
        self
    }

    /// Marks a top-level port as stale.
    pub fn add_stale_top_port(&mut self, port: &str) -> &mut Self {
        self.stale_top_ports.push(port.to_string());
        self
    }

    /// Adds a channel of the top module.
    pub fn add_top_channel(&mut self, name: &str, direction: Direction, ports: &[&str]) -> &mut Self {
        let has_timestamp = self.timestamps.contains(name);
        self.top_channels.insert(name.to_string(), TopChannel {
            direction,
            ports: ports.iter().map(|port| port.to_string()).collect(),
            has_timestamp,
        });
        self
    }
}

impl ChannelAnalysis for StaticAnalysis {
    fn input_channels(&self, module: &str) -> LinkedHashMap<String, ChannelInfo> {
        self.inputs.get(module).cloned().unwrap_or_default()
    }

    fn output_channels(&self, module: &str) -> LinkedHashMap<String, ChannelInfo> {
        self.outputs.get(module).cloned().unwrap_or_default()
    }

    fn connectivity(&self, module: &str) -> &ConnectivityGraph { self.graphs.get(module).unwrap_or(&self.empty_graph) }

    fn has_timestamp(&self, channel: &str) -> bool { self.timestamps.contains(channel) }

    fn transformed_modules(&self) -> Vec<String> { self.transformed.clone() }

    fn stale_top_ports(&self) -> Vec<String> { self.stale_top_ports.clone() }

    fn top_channels(&self) -> LinkedHashMap<String, TopChannel> { self.top_channels.clone() }
}
