//! Top-level rewiring.
//!
//! The top module keeps its structure, but every connection to a transformed instance's channelized port is replaced
//! by one whole-port connection between the instance's host port and its partner: a top-level channel port, or the
//! host port of another transformed instance.

use std::collections::{HashMap, HashSet};

use log::{debug, trace, warn};

use crate::analysis::ChannelAnalysis;
use crate::channel::{host_port_name, payload_type};
use crate::clock::HostSignals;
use crate::config::Config;
use crate::fir::*;
use crate::transform::{ChannelLayout, PortLocation, TransformError};

/// What one side of a top-level connection refers to.
#[derive(Debug)]
enum Endpoint {
    /// Host port of a transformed instance's channel.
    InstanceChannel(Expression),
    /// Clock of a transformed instance that is now generated inside the instance.
    InstanceClock,
    /// Port aggregated into a top-level channel, standing for the channel's host port.
    TopChannel(Expression),
    /// Removed top-level port.
    Stale,
    /// Anything else.
    Other,
}

struct TopRewriter<'a> {
    instances: HashMap<String, &'a ChannelLayout>,
    members: HashMap<String, Expression>,
    stale: HashSet<String>,
    host: &'a HostSignals,
    config: &'a Config,
    connected: HashSet<String>,
}

fn into_stmt(mut stmts: Vec<Statement>) -> Statement {
    match stmts.len() {
        0 => Statement::EmptyStmt,
        1 => stmts.remove(0),
        _ => Statement::block(stmts),
    }
}

impl<'a> TopRewriter<'a> {
    fn endpoint(&self, expr: &Expression) -> Endpoint {
        if let Expression::SubField { expr: inner, name: port } = expr {
            if let Expression::Reference { name: instance } = inner.as_ref() {
                if let Some(layout) = self.instances.get(instance) {
                    return match layout.location(port) {
                        Some(PortLocation::Channel { host_port, .. }) => Endpoint::InstanceChannel(Expression::sub_field(
                            Expression::reference(instance.clone()),
                            host_port.clone(),
                        )),
                        Some(PortLocation::GatedClock(_)) => Endpoint::InstanceClock,
                        None => Endpoint::Other,
                    };
                }
            }
        }

        if let Expression::Reference { name } = expr {
            if let Some(host_port) = self.members.get(name) {
                return Endpoint::TopChannel(host_port.clone());
            }
        }

        match expr.root_name() {
            Some(root) if self.stale.contains(root) => Endpoint::Stale,
            _ => Endpoint::Other,
        }
    }

    /// Connects two channel host ports once, however many of their original ports were connected.
    fn connect_channels(&mut self, sink: Expression, source: Expression) -> Vec<Statement> {
        let stmt = Statement::partial_connect(sink, source);
        if self.connected.insert(stmt.to_string()) {
            trace!("{}", stmt);
            vec![stmt]
        } else {
            Vec::new()
        }
    }

    fn rewrite_connect(&mut self, stmt: Statement) -> Vec<Statement> {
        let endpoints = match &stmt {
            Statement::Connect { loc, expr } | Statement::PartialConnect { loc, expr } => {
                (self.endpoint(loc), self.endpoint(expr))
            }
            _ => return vec![stmt],
        };

        match endpoints {
            (Endpoint::InstanceChannel(sink), Endpoint::InstanceChannel(source))
            | (Endpoint::InstanceChannel(sink), Endpoint::TopChannel(source))
            | (Endpoint::TopChannel(sink), Endpoint::InstanceChannel(source)) => self.connect_channels(sink, source),
            (Endpoint::InstanceClock, _) | (_, Endpoint::InstanceClock) | (Endpoint::Stale, _) | (_, Endpoint::Stale) => {
                trace!("dropping `{}`", stmt);
                Vec::new()
            }
            (Endpoint::Other, Endpoint::Other) => vec![stmt],
            _ => {
                warn!("dropping `{}`: a channel port can only be connected to another channel port", stmt);
                Vec::new()
            }
        }
    }

    fn rewrite(&mut self, stmt: Statement) -> Vec<Statement> {
        match stmt {
            Statement::Block { stmts } => stmts.into_iter().flat_map(|stmt| self.rewrite(stmt)).collect(),
            Statement::Conditionally { pred, conseq, alt } => {
                let conseq = into_stmt(self.rewrite(*conseq));
                let alt = into_stmt(self.rewrite(*alt));
                vec![Statement::when(pred, conseq, alt)]
            }
            Statement::DefInstance { name, module } if self.instances.contains_key(&name) => {
                let instance = Expression::reference(name.clone());
                vec![
                    Statement::DefInstance { name, module },
                    Statement::connect(
                        Expression::sub_field(instance.clone(), self.config.host_clock.clone()),
                        self.host.clock.clone(),
                    ),
                    Statement::connect(
                        Expression::sub_field(instance, self.config.host_reset.clone()),
                        self.host.reset.clone(),
                    ),
                ]
            }
            stmt @ (Statement::Connect { .. } | Statement::PartialConnect { .. }) => self.rewrite_connect(stmt),
            Statement::IsInvalid { expr } if !matches!(self.endpoint(&expr), Endpoint::Other) => Vec::new(),
            Statement::EmptyStmt => Vec::new(),
            stmt => vec![stmt],
        }
    }
}

/// Rewrites the top module around the transformed instances.
///
/// `layouts` maps every transformed module to the layout of its channels.
pub fn transform_top<A: ChannelAnalysis + ?Sized>(
    top: &Module, analysis: &A, layouts: &HashMap<String, ChannelLayout>, host: &HostSignals, config: &Config,
) -> Result<Module, TransformError> {
    debug!("rewiring top module `{}`", top.name);

    let mut members = HashMap::new();
    let mut channel_ports = Vec::new();
    for (name, channel) in analysis.top_channels().iter() {
        let ports = channel
            .ports
            .iter()
            .map(|port| {
                top.port(port).cloned().ok_or_else(|| TransformError::UnknownPort {
                    module: top.name.clone(),
                    channel: name.clone(),
                    port: port.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let host_port = host_port_name(name, channel.direction);
        for port in &channel.ports {
            members.insert(port.clone(), Expression::reference(host_port.clone()));
        }
        channel_ports.push(Port {
            name: host_port,
            direction: channel.direction,
            tpe: Type::decoupled(payload_type(name, &ports, channel.has_timestamp)?),
        });
    }

    let stale = analysis
        .stale_top_ports()
        .into_iter()
        .chain(top.ports.iter().filter(|port| port.tpe.is_clock() && port.name != config.host_clock).map(|port| port.name.clone()))
        .chain(members.keys().cloned())
        .collect::<HashSet<_>>();

    let mut ports = vec![
        top.port(&config.host_clock).cloned().unwrap_or_else(|| Port::input(config.host_clock.clone(), Type::clock())),
        top.port(&config.host_reset).cloned().unwrap_or_else(|| Port::input(config.host_reset.clone(), Type::uint(1))),
    ];
    ports.extend(
        top.ports
            .iter()
            .filter(|port| {
                !stale.contains(&port.name) && port.name != config.host_clock && port.name != config.host_reset
            })
            .cloned(),
    );
    ports.extend(channel_ports);

    let mut instances = HashMap::new();
    top.body.for_each(&mut |stmt| {
        if let Statement::DefInstance { name, module } = stmt {
            if let Some(layout) = layouts.get(module) {
                instances.insert(name.clone(), layout);
            }
        }
    });

    let mut rewriter = TopRewriter { instances, members, stale, host, config, connected: HashSet::new() };
    let body = Statement::block(rewriter.rewrite(top.body.clone()));

    Ok(Module { name: top.name.clone(), ports, body })
}
