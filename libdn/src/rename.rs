//! Rename map from original port references to their channelized locations.

use std::{fmt, iter};

use itertools::Itertools;
use linked_hash_map::LinkedHashMap;
use log::debug;

use crate::analysis::TopChannel;
use crate::channel::{host_port_name, payload_path, ChannelError};
use crate::transform::ChannelLayout;

/// Reference to a signal inside a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceTarget {
    /// Name of the module
    pub module: String,
    /// Dotted reference inside the module
    pub reference: String,
}

impl fmt::Display for ReferenceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}>{}", self.module, self.reference) }
}

impl ReferenceTarget {
    /// Creates new reference target.
    pub fn new<S: Into<String>, T: Into<String>>(module: S, reference: T) -> Self {
        Self { module: module.into(), reference: reference.into() }
    }
}

/// Insertion-ordered rename table. Each original reference is recorded once; later records are ignored.
///
/// A reference mapped to `None` was deleted.
#[derive(Debug, Default, Clone)]
pub struct RenameMap {
    renames: LinkedHashMap<ReferenceTarget, Option<ReferenceTarget>>,
}

impl RenameMap {
    /// Creates new empty rename map.
    pub fn new() -> Self { Self::default() }

    /// Records that `from` now lives at `to`. Returns false if `from` was already recorded.
    pub fn record(&mut self, from: ReferenceTarget, to: ReferenceTarget) -> bool { self.insert(from, Some(to)) }

    /// Records that `from` no longer exists. Returns false if `from` was already recorded.
    pub fn record_deleted(&mut self, from: ReferenceTarget) -> bool { self.insert(from, None) }

    fn insert(&mut self, from: ReferenceTarget, to: Option<ReferenceTarget>) -> bool {
        if self.renames.contains_key(&from) {
            return false;
        }
        self.renames.insert(from, to);
        true
    }

    /// Returns the new location of `from`.
    pub fn get(&self, from: &ReferenceTarget) -> Option<&ReferenceTarget> {
        self.renames.get(from).and_then(Option::as_ref)
    }

    /// Returns true if `from` was recorded as deleted.
    pub fn is_deleted(&self, from: &ReferenceTarget) -> bool { matches!(self.renames.get(from), Some(None)) }

    /// Returns the number of recorded renames.
    pub fn len(&self) -> usize { self.renames.len() }

    /// Returns true if nothing was renamed.
    pub fn is_empty(&self) -> bool { self.renames.is_empty() }

    /// Iterates over the renames in insertion order. Deleted references have no new location.
    pub fn iter(&self) -> impl Iterator<Item = (&ReferenceTarget, Option<&ReferenceTarget>)> {
        self.renames.iter().map(|(from, to)| (from, to.as_ref()))
    }

    /// Records the new location of every channelized port of a transformed module.
    pub fn record_module(&mut self, module: &str, layout: &ChannelLayout) {
        for (port, location) in layout.ports.iter() {
            self.record(ReferenceTarget::new(module, port.clone()), ReferenceTarget::new(module, location.reference()));
        }
    }

    /// Records the new location of every top-level port aggregated into a top channel.
    pub fn record_top(&mut self, top: &str, channels: &LinkedHashMap<String, TopChannel>) -> Result<(), ChannelError> {
        for (name, channel) in channels.iter() {
            let host_port = host_port_name(name, channel.direction);
            for port in &channel.ports {
                let path = payload_path(name, &channel.ports, port, channel.has_timestamp)?;
                let reference = iter::once(host_port.clone()).chain(path).join(".");
                self.record(ReferenceTarget::new(top, port.clone()), ReferenceTarget::new(top, reference));
            }
        }
        Ok(())
    }

    /// Records top-level ports that were dropped without a channel to take their place.
    pub fn record_dropped_ports<I: IntoIterator<Item = String>>(&mut self, top: &str, ports: I) {
        for port in ports {
            if self.record_deleted(ReferenceTarget::new(top, port.clone())) {
                debug!("top port `{}` of `{}` was dropped", port, top);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fir::Direction;

    #[test]
    fn first_record_wins() {
        let mut renames = RenameMap::new();
        let from = ReferenceTarget::new("M", "a");

        assert!(renames.record(from.clone(), ReferenceTarget::new("M", "a_sink.bits")));
        assert!(!renames.record(from.clone(), ReferenceTarget::new("M", "other")));
        assert_eq!(renames.get(&from).unwrap().to_string(), "M>a_sink.bits");
        assert_eq!(renames.len(), 1);
    }

    #[test]
    fn dropped_ports_are_deleted_unless_renamed() {
        let mut renames = RenameMap::new();
        renames.record(ReferenceTarget::new("Top", "in"), ReferenceTarget::new("Top", "in_sink.bits"));
        renames.record_dropped_ports("Top", vec!["in".to_string(), "clock".to_string()]);

        assert_eq!(renames.get(&ReferenceTarget::new("Top", "in")).unwrap().to_string(), "Top>in_sink.bits");
        assert!(renames.is_deleted(&ReferenceTarget::new("Top", "clock")));
        assert_eq!(renames.get(&ReferenceTarget::new("Top", "clock")), None);
        assert_eq!(renames.len(), 2);
    }

    #[test]
    fn top_ports_map_into_channel_payloads() {
        let mut channels = LinkedHashMap::new();
        channels.insert("io".to_string(), TopChannel {
            direction: Direction::Input,
            ports: vec!["io_foo".to_string(), "io_bar".to_string()],
            has_timestamp: true,
        });
        channels.insert("out".to_string(), TopChannel {
            direction: Direction::Output,
            ports: vec!["out".to_string()],
            has_timestamp: false,
        });

        let mut renames = RenameMap::new();
        renames.record_top("Top", &channels).unwrap();

        let renamed = renames.iter().map(|(from, to)| format!("{} -> {}", from, to.unwrap())).collect::<Vec<_>>();
        assert_eq!(renamed, vec![
            "Top>io_foo -> Top>io_sink.bits.data.foo",
            "Top>io_bar -> Top>io_sink.bits.data.bar",
            "Top>out -> Top>out_source.bits",
        ]);
    }
}
