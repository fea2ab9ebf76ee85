//! Circuit-level driver of the channelization pass.

use std::collections::HashMap;

use log::{debug, info};

use crate::analysis::ChannelAnalysis;
use crate::annotation::{prune_annotations, Annotation};
use crate::clock::{clock_gate_module, HostSignals};
use crate::config::Config;
use crate::fir::Circuit;
use crate::rename::RenameMap;
use crate::top::transform_top;
use crate::transform::{transform_module, TransformError};

/// Result of running the pass on a circuit.
#[derive(Debug, Clone)]
pub struct PassOutput {
    /// The transformed circuit
    pub circuit: Circuit,
    /// Where the original ports went
    pub renames: RenameMap,
    /// Annotations that still apply
    pub annotations: Vec<Annotation>,
}

/// Rewrites every targeted module of a circuit into a token-driven model and rewires the main module around them.
#[derive(Debug, Default, Clone)]
pub struct Fame1Pass {
    config: Config,
}

impl Fame1Pass {
    /// Creates new pass.
    pub fn new(config: Config) -> Self { Self { config } }

    /// Returns the configuration of the pass.
    pub fn config(&self) -> &Config { &self.config }

    /// Runs the pass. Any error aborts the whole circuit.
    pub fn run<A: ChannelAnalysis + ?Sized>(
        &self, circuit: &Circuit, analysis: &A, annotations: Vec<Annotation>,
    ) -> Result<PassOutput, TransformError> {
        let host = HostSignals::from_config(&self.config);
        let targets = analysis.transformed_modules();
        info!("channelizing {} module(s) of circuit `{}`", targets.len(), circuit.main);

        let mut circuit = circuit.clone();
        let mut renames = RenameMap::new();
        let mut layouts = HashMap::new();

        for name in &targets {
            let module = circuit.module_mut(name).ok_or_else(|| TransformError::UnknownModule(name.clone()))?;
            let transformed = transform_module(module, analysis, &host, &self.config)?;

            renames.record_module(name, &transformed.layout);
            layouts.insert(name.clone(), transformed.layout);
            *module = transformed.module;
        }

        if targets.contains(&circuit.main) {
            debug!("main module `{}` is itself transformed, skipping top-level rewiring", circuit.main);
        } else {
            let main = circuit.main.clone();
            let top = circuit.module_mut(&main).ok_or_else(|| TransformError::UnknownModule(main.clone()))?;
            let rewired = transform_top(top, analysis, &layouts, &host, &self.config)?;
            let dropped = top
                .ports
                .iter()
                .filter(|port| rewired.port(&port.name).is_none())
                .map(|port| port.name.clone())
                .collect::<Vec<_>>();
            *top = rewired;

            renames.record_top(&main, &analysis.top_channels())?;
            renames.record_dropped_ports(&main, dropped);
        }

        if !targets.is_empty() && !circuit.ext_modules.iter().any(|module| module.name == self.config.clock_gate) {
            circuit.ext_modules.push(clock_gate_module(&self.config));
        }

        let annotations = prune_annotations(annotations, &targets);
        info!("recorded {} rename(s), kept {} annotation(s)", renames.len(), annotations.len());

        Ok(PassOutput { circuit, renames, annotations })
    }
}
