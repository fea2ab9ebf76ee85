//! Runs the channelization pass on sample circuits and writes the results to `./build`.

mod dual_clock;
mod pipeline;

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use itertools::Itertools;
use libdn::fir::Circuit;
use libdn::{Annotation, Fame1Pass, ReferenceTarget, StaticAnalysis, TransformError};
use log::info;
use thiserror::Error;

#[derive(Debug, Error)]
enum DemoError {
    #[error("file system error: {error:?}")]
    Fs { error: io::Error },

    #[error("transform error: {error}")]
    Transform { error: TransformError },
}

fn write<P: AsRef<Path>>(path: P, contents: &str) -> Result<(), DemoError> {
    let mut file = File::create(path).map_err(|error| DemoError::Fs { error })?;
    writeln!(file, "{}", contents).map_err(|error| DemoError::Fs { error })
}

/// Writes `<name>.fir`, `<name>_fame1.fir` and `<name>.renames`.
fn gen_fir<P: AsRef<Path>>(
    path_dir: P, name: &str, circuit: Circuit, analysis: StaticAnalysis,
) -> Result<(), DemoError> {
    // Dont-touch annotations on transformed modules are pruned by the pass.
    let annotations = circuit
        .modules
        .iter()
        .flat_map(|module| {
            module
                .ports
                .iter()
                .map(move |port| Annotation::DontTouch(ReferenceTarget::new(module.name.clone(), port.name.clone())))
        })
        .chain(circuit.modules.iter().map(|module| Annotation::NoDedup { module: module.name.clone() }))
        .collect();

    let output =
        Fame1Pass::default().run(&circuit, &analysis, annotations).map_err(|error| DemoError::Transform { error })?;
    info!("{}: {} renames, {} annotations kept", name, output.renames.len(), output.annotations.len());

    let renames = output
        .renames
        .iter()
        .map(|(from, to)| match to {
            Some(to) => format!("{} -> {}", from, to),
            None => format!("{} -> (deleted)", from),
        })
        .join("\n");

    write(path_dir.as_ref().join(format!("{}.fir", name)), &circuit.to_string())?;
    write(path_dir.as_ref().join(format!("{}_fame1.fir", name)), &output.circuit.to_string())?;
    write(path_dir.as_ref().join(format!("{}.renames", name)), &renames)
}

fn main() -> Result<(), DemoError> {
    env_logger::init();

    let path_dir = Path::new("./build");
    fs::create_dir_all(path_dir).map_err(|error| DemoError::Fs { error })?;

    let (circuit, analysis) = dual_clock::circuit();
    gen_fir(path_dir, "dual_clock", circuit, analysis)?;

    let (circuit, analysis) = pipeline::circuit();
    gen_fir(path_dir, "pipeline", circuit, analysis)
}
