//! Annotations attached to the circuit.

use std::fmt;

use log::debug;

use crate::rename::ReferenceTarget;

/// Annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    /// The referenced signal must survive optimization.
    DontTouch(ReferenceTarget),
    /// The module must not be deduplicated.
    NoDedup {
        /// Name of the module
        module: String,
    },
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Annotation::DontTouch(target) => write!(f, "DontTouch({})", target),
            Annotation::NoDedup { module } => write!(f, "NoDedup({})", module),
        }
    }
}

impl Annotation {
    /// Name of the annotated module.
    pub fn module(&self) -> &str {
        match self {
            Annotation::DontTouch(target) => &target.module,
            Annotation::NoDedup { module } => module,
        }
    }
}

/// Drops the dont-touch annotations of transformed modules; the signals they protect no longer exist.
pub fn prune_annotations(annotations: Vec<Annotation>, transformed: &[String]) -> Vec<Annotation> {
    annotations
        .into_iter()
        .filter(|annotation| {
            let stale = matches!(annotation, Annotation::DontTouch(_))
                && transformed.iter().any(|module| module == annotation.module());
            if stale {
                debug!("pruning annotation {}", annotation);
            }
            !stale
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_dont_touch_of_transformed_modules_is_pruned() {
        let annotations = vec![
            Annotation::DontTouch(ReferenceTarget::new("A", "x")),
            Annotation::DontTouch(ReferenceTarget::new("Top", "y")),
            Annotation::NoDedup { module: "A".to_string() },
        ];

        let pruned = prune_annotations(annotations, &["A".to_string()]);
        assert_eq!(pruned, vec![
            Annotation::DontTouch(ReferenceTarget::new("Top", "y")),
            Annotation::NoDedup { module: "A".to_string() },
        ]);
    }
}
