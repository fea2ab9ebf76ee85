//! LI-BDN channelization: rewrites multi-clock FIRRTL modules into single-host-clock, token-driven models.
//!
//! Every cross-module wire becomes a decoupled (valid/ready) channel, every target clock becomes a gated clock driven
//! from clock tokens, and a target clock domain only advances once every channel it needs has exchanged its token.

// # Tries to deny all lints (`rustc -W help`).
#![deny(absolute_paths_not_starting_with_crate)]
#![deny(anonymous_parameters)]
#![deny(deprecated_in_future)]
#![deny(explicit_outlives_requirements)]
#![deny(keyword_idents)]
#![deny(macro_use_extern_crate)]
#![deny(missing_debug_implementations)]
#![deny(non_ascii_idents)]
#![deny(rust_2018_idioms)]
#![deny(trivial_numeric_casts)]
#![deny(unsafe_op_in_unsafe_fn)]
#![deny(unused_extern_crates)]
#![deny(unused_import_braces)]
//
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::private_doc_tests)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_html_tags)]
#![deny(rustdoc::invalid_rust_codeblocks)]
#![deny(rustdoc::bare_urls)]
#![deny(unreachable_pub)]
//
#![allow(clippy::needless_lifetimes)]
#![allow(elided_lifetimes_in_paths)]

pub mod analysis;
pub mod annotation;
pub mod channel;
pub mod clock;
pub mod config;
pub mod fir;
pub mod pass;
pub mod rename;
pub mod top;
pub mod transform;
pub mod utils;

pub use analysis::{ChannelAnalysis, ChannelInfo, ConnectivityGraph, StaticAnalysis, TopChannel};
pub use annotation::{prune_annotations, Annotation};
pub use channel::{Channel, ChannelError, ChannelId, Channels};
pub use clock::{ClockDomain, ClockDomains, HostSignals};
pub use config::Config;
#[doc(hidden)]
pub use linked_hash_map;
pub use pass::{Fame1Pass, PassOutput};
pub use rename::{ReferenceTarget, RenameMap};
pub use top::transform_top;
pub use transform::{transform_module, ChannelLayout, DependencyMap, PortLocation, TransformError, TransformedModule};
pub use utils::*;
