//! FIRRTL intermediate representation.

mod ir;
mod namespace;

pub use ir::*;
pub use namespace::*;
