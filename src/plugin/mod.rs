//! Plugin capability interface and static registry.
//!
//! Plugins are compiled in and registered explicitly; there is no dynamic
//! loading.

mod builtin;
mod registry;

pub use builtin::*;
pub use registry::*;
