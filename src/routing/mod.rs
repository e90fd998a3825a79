//! Routing module
//!
//! Method + path bindings and the matching rules used at request time:
//! exact patterns, trailing-`*` prefix patterns, longest literal wins.

mod pattern;
mod table;

pub use pattern::{PathPattern, WILDCARD};
pub use table::{Route, RouteTable};
