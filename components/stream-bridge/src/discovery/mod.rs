//! Pattern-based discovery and resolution of the streams a run acts on.

pub mod resolver;
