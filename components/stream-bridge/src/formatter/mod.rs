//! Rendering of tailed units into text lines.

pub mod formatter;
