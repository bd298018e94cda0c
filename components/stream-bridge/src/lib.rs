//! Bridges line-oriented text I/O and Redis Streams.
//!
//! Lines read from stdin (or a file) are appended as entries to a single stream, and
//! one or more streams can be tailed back out as text lines, so a shell pipeline can
//! treat remote streams as if they were stdin/stdout.
//!
//! ```text
//! {stdin | file} -> ingest -> LogStore
//! LogStore -> discovery -> tailer -> formatter -> stdout
//! ```

pub mod cli;
pub mod discovery;
pub mod error;
pub mod formatter;
pub mod helpers;
pub mod ingest;
pub mod instrumentation;
pub mod metrics;
pub mod runtime;
pub mod store;
pub mod tailer;
