//! Ingestion path: input lines -> single-field entries of one stream.

pub mod async_read;
pub mod source;
pub mod writer;
