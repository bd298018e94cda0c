//! Cursor-tracked, multiplexed tailing of many streams.

pub mod models;
pub mod tailer;
