// Local crates
use crate::{store::models::EntryId, tailer::models::TailUnit};

// External crates
use chrono::{Local, TimeZone};

/// Separator between output columns.
const COLUMN_SEPARATOR: &str = ": ";

/// Optional output columns. The value column is always present and always last.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Columns {
    pub timestamp: bool,
    pub stream_name: bool,
    pub index: bool,
    pub key_out: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Timestamp,
    StreamName,
    Index,
    KeyOut,
    Value,
}

/// A unit could not be rendered as configured.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// The index carries no decodable millisecond timestamp. `fallback` is the line with the
    /// raw index in the timestamp column.
    #[error("cannot decode timestamp of entry {id:?} on stream {stream:?}")]
    MalformedIndex {
        stream: String,
        id: String,
        fallback: String,
    },
}

impl FormatError {
    /// Best-effort line to print in place of the failed one.
    pub fn into_fallback(self) -> String {
        match self {
            FormatError::MalformedIndex { fallback, .. } => fallback,
        }
    }
}

/// Column layout built once per run.
///
/// Columns appear in the fixed order timestamp, stream name, index, key, value, joined by
/// `": "`. The stream name is left-justified and padded or truncated to the width of the
/// longest resolved stream name.
#[derive(Debug, Clone)]
pub struct LineTemplate {
    segments: Vec<Segment>,
    stream_name_width: usize,
}

impl LineTemplate {
    pub fn new(columns: Columns, stream_name_width: usize) -> Self {
        let mut segments = Vec::with_capacity(5);
        if columns.timestamp {
            segments.push(Segment::Timestamp);
        }
        if columns.stream_name {
            segments.push(Segment::StreamName);
        }
        if columns.index {
            segments.push(Segment::Index);
        }
        if columns.key_out {
            segments.push(Segment::KeyOut);
        }
        segments.push(Segment::Value);

        Self {
            segments,
            stream_name_width,
        }
    }

    /// Render one unit as a line, without the terminator.
    ///
    /// Never panics: when the timestamp cannot be decoded the line is still built (with the
    /// raw index in its place) and handed back inside the error.
    pub fn render(&self, unit: &TailUnit) -> Result<String, FormatError> {
        let mut line = String::new();
        let mut malformed = false;

        for (position, segment) in self.segments.iter().enumerate() {
            if position > 0 {
                line.push_str(COLUMN_SEPARATOR);
            }
            match segment {
                Segment::Timestamp => match decode_timestamp(&unit.id) {
                    Some(timestamp) => line.push_str(&timestamp),
                    None => {
                        malformed = true;
                        line.push_str(&unit.id);
                    }
                },
                Segment::StreamName => {
                    let width = self.stream_name_width;
                    line.push_str(&format!("{:<width$.width$}", unit.stream));
                }
                Segment::Index => line.push_str(&unit.id),
                Segment::KeyOut => line.push_str(&unit.key),
                Segment::Value => line.push_str(&String::from_utf8_lossy(&unit.value)),
            }
        }

        if malformed {
            return Err(FormatError::MalformedIndex {
                stream: unit.stream.clone(),
                id: unit.id.clone(),
                fallback: line,
            });
        }
        Ok(line)
    }
}

/// `YYYY-MM-DD HH:MM:SS.mmm` in local time for the millisecond part of an index.
pub fn decode_timestamp(id: &str) -> Option<String> {
    let id: EntryId = id.parse().ok()?;
    let millis = i64::try_from(id.millis).ok()?;
    let local = Local.timestamp_millis_opt(millis).single()?;
    Some(local.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
}
