// External crates
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;

/// Position of an entry inside its stream, `<millisecondTimestamp>-<sequence>`.
///
/// Ordering is lexicographic on `(millis, seq)`, which is the order the store assigns ids in
/// for a single stream. Ids from different streams carry no ordering relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId {
    pub millis: u64,
    pub seq: u64,
}

impl EntryId {
    /// The smallest id a stream can hold, everything in a stream sorts after it.
    pub const MIN: EntryId = EntryId { millis: 0, seq: 0 };

    pub const fn new(millis: u64, seq: u64) -> Self {
        Self { millis, seq }
    }

    /// Next id the store would assign at wall-clock `now_millis`.
    pub fn successor(&self, now_millis: u64) -> Self {
        if now_millis > self.millis {
            Self::new(now_millis, 0)
        } else {
            Self::new(self.millis, self.seq + 1)
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.millis, self.seq)
    }
}

/// Raised when a raw id does not look like `<u64>-<u64>` (or a bare `<u64>`).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed entry index {0:?}")]
pub struct InvalidEntryId(pub String);

impl FromStr for EntryId {
    type Err = InvalidEntryId;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidEntryId(raw.to_string());
        let (millis, seq) = match raw.split_once('-') {
            Some((millis, seq)) => (millis, seq),
            None => (raw, "0"),
        };
        let millis = millis.parse::<u64>().map_err(|_| invalid())?;
        let seq = seq.parse::<u64>().map_err(|_| invalid())?;
        Ok(Self::new(millis, seq))
    }
}

/// Type of a key as reported by the store. Only `Stream` keys are visible to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    Stream,
    String,
    List,
    Set,
    ZSet,
    Hash,
    /// Key does not exist.
    None,
    Other(String),
}

impl From<&str> for Kind {
    fn from(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "stream" => Kind::Stream,
            "string" => Kind::String,
            "list" => Kind::List,
            "set" => Kind::Set,
            "zset" => Kind::ZSet,
            "hash" => Kind::Hash,
            "none" => Kind::None,
            _ => Kind::Other(name.to_string()),
        }
    }
}

/// Ordered field mapping of one entry.
///
/// Keys are unique: inserting an existing key replaces its value in place, so the position
/// of the first insertion is kept. Values are opaque bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(Vec<(String, Bytes)>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mapping with exactly one pair, the shape every ingested line takes.
    pub fn single(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self(vec![(key.into(), value.into())])
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Bytes>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for Fields {
    type Item = (String, Bytes);
    type IntoIter = std::vec::IntoIter<(String, Bytes)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<K: Into<String>, V: Into<Bytes>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (key, value) in iter {
            fields.insert(key, value);
        }
        fields
    }
}

/// One entry exactly as the store delivered it from a tail read.
///
/// The id is kept raw so a malformed index reaches the tailer (and the diagnostic channel)
/// instead of failing the whole read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub stream: String,
    pub id: String,
    pub fields: Fields,
}

/// Approximate maximum entry count of a stream, trimmed oldest-first by the store on append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionBound(pub u64);

impl RetentionBound {
    pub fn max_len(&self) -> u64 {
        self.0
    }
}
