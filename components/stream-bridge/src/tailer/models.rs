// Local crates
use crate::store::models::EntryId;

// External crates
use bytes::Bytes;

/// Per-stream watermark owned by the tailer for the duration of one run. Never persisted.
///
/// ```text
/// Latest --pin_latest(top)--> After(top)
/// Latest | Beginning --advance(id)--> After(id) --advance(id' > id)--> After(id')
/// ```
///
/// A tailer pins every `Latest` cursor before its first read, so the sentinel is never
/// re-evaluated by a later read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// Only entries appended after the cursor was established.
    Latest,
    /// Everything the stream holds.
    Beginning,
    /// Entries strictly after the last delivered id.
    After(EntryId),
}

impl Cursor {
    /// Returns the id this cursor has delivered up to, if any.
    pub fn delivered(&self) -> Option<EntryId> {
        match self {
            Cursor::After(id) => Some(*id),
            Cursor::Latest | Cursor::Beginning => None,
        }
    }
}

/// Where every cursor starts when a tail begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartPosition {
    /// Live tail, only new entries.
    #[default]
    Latest,
    /// History replay, from the beginning of every stream.
    Beginning,
}

impl From<StartPosition> for Cursor {
    fn from(start: StartPosition) -> Self {
        match start {
            StartPosition::Latest => Cursor::Latest,
            StartPosition::Beginning => Cursor::Beginning,
        }
    }
}

/// Outcome of feeding a delivered id to a [`Subscription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Moved,
    /// The id is not newer than the cursor, which stays where it was.
    Stale,
    /// The stream is not part of this subscription.
    Unknown,
}

/// Stream name -> cursor, in the order the streams were resolved.
///
/// The order is what the store sees on every multi-stream read, so it stays stable for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    cursors: Vec<(String, Cursor)>,
}

impl Subscription {
    pub fn new<I, N>(names: I, start: StartPosition) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        let mut cursors: Vec<(String, Cursor)> = Vec::new();
        for name in names {
            let name = name.into();
            if !cursors.iter().any(|(existing, _)| *existing == name) {
                cursors.push((name, start.into()));
            }
        }
        Self { cursors }
    }

    pub fn cursor(&self, name: &str) -> Option<Cursor> {
        self.cursors
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, cursor)| *cursor)
    }

    /// Move the cursor of `name` to `id` when `id` is newer than what was delivered so far.
    ///
    /// Cursors never move backwards, so after any sequence of batches a cursor equals the
    /// highest id seen for its stream.
    pub fn advance(&mut self, name: &str, id: EntryId) -> Advance {
        let Some((_, cursor)) = self.cursors.iter_mut().find(|(existing, _)| existing == name)
        else {
            return Advance::Unknown;
        };

        match cursor.delivered() {
            Some(current) if id <= current => Advance::Stale,
            _ => {
                *cursor = Cursor::After(id);
                Advance::Moved
            }
        }
    }

    /// Names whose cursor is still the `Latest` sentinel, in subscription order.
    pub fn unpinned(&self) -> Vec<String> {
        self.cursors
            .iter()
            .filter(|(_, cursor)| *cursor == Cursor::Latest)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Replace the `Latest` sentinel of `name` with the stream's top at establishment, so only
    /// entries newer than `top` are delivered. Any other cursor is left untouched.
    pub fn pin_latest(&mut self, name: &str, top: EntryId) -> bool {
        match self.cursors.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, cursor)) if *cursor == Cursor::Latest => {
                *cursor = Cursor::After(top);
                true
            }
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cursor)> {
        self.cursors.iter().map(|(name, cursor)| (name.as_str(), cursor))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cursors.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }
}

/// The unit the tailer emits downstream: one field of one entry, tagged with its stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailUnit {
    pub stream: String,
    /// Raw index as the store reported it.
    pub id: String,
    pub key: String,
    pub value: Bytes,
}
