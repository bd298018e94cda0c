//! In-process [`LogStore`] with the same observable semantics as a Redis server.
//!
//! Handles are cheap to clone and share one state, so a test (or an embedding program) can
//! append to a stream while another handle is blocked in [`LogStore::tail_read`]. A blocked
//! read is woken by appends and injected batches, never by timers.

// Local crates
use crate::{
    error::StoreError,
    store::{
        client::LogStore,
        models::{EntryId, Fields, Kind, RawEntry, RetentionBound},
    },
    tailer::models::{Cursor, Subscription},
};

// External crates
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// Number of calls served per operation, used to assert that no I/O happened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    pub list_keys: usize,
    pub type_of: usize,
    pub appends: usize,
    pub last_ids: usize,
    pub tail_reads: usize,
}

#[derive(Debug, Default)]
struct Log {
    entries: VecDeque<(EntryId, Fields)>,
    last_id: Option<EntryId>,
}

#[derive(Debug, Default)]
struct State {
    /// Every key with its kind, in creation order.
    keys: Vec<(String, Kind)>,
    logs: HashMap<String, Log>,
    scripted: VecDeque<Vec<RawEntry>>,
    appends_before_failure: Option<usize>,
    stats: CallStats,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    changed: Notify,
}

/// Shared in-memory append-log store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.shared
            .state
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }

    /// Create an empty stream, a no-op when it already exists.
    pub fn create_stream(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.ensure_stream(name)?;
        Ok(())
    }

    /// Register a key of a non-stream kind, invisible to the bridge.
    pub fn create_key(&self, name: &str, kind: Kind) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.kind_of(name) != Kind::None {
            return Err(StoreError::Protocol(format!("key {name} already exists")));
        }
        state.keys.push((name.to_string(), kind));
        Ok(())
    }

    /// Append an entry with an explicit id, which must be newer than the stream's last id.
    pub fn insert_entry(&self, name: &str, id: EntryId, fields: Fields) -> Result<(), StoreError> {
        {
            let mut state = self.lock()?;
            let log = state.ensure_stream(name)?;
            if log.last_id.is_some_and(|last| id <= last) {
                return Err(StoreError::Protocol(format!(
                    "ERR The ID specified in XADD is equal or smaller than the target stream top item ({id})"
                )));
            }
            log.entries.push_back((id, fields));
            log.last_id = Some(id);
        }
        self.shared.changed.notify_waiters();
        Ok(())
    }

    /// Queue a batch returned verbatim by the next tail read, ahead of real data.
    ///
    /// Also wakes a read that is currently blocked.
    pub fn inject_batch(&self, batch: Vec<RawEntry>) -> Result<(), StoreError> {
        self.lock()?.scripted.push_back(batch);
        self.shared.changed.notify_waiters();
        Ok(())
    }

    /// Let `successes` more appends through, then fail every following one.
    pub fn fail_appends_after(&self, successes: usize) -> Result<(), StoreError> {
        self.lock()?.appends_before_failure = Some(successes);
        Ok(())
    }

    /// Entries of `name`, oldest first.
    pub fn entries(&self, name: &str) -> Result<Vec<(EntryId, Fields)>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .logs
            .get(name)
            .map(|log| log.entries.iter().cloned().collect())
            .unwrap_or_default())
    }

    pub fn stats(&self) -> Result<CallStats, StoreError> {
        Ok(self.lock()?.stats)
    }
}

impl State {
    fn kind_of(&self, name: &str) -> Kind {
        self.keys
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, kind)| kind.clone())
            .unwrap_or(Kind::None)
    }

    fn ensure_stream(&mut self, name: &str) -> Result<&mut Log, StoreError> {
        match self.kind_of(name) {
            Kind::Stream => {}
            Kind::None => self.keys.push((name.to_string(), Kind::Stream)),
            _ => {
                return Err(StoreError::Protocol(
                    "WRONGTYPE Operation against a key holding the wrong kind of value"
                        .to_string(),
                ));
            }
        }
        Ok(self.logs.entry(name.to_string()).or_default())
    }

    /// Id of the newest entry ever appended to `name`, [`EntryId::MIN`] when there is none.
    fn top_of(&self, name: &str) -> EntryId {
        self.logs
            .get(name)
            .and_then(|log| log.last_id)
            .unwrap_or(EntryId::MIN)
    }

    /// Exclusive lower bound of every subscribed stream for one read.
    ///
    /// A `Latest` cursor is pinned to the same top [`LogStore::last_ids`] reports, taken when
    /// the read is issued.
    fn lower_bounds(&self, subscription: &Subscription) -> Vec<(String, EntryId)> {
        subscription
            .iter()
            .map(|(name, cursor)| {
                let bound = match cursor {
                    Cursor::Latest => self.top_of(name),
                    Cursor::Beginning => EntryId::MIN,
                    Cursor::After(id) => *id,
                };
                (name.to_string(), bound)
            })
            .collect()
    }

    fn collect(&self, bounds: &[(String, EntryId)], batch_size: usize) -> Vec<RawEntry> {
        let mut batch = Vec::new();
        for (name, bound) in bounds {
            let Some(log) = self.logs.get(name) else {
                continue;
            };
            batch.extend(
                log.entries
                    .iter()
                    .filter(|(id, _)| id > bound)
                    .take(batch_size)
                    .map(|(id, fields)| RawEntry {
                        stream: name.clone(),
                        id: id.to_string(),
                        fields: fields.clone(),
                    }),
            );
        }
        batch
    }
}

fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

impl LogStore for InMemoryStore {
    async fn list_keys(&mut self) -> Result<Vec<String>, StoreError> {
        let mut state = self.lock()?;
        state.stats.list_keys += 1;
        Ok(state.keys.iter().map(|(key, _)| key.clone()).collect())
    }

    async fn type_of(&mut self, name: &str) -> Result<Kind, StoreError> {
        let mut state = self.lock()?;
        state.stats.type_of += 1;
        Ok(state.kind_of(name))
    }

    async fn last_ids(&mut self, names: &[String]) -> Result<Vec<EntryId>, StoreError> {
        let mut state = self.lock()?;
        state.stats.last_ids += 1;
        Ok(names.iter().map(|name| state.top_of(name)).collect())
    }

    async fn append(
        &mut self,
        name: &str,
        fields: &Fields,
        retention: Option<RetentionBound>,
    ) -> Result<EntryId, StoreError> {
        let id = {
            let mut state = self.lock()?;
            state.stats.appends += 1;

            if let Some(remaining) = state.appends_before_failure.as_mut() {
                if *remaining == 0 {
                    return Err(StoreError::Unavailable("append rejected".to_string()));
                }
                *remaining -= 1;
            }

            if fields.is_empty() {
                return Err(StoreError::Protocol(
                    "ERR wrong number of arguments for 'xadd' command".to_string(),
                ));
            }

            let log = state.ensure_stream(name)?;
            let id = log
                .last_id
                .map_or(EntryId::new(now_millis(), 0), |last| last.successor(now_millis()));
            log.entries.push_back((id, fields.clone()));
            log.last_id = Some(id);

            if let Some(bound) = retention {
                let max_len = usize::try_from(bound.max_len()).unwrap_or(usize::MAX);
                while log.entries.len() > max_len {
                    log.entries.pop_front();
                }
            }
            id
        };

        self.shared.changed.notify_waiters();
        Ok(id)
    }

    async fn tail_read(
        &mut self,
        subscription: &Subscription,
        batch_size: usize,
    ) -> Result<Vec<RawEntry>, StoreError> {
        let bounds = {
            let mut state = self.lock()?;
            state.stats.tail_reads += 1;
            state.lower_bounds(subscription)
        };

        loop {
            let changed = self.shared.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            {
                let mut state = self.lock()?;
                if let Some(batch) = state.scripted.pop_front() {
                    return Ok(batch);
                }
                let batch = state.collect(&bounds, batch_size);
                if !batch.is_empty() {
                    return Ok(batch);
                }
            }

            changed.await;
        }
    }
}
