// Local crates
use crate::{
    error::StoreError,
    metrics::metrics::{TAIL_POLL_DURATION_SECONDS, TAIL_POLLS_TOTAL, observe_duration},
    store::{client::LogStore, models::EntryId},
    tailer::models::{Advance, StartPosition, Subscription, TailUnit},
};

// External crates
use futures::Stream;
use std::time::Instant;
use tracing::instrument;

/// Follows every resolved stream at once through a single blocking multi-stream read.
///
/// The tailer owns the store handle and the [`Subscription`] for the whole run. Each poll
/// delivers whatever the store returned, in store order: entries of one stream arrive in id
/// order, entries of different streams interleave arbitrarily.
///
/// ```text
/// loop {
///     tail_read(subscription, batch_size)   <- sole suspension point
///     advance cursors
///     yield (stream, id, key, value) per field
/// }
/// ```
#[derive(Debug)]
pub struct MultiplexedTailer<S> {
    store: S,
    subscription: Subscription,
    batch_size: usize,
}

impl<S: LogStore> MultiplexedTailer<S> {
    /// Establish a tailer with every cursor at `start`.
    ///
    /// A live tail pins each stream's cursor to its newest entry right here, in one store call,
    /// so everything appended from now on is delivered whichever stream it lands on.
    /// `batch_size` bounds the entries the store may return per stream per poll, it is raised
    /// to 1 when zero is given.
    #[instrument(
        name = "stream_bridge_tailer::establish",
        target = "tailer::tailer",
        skip_all,
        level = "debug"
    )]
    pub async fn new<I, N>(
        mut store: S,
        streams: I,
        start: StartPosition,
        batch_size: usize,
    ) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        let mut subscription = Subscription::new(streams, start);

        let unpinned = subscription.unpinned();
        if !unpinned.is_empty() {
            let tops = store.last_ids(&unpinned).await?;
            for (name, top) in unpinned.iter().zip(tops) {
                subscription.pin_latest(name, top);
                tracing::debug!(stream = %name, top = %top, "Pinned live cursor");
            }
        }

        Ok(Self {
            store,
            subscription,
            batch_size: batch_size.max(1),
        })
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Issue one blocking read and flatten the returned batch into units.
    ///
    /// Cursors advance to the highest well-formed id seen per stream. An entry whose index
    /// cannot be parsed is still delivered (its fields are data), but its id cannot move a
    /// cursor and is reported instead. An empty batch yields no units.
    #[instrument(
        name = "stream_bridge_tailer::poll",
        target = "tailer::tailer",
        skip_all,
        level = "trace"
    )]
    pub async fn poll(&mut self) -> Result<Vec<TailUnit>, StoreError> {
        let start = Instant::now();
        let batch = self
            .store
            .tail_read(&self.subscription, self.batch_size)
            .await?;
        observe_duration(&TAIL_POLL_DURATION_SECONDS, start);
        TAIL_POLLS_TOTAL.inc();

        if batch.is_empty() {
            tracing::trace!("Tail read returned no data, polling again");
            return Ok(Vec::new());
        }

        tracing::debug!(entries = batch.len(), "Tail read returned a batch");

        let mut units = Vec::new();
        for entry in batch {
            match entry.id.parse::<EntryId>() {
                Ok(id) => match self.subscription.advance(&entry.stream, id) {
                    Advance::Moved => {}
                    Advance::Stale => tracing::debug!(
                        stream = %entry.stream,
                        index = %entry.id,
                        "Entry is not newer than its cursor, cursor unchanged"
                    ),
                    Advance::Unknown => tracing::warn!(
                        stream = %entry.stream,
                        index = %entry.id,
                        "Store delivered an entry for a stream outside the subscription"
                    ),
                },
                Err(e) => tracing::warn!(
                    stream = %entry.stream,
                    error = %e,
                    "Entry index is malformed, cursor unchanged"
                ),
            }

            for (key, value) in entry.fields {
                units.push(TailUnit {
                    stream: entry.stream.clone(),
                    id: entry.id.clone(),
                    key,
                    value,
                });
            }
        }

        Ok(units)
    }

    /// Turn the tailer into an endless stream of units.
    ///
    /// The stream only ends with a store error. Cancellation is the consumer's job: dropping
    /// the stream abandons the in-flight read, and the cursors with it.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<TailUnit, StoreError>> {
        async_stream::try_stream! {
            loop {
                for unit in self.poll().await? {
                    yield unit;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{
        memory_store::InMemoryStore,
        models::{Fields, RawEntry},
    };
    use crate::tailer::models::Cursor;
    use bytes::Bytes;
    use futures::StreamExt;
    use std::time::Duration;

    fn raw(stream: &str, id: &str, fields: &[(&str, &str)]) -> RawEntry {
        RawEntry {
            stream: stream.to_string(),
            id: id.to_string(),
            fields: fields.iter().map(|(k, v)| (*k, Bytes::copy_from_slice(v.as_bytes()))).collect(),
        }
    }

    #[tokio::test]
    async fn should_yield_one_unit_per_field_in_field_order() {
        // given
        let store = InMemoryStore::new();
        store
            .inject_batch(vec![raw("x", "5-0", &[("b", "2"), ("a", "1")])])
            .unwrap();
        let mut tailer = MultiplexedTailer::new(store, ["x"], StartPosition::Latest, 10)
            .await
            .unwrap();

        // when
        let units = tailer.poll().await.unwrap();

        // then
        let pairs: Vec<_> = units.iter().map(|u| (u.key.as_str(), u.value.clone())).collect();
        assert_eq!(pairs, vec![("b", Bytes::from("2")), ("a", Bytes::from("1"))]);
        assert!(units.iter().all(|u| u.stream == "x" && u.id == "5-0"));
        assert_eq!(
            tailer.subscription().cursor("x"),
            Some(Cursor::After(EntryId::new(5, 0)))
        );
    }

    #[tokio::test]
    async fn should_treat_empty_batch_as_no_data() {
        let store = InMemoryStore::new();
        store.inject_batch(Vec::new()).unwrap();
        let mut tailer = MultiplexedTailer::new(store, ["x"], StartPosition::Latest, 10)
            .await
            .unwrap();

        let units = tailer.poll().await.unwrap();

        assert!(units.is_empty());
        assert_eq!(
            tailer.subscription().cursor("x"),
            Some(Cursor::After(EntryId::MIN))
        );
    }

    #[tokio::test]
    async fn should_deliver_malformed_entry_and_keep_cursor() {
        // given
        let store = InMemoryStore::new();
        store
            .inject_batch(vec![
                raw("x", "3-0", &[("k", "good")]),
                raw("x", "not-an-id", &[("k", "odd")]),
            ])
            .unwrap();
        store.inject_batch(vec![raw("x", "4-0", &[("k", "after")])]).unwrap();
        let mut tailer = MultiplexedTailer::new(store, ["x"], StartPosition::Latest, 10)
            .await
            .unwrap();

        // when
        let first = tailer.poll().await.unwrap();
        let second = tailer.poll().await.unwrap();

        // then
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].id, "not-an-id");
        assert_eq!(second[0].value, Bytes::from("after"));
        assert_eq!(
            tailer.subscription().cursor("x"),
            Some(Cursor::After(EntryId::new(4, 0)))
        );
    }

    #[tokio::test]
    async fn should_replay_history_then_follow_new_appends() {
        // given
        let mut store = InMemoryStore::new();
        for line in ["a", "b", "c"] {
            store.append("x", &Fields::single("default", line), None).await.unwrap();
        }
        let mut writer = store.clone();
        let tailer = MultiplexedTailer::new(store, ["x"], StartPosition::Beginning, 2)
            .await
            .unwrap();
        let units = tailer.into_stream();
        tokio::pin!(units);

        // when
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(units.next().await.unwrap().unwrap().value);
        }
        writer
            .append("x", &Fields::single("default", "d"), None)
            .await
            .unwrap();
        seen.push(units.next().await.unwrap().unwrap().value);

        // then
        assert_eq!(seen, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn should_advance_each_stream_independently() {
        let store = InMemoryStore::new();
        store.insert_entry("a", EntryId::new(10, 0), Fields::single("k", "a1")).unwrap();
        store.insert_entry("b", EntryId::new(3, 0), Fields::single("k", "b1")).unwrap();
        store.insert_entry("a", EntryId::new(11, 0), Fields::single("k", "a2")).unwrap();
        let mut tailer = MultiplexedTailer::new(store, ["a", "b"], StartPosition::Beginning, 10)
            .await
            .unwrap();

        let units = tailer.poll().await.unwrap();

        assert_eq!(units.len(), 3);
        assert_eq!(
            tailer.subscription().cursor("a"),
            Some(Cursor::After(EntryId::new(11, 0)))
        );
        assert_eq!(
            tailer.subscription().cursor("b"),
            Some(Cursor::After(EntryId::new(3, 0)))
        );
    }

    #[tokio::test]
    async fn should_stay_blocked_while_nothing_is_appended() {
        let store = InMemoryStore::new();
        let mut tailer = MultiplexedTailer::new(store, ["quiet"], StartPosition::Latest, 10)
            .await
            .unwrap();

        let outcome = tokio::time::timeout(Duration::from_millis(50), tailer.poll()).await;

        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn should_pin_live_cursors_to_current_top() {
        let store = InMemoryStore::new();
        store.insert_entry("a", EntryId::new(8, 2), Fields::single("k", "old")).unwrap();

        let tailer = MultiplexedTailer::new(store.clone(), ["a", "b"], StartPosition::Latest, 10)
            .await
            .unwrap();

        assert_eq!(
            tailer.subscription().cursor("a"),
            Some(Cursor::After(EntryId::new(8, 2)))
        );
        assert_eq!(tailer.subscription().cursor("b"), Some(Cursor::After(EntryId::MIN)));
        assert_eq!(store.stats().unwrap().last_ids, 1);
    }

    #[tokio::test]
    async fn should_deliver_entries_of_idle_stream_appended_between_polls() {
        // given
        let store = InMemoryStore::new();
        let mut writer = store.clone();
        let mut tailer = MultiplexedTailer::new(store, ["a", "b"], StartPosition::Latest, 10)
            .await
            .unwrap();

        // when
        writer.append("a", &Fields::single("k", "a1"), None).await.unwrap();
        let first = tokio::time::timeout(Duration::from_secs(1), tailer.poll())
            .await
            .expect("a1 is delivered")
            .unwrap();
        writer.append("b", &Fields::single("k", "b1"), None).await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), tailer.poll())
            .await
            .expect("b1 is delivered")
            .unwrap();

        // then
        let values = |units: &[TailUnit]| {
            units
                .iter()
                .map(|u| (u.stream.clone(), u.value.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(values(&first), vec![("a".to_string(), Bytes::from("a1"))]);
        assert_eq!(values(&second), vec![("b".to_string(), Bytes::from("b1"))]);
        assert!(tailer.subscription().unpinned().is_empty());
    }
}
