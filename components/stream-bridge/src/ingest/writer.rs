// Local crates
use crate::{
    discovery::resolver::is_pattern,
    error::BridgeError,
    metrics::metrics::{APPEND_FAILURES_TOTAL, LINES_INGESTED_TOTAL},
    store::{
        client::LogStore,
        models::{Fields, RetentionBound},
    },
};

// External crates
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::io;
use tracing::instrument;

/// Check that `targets` names exactly one stream, without glob metacharacters.
///
/// Runs before any line is read or any store I/O happens.
pub fn validate_target(targets: &[String]) -> Result<&str, BridgeError> {
    match targets {
        [target] if is_pattern(target) => Err(BridgeError::InvalidIngestTarget(format!(
            "{target:?} contains wildcards, ingestion needs one literal stream name"
        ))),
        [target] if target.is_empty() => Err(BridgeError::InvalidIngestTarget(
            "stream name is empty".to_string(),
        )),
        [target] => Ok(target.as_str()),
        _ => Err(BridgeError::InvalidIngestTarget(format!(
            "When processing stdin, only one stream argument (without wildcards) is required, got {}",
            targets.len()
        ))),
    }
}

/// Appends every input line as one single-field entry of a single target stream.
#[derive(Debug)]
pub struct IngestionWriter<S> {
    store: S,
    target: String,
    field_key: String,
    retention: Option<RetentionBound>,
}

impl<S: LogStore> IngestionWriter<S> {
    /// Fails with [`BridgeError::InvalidIngestTarget`] unless `targets` is one literal name.
    pub fn new(
        store: S,
        targets: &[String],
        field_key: impl Into<String>,
        retention: Option<RetentionBound>,
    ) -> Result<Self, BridgeError> {
        let target = validate_target(targets)?.to_string();
        Ok(Self {
            store,
            target,
            field_key: field_key.into(),
            retention,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Append one entry `{field_key: line}` per line, strictly in input order.
    ///
    /// Returns the number of appended entries once input is exhausted. The first failed
    /// append (or read) stops ingestion: what was appended before it stays in the stream as a
    /// prefix of the input, nothing is retried.
    #[instrument(
        name = "stream_bridge_ingest::ingest",
        target = "ingest::writer",
        skip_all,
        fields(stream = %self.target, field_key = %self.field_key),
        level = "debug"
    )]
    pub async fn ingest<L>(&mut self, lines: L) -> Result<u64, BridgeError>
    where
        L: Stream<Item = io::Result<Bytes>>,
    {
        tokio::pin!(lines);
        let mut appended: u64 = 0;

        while let Some(line) = lines.next().await {
            let line = line.map_err(BridgeError::Input)?;
            let fields = Fields::single(self.field_key.clone(), line);

            match self
                .store
                .append(&self.target, &fields, self.retention)
                .await
            {
                Ok(id) => {
                    appended += 1;
                    LINES_INGESTED_TOTAL.inc();
                    tracing::trace!(index = %id, "Appended input line");
                }
                Err(e) => {
                    APPEND_FAILURES_TOTAL.inc();
                    tracing::error!(
                        error = %e,
                        appended,
                        "Append failed, stopping ingestion"
                    );
                    return Err(e.into());
                }
            }
        }

        tracing::debug!(appended, "Input exhausted, ingestion complete");
        Ok(appended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory_store::InMemoryStore;
    use futures::stream;

    fn targets(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn input(raw: &[&'static str]) -> impl Stream<Item = io::Result<Bytes>> {
        stream::iter(
            raw.iter()
                .map(|line| Ok(Bytes::from_static(line.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    fn values(store: &InMemoryStore, stream: &str, key: &str) -> Vec<Bytes> {
        store
            .entries(stream)
            .unwrap()
            .into_iter()
            .map(|(_, fields)| fields.get(key).cloned().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn should_append_one_entry_per_line_in_order() {
        // given
        let store = InMemoryStore::new();
        let mut writer =
            IngestionWriter::new(store.clone(), &targets(&["x"]), "default", None).unwrap();

        // when
        let appended = writer.ingest(input(&["a", "b", "c"])).await.unwrap();

        // then
        assert_eq!(appended, 3);
        assert_eq!(values(&store, "x", "default"), vec!["a", "b", "c"]);
        assert!(
            store
                .entries("x")
                .unwrap()
                .iter()
                .all(|(_, fields)| fields.len() == 1)
        );
    }

    #[tokio::test]
    async fn should_pass_retention_bound_to_store() {
        let store = InMemoryStore::new();
        let mut writer =
            IngestionWriter::new(store.clone(), &targets(&["x"]), "line", Some(RetentionBound(2)))
                .unwrap();

        writer.ingest(input(&["1", "2", "3", "4"])).await.unwrap();

        assert_eq!(values(&store, "x", "line"), vec!["3", "4"]);
    }

    #[test]
    fn should_reject_pattern_and_multiple_targets() {
        for bad in [&["x*"][..], &["a?"][..], &["a", "b"][..], &[][..], &[""][..]] {
            let result = IngestionWriter::new(InMemoryStore::new(), &targets(bad), "default", None);
            assert!(
                matches!(result, Err(BridgeError::InvalidIngestTarget(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn should_stop_at_first_failed_append_leaving_prefix() {
        // given
        let store = InMemoryStore::new();
        store.fail_appends_after(2).unwrap();
        let mut writer =
            IngestionWriter::new(store.clone(), &targets(&["x"]), "default", None).unwrap();

        // when
        let result = writer.ingest(input(&["a", "b", "c", "d"])).await;

        // then
        assert!(matches!(result, Err(BridgeError::Store(_))));
        assert_eq!(values(&store, "x", "default"), vec!["a", "b"]);
        assert_eq!(store.stats().unwrap().appends, 3);
    }

    #[tokio::test]
    async fn should_surface_read_errors() {
        let store = InMemoryStore::new();
        let mut writer =
            IngestionWriter::new(store.clone(), &targets(&["x"]), "default", None).unwrap();
        let lines = stream::iter(vec![
            Ok(Bytes::from("a")),
            Err(io::Error::new(io::ErrorKind::InvalidData, "broken pipe upstream")),
        ]);

        let result = writer.ingest(lines).await;

        assert!(matches!(result, Err(BridgeError::Input(_))));
        assert_eq!(values(&store, "x", "default"), vec!["a"]);
    }
}
