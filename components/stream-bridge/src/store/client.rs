// Local crates
use crate::{
    error::StoreError,
    store::models::{EntryId, Fields, Kind, RawEntry, RetentionBound},
    tailer::models::Subscription,
};

// External crates
use std::future::Future;

/// The only interface the bridge needs from the backing store.
///
/// A store handle is constructed once per run and moved (or lent) into each component, it is
/// never used by more than one flow at a time, which is why every operation takes `&mut self`.
///
/// Implementations assume at-least-once delivery and idempotent reads: reading again from an
/// unmoved cursor returns the same entries.
pub trait LogStore: Send {
    /// Every key the store holds, of any kind.
    fn list_keys(&mut self) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    fn type_of(&mut self, name: &str) -> impl Future<Output = Result<Kind, StoreError>> + Send;

    /// Kinds of `names`, in the same order. Stores able to batch the lookup should override it.
    fn kinds_of(
        &mut self,
        names: &[String],
    ) -> impl Future<Output = Result<Vec<Kind>, StoreError>> + Send {
        async move {
            let mut kinds = Vec::with_capacity(names.len());
            for name in names {
                kinds.push(self.type_of(name).await?);
            }
            Ok(kinds)
        }
    }

    /// Id of the newest entry of each of `names`, in the same order. A missing or empty stream
    /// reports [`EntryId::MIN`].
    fn last_ids(
        &mut self,
        names: &[String],
    ) -> impl Future<Output = Result<Vec<EntryId>, StoreError>> + Send;

    /// Append one entry to `name`, letting the store trim it to `retention` entries.
    fn append(
        &mut self,
        name: &str,
        fields: &Fields,
        retention: Option<RetentionBound>,
    ) -> impl Future<Output = Result<EntryId, StoreError>> + Send;

    /// Blocking multi-stream read.
    ///
    /// Returns at most `batch_size` entries per stream, newer than each stream's cursor, and
    /// waits (without timeout) until at least one exists. An empty vector means "no data this
    /// poll" and is not an error.
    fn tail_read(
        &mut self,
        subscription: &Subscription,
        batch_size: usize,
    ) -> impl Future<Output = Result<Vec<RawEntry>, StoreError>> + Send;
}
