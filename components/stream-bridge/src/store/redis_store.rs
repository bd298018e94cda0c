// Local crates
use crate::{
    error::StoreError,
    helpers::{
        converters::{cursor_to_arg, last_id_from_reply, raw_entries_from_reply},
        load_config::StoreConfig,
    },
    store::{
        client::LogStore,
        models::{EntryId, Fields, Kind, RawEntry, RetentionBound},
    },
    tailer::models::Subscription,
};

// External crates
use redis::aio::MultiplexedConnection;
use redis::{Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, Value};
use std::fmt;
use tracing::instrument;

/// [`LogStore`] backed by a Redis server's stream commands.
///
/// Holds a single multiplexed connection, opened once in [`RedisStore::connect`]. Blocking
/// reads (`XREAD BLOCK 0`) occupy the connection until data arrives; the bridge
/// never issues two requests at once.
pub struct RedisStore {
    addr: String,
    con: MultiplexedConnection,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore").field("addr", &self.addr).finish()
    }
}

impl RedisStore {
    /// Open the connection described by `config`. Credentials are passed through untouched.
    #[instrument(
        name = "stream_bridge_store::connect",
        target = "store::redis",
        skip_all,
        fields(hostname = %config.hostname, port = config.port),
        level = "debug"
    )]
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(config.hostname.clone(), config.port),
            redis: RedisConnectionInfo {
                password: config.auth.clone(),
                ..Default::default()
            },
        };

        let client = Client::open(info)?;
        let con = client.get_multiplexed_async_connection().await?;

        tracing::debug!("Connected to Redis server");
        Ok(Self {
            addr: format!("{}:{}", config.hostname, config.port),
            con,
        })
    }
}

impl LogStore for RedisStore {
    #[instrument(name = "stream_bridge_store::list_keys", target = "store::redis", skip_all, level = "trace")]
    async fn list_keys(&mut self) -> Result<Vec<String>, StoreError> {
        let keys: Vec<String> = redis::cmd("KEYS").arg("*").query_async(&mut self.con).await?;
        tracing::trace!(key_count = keys.len(), "Listed store keys");
        Ok(keys)
    }

    async fn type_of(&mut self, name: &str) -> Result<Kind, StoreError> {
        let kind: String = redis::cmd("TYPE").arg(name).query_async(&mut self.con).await?;
        Ok(Kind::from(kind.as_str()))
    }

    /// One pipelined round trip of `TYPE` for every name.
    #[instrument(name = "stream_bridge_store::kinds_of", target = "store::redis", skip_all, level = "trace")]
    async fn kinds_of(&mut self, names: &[String]) -> Result<Vec<Kind>, StoreError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for name in names {
            pipe.cmd("TYPE").arg(name);
        }
        let kinds: Vec<String> = pipe.query_async(&mut self.con).await?;

        if kinds.len() != names.len() {
            return Err(StoreError::Protocol(format!(
                "TYPE pipeline returned {} replies for {} keys",
                kinds.len(),
                names.len()
            )));
        }
        Ok(kinds.iter().map(|k| Kind::from(k.as_str())).collect())
    }

    /// One pipelined round trip of `XREVRANGE name + - COUNT 1` for every name.
    #[instrument(name = "stream_bridge_store::last_ids", target = "store::redis", skip_all, level = "trace")]
    async fn last_ids(&mut self, names: &[String]) -> Result<Vec<EntryId>, StoreError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for name in names {
            pipe.cmd("XREVRANGE").arg(name).arg("+").arg("-").arg("COUNT").arg(1);
        }
        let replies: Vec<Value> = pipe.query_async(&mut self.con).await?;

        if replies.len() != names.len() {
            return Err(StoreError::Protocol(format!(
                "XREVRANGE pipeline returned {} replies for {} keys",
                replies.len(),
                names.len()
            )));
        }
        replies.into_iter().map(last_id_from_reply).collect()
    }

    async fn append(
        &mut self,
        name: &str,
        fields: &Fields,
        retention: Option<RetentionBound>,
    ) -> Result<EntryId, StoreError> {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(name);
        if let Some(bound) = retention {
            cmd.arg("MAXLEN").arg("~").arg(bound.max_len());
        }
        cmd.arg("*");
        for (key, value) in fields.iter() {
            cmd.arg(key).arg(value.as_ref());
        }

        let id: String = cmd.query_async(&mut self.con).await?;
        id.parse::<EntryId>()
            .map_err(|e| StoreError::Protocol(format!("XADD returned {e}")))
    }

    #[instrument(
        name = "stream_bridge_store::tail_read",
        target = "store::redis",
        skip_all,
        fields(streams = subscription.len(), batch_size = batch_size),
        level = "trace"
    )]
    async fn tail_read(
        &mut self,
        subscription: &Subscription,
        batch_size: usize,
    ) -> Result<Vec<RawEntry>, StoreError> {
        let mut cmd = redis::cmd("XREAD");
        cmd.arg("COUNT")
            .arg(batch_size)
            .arg("BLOCK")
            .arg(0)
            .arg("STREAMS");
        for name in subscription.names() {
            cmd.arg(name);
        }
        for (_, cursor) in subscription.iter() {
            cmd.arg(cursor_to_arg(cursor));
        }

        let reply: Value = cmd.query_async(&mut self.con).await?;
        raw_entries_from_reply(reply)
    }
}
