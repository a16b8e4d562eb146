//! Redis-backed coordination store.
//!
//! The check-and-reserve runs as a single Lua script, so the scan over all
//! candidate keys and the write of the winning one execute atomically on the
//! server. TTLs are native Redis key expiries.

use super::{ReservationApi, api::Result};
use crate::error::StoreError;
use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;
use url::Url;

/// Reserves the first of KEYS that does not exist, with an expiry of ARGV[1]
/// seconds, returning its 1-based index or -1 when every key is held.
const RESERVE_SCRIPT: &str = r#"
for i = 1, #KEYS do
    if redis.call('EXISTS', KEYS[i]) == 0 then
        redis.call('SET', KEYS[i], '1', 'EX', tonumber(ARGV[1]))
        return i
    end
end
return -1
"#;

/// [`ReservationApi`] implementation backed by Redis.
#[derive(Debug, Clone)]
pub struct RedisStore {
    connection: redis::aio::MultiplexedConnection,
    script: redis::Script,
}

impl RedisStore {
    /// Connects to the Redis instance at `url`.
    pub async fn connect(url: &Url) -> Result<Self> {
        let client = redis::Client::open(url.as_str()).map_err(StoreError::Redis)?;
        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;

        Ok(Self { connection, script: redis::Script::new(RESERVE_SCRIPT) })
    }
}

#[async_trait]
impl ReservationApi for RedisStore {
    async fn reserve_first_free(&self, keys: &[String], ttl: Duration) -> Result<Option<usize>> {
        let mut invocation = self.script.prepare_invoke();
        for key in keys {
            invocation.key(key.as_str());
        }
        invocation.arg(ttl.as_secs().max(1));

        let mut connection = self.connection.clone();
        let index: i64 = invocation.invoke_async(&mut connection).await?;

        // The script returns Lua's 1-based index.
        Ok(usize::try_from(index - 1).ok())
    }

    async fn release(&self, key: &str) -> Result<()> {
        let mut connection = self.connection.clone();
        connection.del::<_, ()>(key).await?;
        Ok(())
    }
}
