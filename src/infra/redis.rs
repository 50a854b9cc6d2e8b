//! Redis-backed fast cache.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use redis::{AsyncCommands, Script, aio::MultiplexedConnection};
use tracing::info;

use crate::{
    cache::{CacheError, FastCache},
    infra::error::InfraError,
};

const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// [`FastCache`] over one multiplexed connection, cloned per command.
#[derive(Clone)]
pub struct RedisFastCache {
    connection: MultiplexedConnection,
    compare_and_delete: Arc<Script>,
}

impl RedisFastCache {
    pub async fn connect(url: &str) -> Result<Self, InfraError> {
        let client = redis::Client::open(url)
            .map_err(|err| InfraError::redis(format!("invalid redis url: {err}")))?;
        let mut connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| InfraError::redis(format!("failed to connect: {err}")))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(|err| InfraError::redis(format!("ping failed: {err}")))?;

        info!(target: "esi_gateway::redis", "redis connection established");
        Ok(Self {
            connection,
            compare_and_delete: Arc::new(Script::new(COMPARE_AND_DELETE)),
        })
    }

    fn connection(&self) -> MultiplexedConnection {
        self.connection.clone()
    }
}

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl FastCache for RedisFastCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection();
        let value: Option<String> = conn.get(key).await.map_err(CacheError::transport)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        if ttl.is_zero() {
            return self.delete(key).await;
        }
        let mut conn = self.connection();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(CacheError::transport)?;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        if ttl.is_zero() {
            return Ok(false);
        }
        let mut conn = self.connection();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(CacheError::transport)?;
        Ok(reply.is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection();
        let exists: bool = conn.exists(key).await.map_err(CacheError::transport)?;
        Ok(exists)
    }

    async fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let mut conn = self.connection();
        let remaining: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(CacheError::transport)?;
        // -2: no such key, -1: no expiry.
        Ok(u64::try_from(remaining).ok().map(Duration::from_millis))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection();
        let _: i64 = conn.del(key).await.map_err(CacheError::transport)?;
        Ok(())
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection();
        let deleted: i64 = self
            .compare_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(CacheError::transport)?;
        Ok(deleted == 1)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(CacheError::transport)?;
        Ok(())
    }
}
