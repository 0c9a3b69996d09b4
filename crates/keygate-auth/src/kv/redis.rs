//! [`KeyValueStore`] over Redis.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::debug;

use super::store::{KeyTtl, KeyValueStore};
use crate::error::AuthError;

/// `KEYS[1]` hash, `ARGV[1]` ttl in ms or -1, `ARGV[2..]` field/value pairs.
const HASH_CREATE: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1], unpack(ARGV, 2))
local ttl = tonumber(ARGV[1])
if ttl >= 0 then
    redis.call('PEXPIRE', KEYS[1], ttl)
end
return 1
";

/// `KEYS[1]` hash, `ARGV` field/value pairs.
const HASH_UPDATE: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
redis.call('HSET', KEYS[1], unpack(ARGV))
return 1
";

/// `KEYS[1]` set, `ARGV[1]` member, `ARGV[2]` minimum ttl in ms.
const SET_ADD_EXTEND: &str = r"
local existed = redis.call('EXISTS', KEYS[1])
redis.call('SADD', KEYS[1], ARGV[1])
local current = redis.call('PTTL', KEYS[1])
if existed == 1 and current == -1 then
    return 0
end
local wanted = tonumber(ARGV[2])
if current < wanted then
    redis.call('PEXPIRE', KEYS[1], wanted)
end
return 1
";

const SCAN_COUNT: usize = 200;

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Escape glob metacharacters so `prefix` matches literally in `SCAN MATCH`.
fn escape_glob(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('*');
    out
}

/// Redis adapter using a reconnecting [`ConnectionManager`].
///
/// Conditional writes run as Lua scripts so they stay atomic.
pub struct RedisKv {
    conn: ConnectionManager,
    hash_create: Script,
    hash_update: Script,
    set_add_extend: Script,
}

impl RedisKv {
    /// Connect to `url` (`redis://host:port/db`).
    pub async fn connect(url: &str) -> Result<Self, AuthError> {
        let client = redis::Client::open(url).map_err(|e| AuthError::Config(e.to_string()))?;
        let conn = ConnectionManager::new(client).await?;
        debug!("connected to redis");
        Ok(Self::from_manager(conn))
    }

    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self {
            conn,
            hash_create: Script::new(HASH_CREATE),
            hash_update: Script::new(HASH_UPDATE),
            set_add_extend: Script::new(SET_ADD_EXTEND),
        }
    }

    #[inline]
    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

impl std::fmt::Debug for RedisKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKv").finish_non_exhaustive()
    }
}

#[async_trait]
impl KeyValueStore for RedisKv {
    async fn hash_create(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Option<Duration>,
    ) -> Result<bool, AuthError> {
        let ttl_ms = ttl.map_or(-1_i64, |t| i64::try_from(millis(t)).unwrap_or(i64::MAX));
        let mut invocation = self.hash_create.key(key);
        invocation.arg(ttl_ms);
        for (field, value) in fields {
            invocation.arg(*field).arg(value);
        }
        let created: i64 = invocation.invoke_async(&mut self.conn()).await?;
        Ok(created == 1)
    }

    async fn hash_update(&self, key: &str, fields: &[(&str, String)]) -> Result<bool, AuthError> {
        let mut invocation = self.hash_update.key(key);
        for (field, value) in fields {
            invocation.arg(*field).arg(value);
        }
        let updated: i64 = invocation.invoke_async(&mut self.conn()).await?;
        Ok(updated == 1)
    }

    async fn hash_get(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>, AuthError> {
        let values: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(key)
            .arg(fields)
            .query_async(&mut self.conn())
            .await?;
        Ok(values)
    }

    async fn set_add_extend(
        &self,
        key: &str,
        member: &str,
        ttl: Duration,
    ) -> Result<(), AuthError> {
        let _: i64 = self
            .set_add_extend
            .key(key)
            .arg(member)
            .arg(millis(ttl))
            .invoke_async(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, AuthError> {
        let members: Vec<String> = self.conn().smembers(key).await?;
        Ok(members)
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<u64, AuthError> {
        if members.is_empty() {
            return Ok(0);
        }
        let removed: u64 = self.conn().srem(key, members).await?;
        Ok(removed)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, AuthError> {
        let ms: i64 = self.conn().pttl(key).await?;
        Ok(match ms {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::Persistent,
            ms => KeyTtl::Expires(Duration::from_millis(ms.max(0).unsigned_abs())),
        })
    }

    async fn exists(&self, key: &str) -> Result<bool, AuthError> {
        let exists: bool = self.conn().exists(key).await?;
        Ok(exists)
    }

    async fn exists_many(&self, keys: &[String]) -> Result<Vec<bool>, AuthError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.exists(key);
        }
        let found: Vec<bool> = pipe.query_async(&mut self.conn()).await?;
        Ok(found)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, AuthError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: u64 = self.conn().del(keys).await?;
        Ok(removed)
    }

    async fn incr(&self, key: &str) -> Result<i64, AuthError> {
        let n: i64 = self.conn().incr(key, 1_i64).await?;
        Ok(n)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        let value: Option<String> = self.conn().get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        let _: () = self.conn().set(key, value).await?;
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, AuthError> {
        let pattern = escape_glob(prefix);
        let mut conn = self.conn();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("user:"), "user:*");
        assert_eq!(escape_glob("a*b?[c]"), "a\\*b\\?\\[c\\]*");
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_secs(2)), 2000);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
