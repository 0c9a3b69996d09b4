//! In-process [`KeyValueStore`] with Redis semantics.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::store::{KeyTtl, KeyValueStore};
use crate::error::AuthError;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn wrong_type(key: &str) -> AuthError {
    AuthError::corruption(format!(
        "WRONGTYPE operation against key {key:?} holding the wrong kind of value"
    ))
}

/// Key-value store kept in a `HashMap`, honouring per-key TTLs.
///
/// Expired keys are dropped lazily when touched. Used for tests and
/// single-process setups; behaves like the Redis adapter for every
/// operation the stores use.
#[derive(Debug, Default)]
pub struct MemoryKv {
    data: Mutex<HashMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data.lock().values().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a plain string, replacing whatever was there.
    ///
    /// Mainly for tests that need to plant a value of the wrong type.
    pub fn put_raw(&self, key: &str, value: &str) {
        self.data
            .lock()
            .insert(key.to_string(), Entry::new(Value::Str(value.to_string())));
    }

    /// Run `f` on the live entry for `key`, purging it first if expired.
    fn with_live<R>(&self, key: &str, f: impl FnOnce(Option<&mut Entry>) -> R) -> R {
        let now = Instant::now();
        let mut data = self.data.lock();
        if data.get(key).is_some_and(|e| e.is_expired(now)) {
            data.remove(key);
        }
        f(data.get_mut(key))
    }
}

#[async_trait]
impl KeyValueStore for MemoryKv {
    async fn hash_create(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Option<Duration>,
    ) -> Result<bool, AuthError> {
        let now = Instant::now();
        let mut data = self.data.lock();
        if data.get(key).is_some_and(|e| !e.is_expired(now)) {
            return Ok(false);
        }
        let hash = fields
            .iter()
            .map(|(f, v)| ((*f).to_string(), v.clone()))
            .collect();
        data.insert(
            key.to_string(),
            Entry {
                value: Value::Hash(hash),
                expires_at: ttl.map(|t| now + t),
            },
        );
        Ok(true)
    }

    async fn hash_update(&self, key: &str, fields: &[(&str, String)]) -> Result<bool, AuthError> {
        self.with_live(key, |entry| match entry {
            None => Ok(false),
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => {
                for (f, v) in fields {
                    hash.insert((*f).to_string(), v.clone());
                }
                Ok(true)
            }
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn hash_get(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>, AuthError> {
        self.with_live(key, |entry| match entry {
            None => Ok(vec![None; fields.len()]),
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => Ok(fields.iter().map(|f| hash.get(*f).cloned()).collect()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn set_add_extend(
        &self,
        key: &str,
        member: &str,
        ttl: Duration,
    ) -> Result<(), AuthError> {
        let now = Instant::now();
        let mut data = self.data.lock();
        if data.get(key).is_some_and(|e| e.is_expired(now)) {
            data.remove(key);
        }
        let existed = data.contains_key(key);
        let entry = data
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Set(HashSet::new())));
        let Value::Set(set) = &mut entry.value else {
            return Err(wrong_type(key));
        };
        set.insert(member.to_string());

        let wanted = now + ttl;
        entry.expires_at = match entry.expires_at {
            None if existed => None,
            None => Some(wanted),
            Some(at) => Some(at.max(wanted)),
        };
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, AuthError> {
        self.with_live(key, |entry| match entry {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<u64, AuthError> {
        let now = Instant::now();
        let mut data = self.data.lock();
        let Some(entry) = data.get_mut(key).filter(|e| !e.is_expired(now)) else {
            return Ok(0);
        };
        let Value::Set(set) = &mut entry.value else {
            return Err(wrong_type(key));
        };
        let removed = members.iter().filter(|m| set.remove(m.as_str())).count() as u64;
        // Redis drops empty sets
        if set.is_empty() {
            data.remove(key);
        }
        Ok(removed)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, AuthError> {
        let now = Instant::now();
        Ok(self.with_live(key, |entry| match entry {
            None => KeyTtl::Missing,
            Some(Entry {
                expires_at: None, ..
            }) => KeyTtl::Persistent,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => KeyTtl::Expires(at.saturating_duration_since(now)),
        }))
    }

    async fn exists(&self, key: &str) -> Result<bool, AuthError> {
        Ok(self.with_live(key, |entry| entry.is_some()))
    }

    async fn exists_many(&self, keys: &[String]) -> Result<Vec<bool>, AuthError> {
        let now = Instant::now();
        let data = self.data.lock();
        Ok(keys
            .iter()
            .map(|key| data.get(key).is_some_and(|e| !e.is_expired(now)))
            .collect())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, AuthError> {
        let now = Instant::now();
        let mut data = self.data.lock();
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = data.remove(key)
                && !entry.is_expired(now)
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn incr(&self, key: &str) -> Result<i64, AuthError> {
        let now = Instant::now();
        let mut data = self.data.lock();
        if data.get(key).is_some_and(|e| e.is_expired(now)) {
            data.remove(key);
        }
        let entry = data
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Str("0".to_string())));
        let Value::Str(s) = &mut entry.value else {
            return Err(wrong_type(key));
        };
        let n = s
            .parse::<i64>()
            .ok()
            .and_then(|n| n.checked_add(1))
            .ok_or_else(|| AuthError::corruption(format!("{key:?} is not an incrementable integer")))?;
        *s = n.to_string();
        Ok(n)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        self.with_live(key, |entry| match entry {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        self.put_raw(key, value);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, AuthError> {
        let now = Instant::now();
        Ok(self
            .data
            .lock()
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && !e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&'static str, &str)]) -> Vec<(&'static str, String)> {
        pairs.iter().map(|(f, v)| (*f, (*v).to_string())).collect()
    }

    #[tokio::test]
    async fn test_hash_create_only_if_absent() {
        let kv = MemoryKv::new();
        assert!(kv.hash_create("h", &fields(&[("a", "1")]), None).await.unwrap());
        assert!(!kv.hash_create("h", &fields(&[("a", "2")]), None).await.unwrap());
        assert_eq!(
            kv.hash_get("h", &["a", "b"]).await.unwrap(),
            vec![Some("1".to_string()), None]
        );
    }

    #[tokio::test]
    async fn test_hash_update_requires_key() {
        let kv = MemoryKv::new();
        assert!(!kv.hash_update("h", &fields(&[("a", "1")])).await.unwrap());
        assert!(!kv.exists("h").await.unwrap());

        kv.hash_create("h", &fields(&[("a", "1")]), None).await.unwrap();
        assert!(kv.hash_update("h", &fields(&[("a", "2")])).await.unwrap());
        assert_eq!(kv.hash_get("h", &["a"]).await.unwrap(), vec![Some("2".into())]);
    }

    #[tokio::test]
    async fn test_exists_many_keeps_order() {
        let kv = MemoryKv::new();
        kv.put_raw("a", "1");
        kv.hash_create("c", &fields(&[("f", "1")]), Some(Duration::ZERO))
            .await
            .unwrap();
        let keys = ["a", "b", "c"].map(String::from);
        assert_eq!(kv.exists_many(&keys).await.unwrap(), [true, false, false]);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let kv = MemoryKv::new();
        kv.hash_create("h", &fields(&[("a", "1")]), Some(Duration::from_millis(50)))
            .await
            .unwrap();
        assert!(kv.exists("h").await.unwrap());
        std::thread::sleep(Duration::from_millis(60));
        assert!(!kv.exists("h").await.unwrap());
        // expired keys can be created again
        assert!(kv.hash_create("h", &fields(&[("a", "2")]), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_ttl_never_shrinks() {
        let kv = MemoryKv::new();
        kv.set_add_extend("s", "a", Duration::from_secs(100)).await.unwrap();
        kv.set_add_extend("s", "b", Duration::from_secs(10)).await.unwrap();
        match kv.ttl("s").await.unwrap() {
            KeyTtl::Expires(t) => assert!(t > Duration::from_secs(90)),
            other => panic!("unexpected ttl {other:?}"),
        }
        kv.set_add_extend("s", "c", Duration::from_secs(500)).await.unwrap();
        match kv.ttl("s").await.unwrap() {
            KeyTtl::Expires(t) => assert!(t > Duration::from_secs(400)),
            other => panic!("unexpected ttl {other:?}"),
        }
        let mut members = kv.set_members("s").await.unwrap();
        members.sort();
        assert_eq!(members, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_set_remove() {
        let kv = MemoryKv::new();
        kv.set_add_extend("s", "a", Duration::from_secs(10)).await.unwrap();
        kv.set_add_extend("s", "b", Duration::from_secs(10)).await.unwrap();
        let removed = kv
            .set_remove("s", &["a".to_string(), "zzz".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(kv.set_members("s").await.unwrap(), ["b"]);
        kv.set_remove("s", &["b".to_string()]).await.unwrap();
        assert_eq!(kv.ttl("s").await.unwrap(), KeyTtl::Missing);
    }

    #[tokio::test]
    async fn test_incr_and_strings() {
        let kv = MemoryKv::new();
        assert_eq!(kv.incr("n").await.unwrap(), 1);
        assert_eq!(kv.incr("n").await.unwrap(), 2);
        kv.set("x", "hello").await.unwrap();
        assert_eq!(kv.get("x").await.unwrap().as_deref(), Some("hello"));
        assert_eq!(kv.get("missing").await.unwrap(), None);
        assert!(matches!(
            kv.incr("x").await,
            Err(AuthError::DataCorruption(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let kv = MemoryKv::new();
        kv.put_raw("k", "plain");
        assert!(matches!(
            kv.hash_get("k", &["a"]).await,
            Err(AuthError::DataCorruption(_))
        ));
        assert!(matches!(
            kv.set_members("k").await,
            Err(AuthError::DataCorruption(_))
        ));
        assert!(matches!(
            kv.set_add_extend("k", "m", Duration::from_secs(1)).await,
            Err(AuthError::DataCorruption(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_and_scan() {
        let kv = MemoryKv::new();
        kv.set("user:a", "1").await.unwrap();
        kv.set("user:b", "2").await.unwrap();
        kv.set("other", "3").await.unwrap();

        let mut keys = kv.scan_prefix("user:").await.unwrap();
        keys.sort();
        assert_eq!(keys, ["user:a", "user:b"]);

        let removed = kv
            .delete(&["user:a".to_string(), "nope".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(kv.len(), 2);
    }
}
