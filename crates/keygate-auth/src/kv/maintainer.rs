//! Background maintenance of the per-user session index.
//!
//! Tracked members are coalesced per set key in a pending map and written by
//! one tokio task in batches: every member is added, then each touched set is
//! swept once. A member stays visible through [`IndexMaintainer::pending_members`]
//! until it has been written to its set.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::store::KeyValueStore;

/// Members by set key, each with the longest TTL asked for.
type Batch = HashMap<String, HashMap<String, Duration>>;

#[derive(Default)]
struct Pending {
    /// Tracked since the last batch was taken.
    queued: Batch,
    /// Taken for writing and not yet in their sets.
    in_flight: Batch,
    /// Flush callers, released once the queue is empty.
    waiters: Vec<oneshot::Sender<()>>,
}

impl Pending {
    fn is_idle(&self) -> bool {
        self.queued.is_empty() && self.in_flight.is_empty()
    }

    /// Move the queue into `in_flight` and return it.
    fn take_batch(&mut self) -> Batch {
        let batch = mem::take(&mut self.queued);
        for (set_key, members) in &batch {
            let flying = self.in_flight.entry(set_key.clone()).or_default();
            for (member, ttl) in members {
                merge_ttl(flying, member.clone(), *ttl);
            }
        }
        batch
    }

    fn finish_batch(&mut self, batch: &Batch) {
        for (set_key, members) in batch {
            let drained = self.in_flight.get_mut(set_key).is_some_and(|flying| {
                flying.retain(|member, _| !members.contains_key(member));
                flying.is_empty()
            });
            if drained {
                self.in_flight.remove(set_key);
            }
        }
    }
}

fn merge_ttl(members: &mut HashMap<String, Duration>, member: String, ttl: Duration) {
    let slot = members.entry(member).or_insert(ttl);
    *slot = (*slot).max(ttl);
}

/// Drops pending flush waiters if the worker dies, so [`IndexMaintainer::flush`]
/// notices instead of hanging.
struct WorkerGuard(Arc<Mutex<Pending>>);

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.0.lock().waiters.clear();
    }
}

/// Fire-and-forget index updates, coalesced and applied by one tokio task.
///
/// Failures are logged and never reach the caller that tracked the member.
/// If the task is gone (its runtime shut down, or it panicked), updates are
/// written inline by the caller instead. The task stops when the maintainer
/// is dropped.
pub struct IndexMaintainer<K: ?Sized> {
    kv: Arc<K>,
    session_prefix: String,
    pending: Arc<Mutex<Pending>>,
    wake: mpsc::Sender<()>,
}

impl<K> IndexMaintainer<K>
where
    K: KeyValueStore + ?Sized + 'static,
{
    /// Spawn the worker on the current tokio runtime.
    ///
    /// `session_prefix` turns set members back into session record keys for
    /// the liveness sweep.
    pub fn spawn(kv: Arc<K>, session_prefix: String) -> Self {
        // one slot: wakeups coalesce while a batch is being written
        let (wake, mut rx) = mpsc::channel::<()>(1);
        let pending = Arc::new(Mutex::new(Pending::default()));

        let worker_kv = kv.clone();
        let worker_prefix = session_prefix.clone();
        let guard = WorkerGuard(pending.clone());
        tokio::spawn(async move {
            let pending = &guard.0;
            while rx.recv().await.is_some() {
                drain(&*worker_kv, &worker_prefix, pending).await;
            }
            drain(&*worker_kv, &worker_prefix, pending).await;
            debug!("index maintainer stopped");
        });

        Self {
            kv,
            session_prefix,
            pending,
            wake,
        }
    }

    /// Queue `member` for `set_key`.
    ///
    /// Returns as soon as the member is queued while the worker runs.
    pub async fn track(&self, set_key: String, member: String, valid_for: Duration) {
        merge_ttl(
            self.pending.lock().queued.entry(set_key).or_default(),
            member,
            valid_for,
        );
        if self.worker_gone() {
            warn!("index maintainer is not running, updating user index inline");
            self.write_inline().await;
        }
    }

    /// Members tracked for `set_key` that may not be in the set yet.
    pub fn pending_members(&self, set_key: &str) -> Vec<String> {
        let pending = self.pending.lock();
        let mut members: Vec<String> = [&pending.queued, &pending.in_flight]
            .into_iter()
            .filter_map(|batch| batch.get(set_key))
            .flat_map(|members| members.keys().cloned())
            .collect();
        members.sort_unstable();
        members.dedup();
        members
    }

    /// Wait until every member tracked before this call has been written.
    pub async fn flush(&self) {
        let done = {
            let mut pending = self.pending.lock();
            if pending.is_idle() {
                return;
            }
            let (tx, rx) = oneshot::channel();
            pending.waiters.push(tx);
            rx
        };
        if self.worker_gone() || done.await.is_err() {
            warn!("index maintainer is not running, flushing user index inline");
            self.write_inline().await;
        }
    }

    /// Wake the worker; `true` if it no longer exists.
    fn worker_gone(&self) -> bool {
        matches!(self.wake.try_send(()), Err(TrySendError::Closed(())))
    }

    /// Write everything queued, and whatever a dead worker left in flight.
    async fn write_inline(&self) {
        let batch = {
            let mut pending = self.pending.lock();
            pending.take_batch();
            pending.in_flight.clone()
        };
        write_batch(&*self.kv, &batch).await;
        self.pending.lock().finish_batch(&batch);
    }
}

impl<K: ?Sized> std::fmt::Debug for IndexMaintainer<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexMaintainer")
            .field("session_prefix", &self.session_prefix)
            .finish_non_exhaustive()
    }
}

/// Write batches until the queue is empty, then release flush waiters.
async fn drain<K: KeyValueStore + ?Sized>(
    kv: &K,
    session_prefix: &str,
    pending: &Mutex<Pending>,
) {
    loop {
        let batch = {
            let mut pending = pending.lock();
            if pending.queued.is_empty() {
                for waiter in pending.waiters.drain(..) {
                    let _ = waiter.send(());
                }
                return;
            }
            pending.take_batch()
        };

        write_batch(kv, &batch).await;
        for set_key in batch.keys() {
            sweep(kv, session_prefix, set_key).await;
        }
        pending.lock().finish_batch(&batch);
    }
}

async fn write_batch<K: KeyValueStore + ?Sized>(kv: &K, batch: &Batch) {
    for (set_key, members) in batch {
        for (member, ttl) in members {
            if let Err(e) = kv.set_add_extend(set_key, member, *ttl).await {
                warn!(set = %set_key, error = %e, "failed to add session to user index");
            }
        }
    }
}

/// Remove members whose session record is gone. Best effort.
async fn sweep<K: KeyValueStore + ?Sized>(kv: &K, session_prefix: &str, set_key: &str) {
    let members = match kv.set_members(set_key).await {
        Ok(members) => members,
        Err(e) => {
            warn!(set = %set_key, error = %e, "failed to read user index");
            return;
        }
    };
    if members.is_empty() {
        return;
    }

    let records: Vec<String> = members
        .iter()
        .map(|m| format!("{session_prefix}{m}"))
        .collect();
    let alive = match kv.exists_many(&records).await {
        Ok(alive) => alive,
        // unknown state: keep everything, revoke-all tolerates stale members
        Err(e) => {
            warn!(set = %set_key, error = %e, "failed to check sessions");
            return;
        }
    };

    let dead: Vec<String> = members
        .into_iter()
        .zip(alive)
        .filter_map(|(member, alive)| (!alive).then_some(member))
        .collect();
    if dead.is_empty() {
        return;
    }
    match kv.set_remove(set_key, &dead).await {
        Ok(removed) => debug!(set = %set_key, removed, "swept stale sessions from user index"),
        Err(e) => warn!(set = %set_key, error = %e, "failed to sweep user index"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::kv::MemoryKv;
    use crate::kv::testing::GatedKv;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[tokio::test]
    async fn test_track_and_flush() {
        let kv = Arc::new(MemoryKv::new());
        kv.put_raw("s:live", "x");
        let maintainer = IndexMaintainer::spawn(kv.clone(), "s:".to_string());

        maintainer.track("u:1".into(), "live".into(), secs(60)).await;
        maintainer.flush().await;

        assert_eq!(kv.set_members("u:1").await.unwrap(), ["live"]);
        assert!(maintainer.pending_members("u:1").is_empty());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_dead_members() {
        let kv = Arc::new(MemoryKv::new());
        kv.put_raw("s:a", "x");
        kv.put_raw("s:b", "x");
        let maintainer = IndexMaintainer::spawn(kv.clone(), "s:".to_string());

        maintainer.track("u:1".into(), "a".into(), secs(60)).await;
        maintainer.track("u:1".into(), "b".into(), secs(60)).await;
        maintainer.flush().await;

        kv.delete(&["s:a".to_string()]).await.unwrap();
        kv.put_raw("s:c", "x");
        maintainer.track("u:1".into(), "c".into(), secs(60)).await;
        maintainer.flush().await;

        let mut members = kv.set_members("u:1").await.unwrap();
        members.sort();
        assert_eq!(members, ["b", "c"]);
        // sweeping never touches the set key itself
        assert!(kv.exists("u:1").await.unwrap());
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let kv = Arc::new(MemoryKv::new());
        kv.put_raw("u:1", "not a set");
        let maintainer = IndexMaintainer::spawn(kv.clone(), "s:".to_string());

        maintainer.track("u:1".into(), "a".into(), secs(60)).await;
        maintainer.flush().await;

        // worker still alive after a failed batch
        kv.put_raw("s:b", "x");
        maintainer.track("u:2".into(), "b".into(), secs(60)).await;
        maintainer.flush().await;
        assert_eq!(kv.set_members("u:2").await.unwrap(), ["b"]);
    }

    #[tokio::test]
    async fn test_tracks_are_coalesced_per_set() {
        let kv = Arc::new(GatedKv::closed());
        let maintainer = IndexMaintainer::spawn(kv.clone(), "s:".to_string());

        for i in 0..150 {
            kv.inner.put_raw(&format!("s:k{i}"), "x");
            maintainer.track("u:1".into(), format!("k{i}"), secs(60)).await;
        }
        kv.open();
        maintainer.flush().await;

        assert_eq!(kv.inner.set_members("u:1").await.unwrap().len(), 150);
        // at most one batch started before the rest queued up behind it
        assert!(kv.sweeps.load(Ordering::SeqCst) <= 2);
        assert_eq!(kv.single_exists.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pending_members_cover_unwritten_tracks() {
        let kv = Arc::new(GatedKv::closed());
        let maintainer = IndexMaintainer::spawn(kv.clone(), "s:".to_string());

        maintainer.track("u:1".into(), "a".into(), secs(60)).await;
        tokio::task::yield_now().await;
        maintainer.track("u:1".into(), "b".into(), secs(60)).await;
        maintainer.track("u:2".into(), "c".into(), secs(60)).await;

        // the worker is stuck on the first write; nothing is in a set yet
        assert!(kv.inner.set_members("u:1").await.unwrap().is_empty());
        assert_eq!(maintainer.pending_members("u:1"), ["a", "b"]);
        assert_eq!(maintainer.pending_members("u:2"), ["c"]);
        assert!(maintainer.pending_members("u:3").is_empty());

        kv.open();
        maintainer.flush().await;
        assert!(maintainer.pending_members("u:1").is_empty());
    }

    #[tokio::test]
    async fn test_longest_ttl_wins() {
        let kv = Arc::new(GatedKv::closed());
        let maintainer = IndexMaintainer::spawn(kv.clone(), "s:".to_string());

        maintainer.track("u:1".into(), "a".into(), secs(60)).await;
        maintainer.track("u:1".into(), "a".into(), secs(600)).await;
        maintainer.track("u:1".into(), "a".into(), secs(30)).await;
        kv.open();
        maintainer.flush().await;

        match kv.inner.ttl("u:1").await.unwrap() {
            crate::kv::KeyTtl::Expires(t) => assert!(t > secs(300)),
            other => panic!("unexpected ttl {other:?}"),
        }
    }

    #[test]
    fn test_lost_worker_falls_back_to_inline_writes() {
        let kv = Arc::new(MemoryKv::new());
        let first = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let maintainer = first.block_on(async {
            let maintainer = IndexMaintainer::spawn(kv.clone(), "s:".to_string());
            maintainer.track("u:1".into(), "early".into(), secs(60)).await;
            maintainer
        });
        // shutting the runtime down drops the worker task
        drop(first);

        let second = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        second.block_on(async {
            maintainer.track("u:1".into(), "late".into(), secs(60)).await;
            maintainer.flush().await;

            let mut members = kv.set_members("u:1").await.unwrap();
            members.sort();
            assert_eq!(members, ["early", "late"]);
            assert!(maintainer.pending_members("u:1").is_empty());
        });
    }
}
