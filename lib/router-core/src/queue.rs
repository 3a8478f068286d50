//! Work queue keyed by resource identity
//!
//! A key is held at most once in the queue and is never handed to two
//! workers at the same time. Adding a key that is being processed marks it
//! dirty; it is queued again when the worker calls [`WorkQueue::done`].

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

struct Timer {
    id: u64,
    handle: JoinHandle<()>,
}

struct QueueState<K> {
    queue: VecDeque<K>,
    queued: HashSet<K>,
    processing: HashSet<K>,
    dirty: HashSet<K>,
    timers: HashMap<K, Timer>,
    next_timer: u64,
    shutdown: bool,
}

impl<K> Default for QueueState<K> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            queued: HashSet::new(),
            processing: HashSet::new(),
            dirty: HashSet::new(),
            timers: HashMap::new(),
            next_timer: 0,
            shutdown: false,
        }
    }
}

struct Inner<K> {
    state: Mutex<QueueState<K>>,
    notify: Notify,
}

pub struct WorkQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K> Default for WorkQueue<K> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                notify: Notify::new(),
            }),
        }
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `key` now
    pub fn add(&self, key: K) {
        let mut state = self.inner.state.lock();
        if state.shutdown {
            return;
        }
        if state.processing.contains(&key) {
            state.dirty.insert(key);
            return;
        }
        if state.queued.insert(key.clone()) {
            state.queue.push_back(key);
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Queue `key` once `delay` has passed, replacing any pending timer for it
    pub fn add_after(&self, key: K, delay: Duration) {
        let mut state = self.inner.state.lock();
        if state.shutdown {
            return;
        }
        state.next_timer += 1;
        let id = state.next_timer;

        let queue = self.clone();
        let fired = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.fire(fired, id);
        });
        if let Some(previous) = state.timers.insert(key, Timer { id, handle }) {
            previous.handle.abort();
        }
    }

    /// Cancel a pending delayed add for `key`
    pub fn forget(&self, key: &K) {
        if let Some(timer) = self.inner.state.lock().timers.remove(key) {
            timer.handle.abort();
        }
    }

    /// Wait for the next key. Returns `None` after [`WorkQueue::shutdown`].
    pub async fn next(&self) -> Option<K> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.inner.state.lock();
                if state.shutdown {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.queued.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Release `key` after processing, re-queueing it if it was added meanwhile
    pub fn done(&self, key: &K) {
        let mut state = self.inner.state.lock();
        state.processing.remove(key);
        if state.dirty.remove(key) && !state.shutdown && state.queued.insert(key.clone()) {
            state.queue.push_back(key.clone());
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Stop handing out keys and cancel every pending timer
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        state.shutdown = true;
        for (_, timer) in state.timers.drain() {
            timer.handle.abort();
        }
        drop(state);
        self.inner.notify.notify_waiters();
    }

    /// Keys waiting to be handed out
    pub fn len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True while a delayed add for `key` is pending
    pub fn has_timer(&self, key: &K) -> bool {
        self.inner.state.lock().timers.contains_key(key)
    }

    fn fire(&self, key: K, id: u64) {
        {
            let mut state = self.inner.state.lock();
            match state.timers.get(&key) {
                Some(timer) if timer.id == id => {
                    state.timers.remove(&key);
                }
                _ => return,
            }
        }
        self.add(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_add_deduplicates() {
        let queue = WorkQueue::new();
        queue.add("a");
        queue.add("b");
        queue.add("a");
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.next().await, Some("a"));
        assert_eq!(queue.next().await, Some("b"));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_key_is_not_handed_out_twice() {
        let queue = WorkQueue::new();
        queue.add("a");
        assert_eq!(queue.next().await, Some("a"));

        // Added while processing: held back until done
        queue.add("a");
        assert!(queue.is_empty());
        assert!(timeout(Duration::from_millis(20), queue.next()).await.is_err());

        queue.done(&"a");
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next().await, Some("a"));
        queue.done(&"a");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_add_after_fires() {
        let queue = WorkQueue::new();
        queue.add_after("a", Duration::from_millis(10));
        assert!(queue.has_timer(&"a"));
        let key = timeout(Duration::from_secs(2), queue.next()).await.unwrap();
        assert_eq!(key, Some("a"));
        assert!(!queue.has_timer(&"a"));
    }

    #[tokio::test]
    async fn test_forget_cancels_timer() {
        let queue = WorkQueue::new();
        queue.add_after("a", Duration::from_millis(10));
        queue.forget(&"a");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_wakes_workers() {
        let queue: WorkQueue<&str> = WorkQueue::new();
        let worker = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.shutdown();
        let result = timeout(Duration::from_secs(2), worker).await.unwrap().unwrap();
        assert_eq!(result, None);

        queue.add("a");
        assert!(queue.is_empty());
    }
}
