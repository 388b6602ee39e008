use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;

/// Cancellable one-shot timers keyed by `(entity, purpose)`.
///
/// Scheduling a key that is already armed replaces it: the old token is
/// forgotten and its heap entry is dropped lazily when it surfaces in
/// [`TimerQueue::pop_due`]. Nothing fires on its own; the owner polls with the
/// current time.
#[derive(Clone, Debug)]
pub struct TimerQueue<K> {
    next_token: u64,
    armed: HashMap<K, (u64, u64)>,
    heap: BinaryHeap<Reverse<(u64, u64)>>,
    keys: HashMap<u64, K>,
}

impl<K> Default for TimerQueue<K> {
    fn default() -> Self {
        Self {
            next_token: 1,
            armed: HashMap::new(),
            heap: BinaryHeap::new(),
            keys: HashMap::new(),
        }
    }
}

impl<K> TimerQueue<K>
where
    K: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    pub fn is_armed(&self, key: &K) -> bool {
        self.armed.contains_key(key)
    }

    pub fn due_at(&self, key: &K) -> Option<u64> {
        self.armed.get(key).map(|&(_, due)| due)
    }

    /// Arms `key` to fire at `due_ms`, replacing any pending timer for the same key.
    pub fn schedule(&mut self, key: K, due_ms: u64) {
        let token = self.next_token;
        self.next_token += 1;
        if let Some((old_token, _)) = self.armed.insert(key.clone(), (token, due_ms)) {
            self.keys.remove(&old_token);
        }
        self.keys.insert(token, key);
        self.heap.push(Reverse((due_ms, token)));
    }

    pub fn cancel(&mut self, key: &K) -> bool {
        match self.armed.remove(key) {
            Some((token, _)) => {
                self.keys.remove(&token);
                true
            }
            None => false,
        }
    }

    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&K) -> bool) -> usize {
        let doomed: Vec<K> = self.armed.keys().filter(|key| predicate(key)).cloned().collect();
        for key in &doomed {
            self.cancel(key);
        }
        doomed.len()
    }

    pub fn clear(&mut self) {
        self.armed.clear();
        self.keys.clear();
        self.heap.clear();
    }

    /// Removes and returns every live timer due at or before `now_ms`, earliest first.
    pub fn pop_due(&mut self, now_ms: u64) -> Vec<K> {
        let mut fired = Vec::new();
        while let Some(&Reverse((due, token))) = self.heap.peek() {
            if due > now_ms {
                break;
            }
            self.heap.pop();
            let Some(key) = self.keys.remove(&token) else {
                continue;
            };
            self.armed.remove(&key);
            fired.push(key);
        }
        if self.armed.is_empty() {
            self.heap.clear();
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_due_order() {
        let mut timers = TimerQueue::new();
        timers.schedule("b", 200);
        timers.schedule("a", 100);
        timers.schedule("c", 300);
        assert!(timers.pop_due(50).is_empty());
        assert_eq!(timers.pop_due(250), vec!["a", "b"]);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.pop_due(300), vec!["c"]);
        assert!(timers.is_empty());
    }

    #[test]
    fn rescheduling_replaces_previous_timer() {
        let mut timers = TimerQueue::new();
        timers.schedule("shield", 100);
        timers.schedule("shield", 500);
        assert_eq!(timers.due_at(&"shield"), Some(500));
        assert!(timers.pop_due(200).is_empty());
        assert_eq!(timers.pop_due(500), vec!["shield"]);
        assert!(timers.pop_due(10_000).is_empty());
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let mut timers = TimerQueue::new();
        timers.schedule(1u32, 10);
        timers.schedule(2u32, 10);
        assert!(timers.cancel(&1));
        assert!(!timers.cancel(&1));
        assert_eq!(timers.pop_due(10), vec![2]);
    }

    #[test]
    fn cancel_where_drops_matching_keys_only() {
        let mut timers = TimerQueue::new();
        timers.schedule(("p1", 0), 10);
        timers.schedule(("p1", 1), 20);
        timers.schedule(("p2", 0), 30);
        assert_eq!(timers.cancel_where(|(player, _)| *player == "p1"), 2);
        assert!(!timers.is_armed(&("p1", 1)));
        assert_eq!(timers.pop_due(100), vec![("p2", 0)]);
    }

    #[test]
    fn clear_disarms_everything() {
        let mut timers = TimerQueue::new();
        timers.schedule("x", 1);
        timers.schedule("y", 2);
        timers.clear();
        assert!(timers.pop_due(u64::MAX).is_empty());
        timers.schedule("x", 5);
        assert_eq!(timers.pop_due(5), vec!["x"]);
    }
}
