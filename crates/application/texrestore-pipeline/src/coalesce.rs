//! Single-flight, time-boxed cache slots filled on background threads.
//!
//! A read never blocks on a fill: it gets the freshest value the slot holds (possibly the
//! default) and, if that value is stale, the slot starts one background fill unless one is
//! already running. [`CoalescingCache::invalidate`] bumps an epoch; fills started under an
//! older epoch still run to completion but their results are dropped.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, error};

#[derive(Debug)]
pub struct CacheEntry<V> {
    pub value: Arc<V>,
    pub filled_at: Option<Instant>,
    /// Epoch of the fill currently running for this slot.
    in_flight: Option<u64>,
}

impl<V: Default> CacheEntry<V> {
    fn empty() -> Self {
        Self {
            value: Arc::new(V::default()),
            filled_at: None,
            in_flight: None,
        }
    }
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, staleness: Duration) -> bool {
        self.filled_at
            .map(|t| t.elapsed() < staleness)
            .unwrap_or(false)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }
}

struct State<K, V> {
    epoch: u64,
    running: usize,
    fills_started: u64,
    slots: HashMap<K, CacheEntry<V>>,
}

struct Shared<K, V> {
    state: Mutex<State<K, V>>,
    idle: Condvar,
}

impl<K, V> Shared<K, V> {
    fn lock(&self) -> MutexGuard<'_, State<K, V>> {
        // A panicking fill is caught before it touches the state, so poisoning only
        // means some reader panicked; the data is still consistent.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

pub struct CoalescingCache<K, V> {
    name: &'static str,
    staleness: Duration,
    shared: Arc<Shared<K, V>>,
}

impl<K, V> CoalescingCache<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    V: Default + Send + Sync + 'static,
{
    pub fn new(name: &'static str, staleness: Duration) -> Self {
        Self {
            name,
            staleness,
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    epoch: 0,
                    running: 0,
                    fills_started: 0,
                    slots: HashMap::new(),
                }),
                idle: Condvar::new(),
            }),
        }
    }

    pub fn staleness(&self) -> Duration {
        self.staleness
    }

    /// Current value of `key`; starts `fill` in the background when the value is stale and
    /// no fill for this slot is running.
    pub fn get_or_refresh<F>(&self, key: K, fill: F) -> Arc<V>
    where
        F: FnOnce() -> V + Send + 'static,
    {
        let (value, epoch) = {
            let mut state = self.shared.lock();
            let epoch = state.epoch;
            let entry = state.slots.entry(key.clone()).or_insert_with(CacheEntry::empty);
            if entry.is_fresh(self.staleness) || entry.in_flight.is_some() {
                return entry.value.clone();
            }
            entry.in_flight = Some(epoch);
            let value = entry.value.clone();
            state.running += 1;
            state.fills_started += 1;
            (value, epoch)
        };

        debug!("{}: starting fill for {:?} (epoch {})", self.name, key, epoch);
        let shared = self.shared.clone();
        let name = self.name;
        let fill_key = key.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("texrestore-fill-{name}"))
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(fill));
                Self::complete(&shared, name, fill_key, epoch, result.ok());
            });

        if let Err(e) = spawned {
            error!("{}: failed to start fill worker: {}", self.name, e);
            Self::complete(&self.shared, self.name, key, epoch, None);
        }
        value
    }

    fn complete(shared: &Shared<K, V>, name: &str, key: K, epoch: u64, value: Option<V>) {
        let mut state = shared.lock();
        state.running = state.running.saturating_sub(1);
        if state.epoch == epoch {
            if let Some(entry) = state.slots.get_mut(&key) {
                entry.in_flight = None;
                match value {
                    Some(v) => {
                        entry.value = Arc::new(v);
                        entry.filled_at = Some(Instant::now());
                    }
                    None => {
                        error!("{}: fill for {:?} panicked, keeping previous value", name, key)
                    }
                }
            }
        } else {
            debug!(
                "{}: dropping fill for {:?} from epoch {} (now {})",
                name, key, epoch, state.epoch
            );
        }
        drop(state);
        shared.idle.notify_all();
    }

    /// Value currently held for `key`, fresh or not, without starting a fill.
    pub fn peek(&self, key: &K) -> Option<Arc<V>> {
        self.shared.lock().slots.get(key).map(|e| e.value.clone())
    }

    pub fn is_fresh(&self, key: &K) -> bool {
        self.shared
            .lock()
            .slots
            .get(key)
            .map(|e| e.is_fresh(self.staleness))
            .unwrap_or(false)
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.shared
            .lock()
            .slots
            .get(key)
            .map(|e| e.is_in_flight())
            .unwrap_or(false)
    }

    /// Total fills started since creation, across all slots and epochs.
    pub fn fills_started(&self) -> u64 {
        self.shared.lock().fills_started
    }

    /// Drop every slot and disown running fills.
    pub fn invalidate(&self) {
        let mut state = self.shared.lock();
        state.epoch += 1;
        state.slots.clear();
        debug!("{}: invalidated (epoch {})", self.name, state.epoch);
    }

    /// Block until no fill is running or `timeout` elapses. Returns true when idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let state = self.shared.lock();
        let (state, _) = self
            .shared
            .idle
            .wait_timeout_while(state, timeout, |s| s.running > 0)
            .unwrap_or_else(|p| p.into_inner());
        state.running == 0
    }
}
