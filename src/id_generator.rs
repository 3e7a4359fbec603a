//! Error identifier generation
//!
//! Snowflake-style 64-bit identifiers: 41 bits of milliseconds since
//! 2020-01-01T00:00:00Z, a 10-bit node discriminant and a 12-bit sequence.
//! Generation never blocks and never fails; when the clock is unavailable or
//! runs backwards the generator keeps counting from the last issued value.

use chrono::Utc;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// 2020-01-01T00:00:00Z in Unix milliseconds
pub const EPOCH_MILLIS: u64 = 1_577_836_800_000;

const SEQUENCE_BITS: u32 = 12;
const NODE_BITS: u32 = 10;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

/// Largest node discriminant that fits the id layout
pub const MAX_NODE_ID: u16 = (1 << NODE_BITS) - 1;

/// Source of unique error identifiers
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> u64;
}

/// Wall-clock source used by [`SnowflakeGenerator`]
pub trait Clock: Send + Sync {
    /// Current Unix time in milliseconds, `None` when unavailable
    fn now_millis(&self) -> Option<u64>;
}

/// System clock backed by `chrono`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> Option<u64> {
        u64::try_from(Utc::now().timestamp_millis()).ok()
    }
}

/// Lock-free time/node/sequence generator
#[derive(Debug)]
pub struct SnowflakeGenerator<C: Clock = SystemClock> {
    node_id: u16,
    clock: C,
    /// Last issued `millis << SEQUENCE_BITS | sequence`
    last_tick: AtomicU64,
}

impl SnowflakeGenerator<SystemClock> {
    pub fn new(node_id: u16) -> Self {
        Self::with_clock(node_id, SystemClock)
    }
}

impl<C: Clock> SnowflakeGenerator<C> {
    /// Node ids above [`MAX_NODE_ID`] are truncated to the layout width.
    pub fn with_clock(node_id: u16, clock: C) -> Self {
        let node_id = node_id & MAX_NODE_ID;
        debug!(node_id, "Initializing error id generator");
        Self {
            node_id,
            clock,
            last_tick: AtomicU64::new(0),
        }
    }

    fn current_tick(&self) -> Option<u64> {
        self.clock
            .now_millis()
            .and_then(|millis| millis.checked_sub(EPOCH_MILLIS))
            .map(|elapsed| elapsed << SEQUENCE_BITS)
    }

    fn compose(&self, tick: u64) -> u64 {
        let millis = tick >> SEQUENCE_BITS;
        let sequence = tick & SEQUENCE_MASK;
        (millis << (NODE_BITS + SEQUENCE_BITS))
            | (u64::from(self.node_id) << SEQUENCE_BITS)
            | sequence
    }
}

impl<C: Clock> IdGenerator for SnowflakeGenerator<C> {
    fn generate(&self) -> u64 {
        let now = self.current_tick();
        let mut last = self.last_tick.load(Ordering::Acquire);
        loop {
            // Sequence overflow carries into the millisecond bits.
            let next = match now {
                Some(tick) if tick > last => tick,
                _ => last.wrapping_add(1),
            };
            match self
                .last_tick
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return self.compose(next),
                Err(actual) => last = actual,
            }
        }
    }
}

/// Deterministic generator yielding `start, start + 1, ...`
#[derive(Debug)]
pub struct SequenceIdGenerator {
    next: AtomicU64,
}

impl SequenceIdGenerator {
    pub fn starting_at(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }
}

impl IdGenerator for SequenceIdGenerator {
    fn generate(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Pick a node discriminant for this process.
///
/// An explicit id wins; otherwise the host name is hashed so replicas on
/// different hosts differ, and a random id is the last resort.
pub fn resolve_node_id(explicit: Option<u16>, hostname: Option<&str>) -> u16 {
    if let Some(node_id) = explicit {
        return node_id & MAX_NODE_ID;
    }

    match hostname.filter(|h| !h.is_empty()) {
        Some(host) => {
            let mut hasher = DefaultHasher::new();
            host.hash(&mut hasher);
            (hasher.finish() & u64::from(MAX_NODE_ID)) as u16
        }
        None => rand::random::<u16>() & MAX_NODE_ID,
    }
}
