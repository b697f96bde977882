//! Rate limiting logic and counter storage.

mod key;
mod limiter;
mod memory;
mod redis_store;
mod rules;
mod store;
mod window;

pub use key::{CounterKey, DEFAULT_NAMESPACE};
pub use limiter::{Admission, Breach, RateLimiter};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use rules::{Tier, TierSet, TimeUnit, DEFAULT_TIERS};
pub use store::{CounterStore, StoreError};
pub use window::{seconds_until_reset, window_end};
