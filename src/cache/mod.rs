//! Cache module - snapshot caches kept coherent by an invalidation bus.
//!
//! ## Architecture
//!
//! - `InvalidationBus` - named topics, synchronous in-process fan-out
//! - `SnapshotCache` - at most one copy of a whole query result
//! - Repositories own their snapshot caches and subscribe them to the
//!   topics that affect their rows
//!
//! ## Usage
//!
//! ```rust
//! use rollcall::cache::{InvalidationBus, SnapshotCache, Topic};
//!
//! let bus = InvalidationBus::new();
//! let groups: SnapshotCache<String> = SnapshotCache::new("groups");
//! groups.subscribe_to(&bus, Topic::GROUPS);
//!
//! // After a write to the groups table:
//! bus.signal(&Topic::GROUPS);
//! assert!(!groups.is_present());
//! ```

mod bus;
mod snapshot;

pub use bus::{InvalidationBus, Topic};
pub use snapshot::SnapshotCache;
