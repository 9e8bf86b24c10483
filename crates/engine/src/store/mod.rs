// Copyright 2025 itscheems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Shared coordination store
//!
//! All transient coordination state of the pipeline (reservation locks,
//! stock counters, the idempotence index, rate-limit windows, the intent
//! queue and the expiry set) lives behind [`CoordinationStore`]. Components
//! receive an explicit `Arc<dyn CoordinationStore>` handle and only ever
//! touch it through the single-key atomic primitives below; nothing reads a
//! value and writes it back.

mod memory;
#[cfg(feature = "redis")]
mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryCoordinationStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisCoordinationStore;

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("Coordination store error: {0}")]
	Backend(String),
	#[error("Serialization error: {0}")]
	Serialization(String),
}

#[async_trait]
pub trait CoordinationStore: Send + Sync {
	async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

	/// Set a value with no expiry
	async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

	async fn del(&self, key: &str) -> Result<(), StoreError>;

	/// Set a value with no expiry only if `key` is absent. Returns true if
	/// this call created it.
	async fn set_nx(&self, key: &str, value: &str) -> Result<bool, StoreError>;

	/// Create `key` only if it is absent. Returns true if this call created it.
	async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;

	/// Atomic increment; a missing key counts as 0
	async fn incr(&self, key: &str) -> Result<i64, StoreError>;

	/// Atomic decrement; a missing key counts as 0
	async fn decr(&self, key: &str) -> Result<i64, StoreError>;

	/// Atomic increment of a fixed-window counter
	///
	/// The TTL is applied only when the increment creates the key, so the
	/// window is never extended by later hits.
	async fn incr_window(&self, key: &str, window: Duration) -> Result<i64, StoreError>;

	/// Push onto the head of a list
	async fn lpush(&self, key: &str, value: &str) -> Result<(), StoreError>;

	/// Pop from the tail of a list (oldest pushed entry)
	async fn rpop(&self, key: &str) -> Result<Option<String>, StoreError>;

	/// Like `rpop`, but waits up to `timeout` for an entry to arrive
	async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<String>, StoreError>;

	/// Insert or re-score a member of an ordered set
	async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), StoreError>;

	/// Remove a member. Returns true if it was present.
	async fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError>;

	/// Lowest-scored member whose score is `<= max_score`, without removing it
	async fn zfirst_due(&self, key: &str, max_score: i64) -> Result<Option<String>, StoreError>;
}
