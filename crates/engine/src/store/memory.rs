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

use std::{
	collections::{BTreeSet, HashMap, VecDeque},
	sync::{Mutex, MutexGuard},
	time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::Notify;

use super::{CoordinationStore, StoreError};

struct Value {
	data: String,
	expires_at: Option<Instant>,
}

impl Value {
	fn persistent(data: String) -> Self {
		Self {
			data,
			expires_at: None,
		}
	}

	fn expiring(data: String, ttl: Duration) -> Self {
		Self {
			data,
			expires_at: Some(Instant::now() + ttl),
		}
	}

	fn is_expired(&self, now: Instant) -> bool {
		self.expires_at.is_some_and(|at| at <= now)
	}
}

#[derive(Default)]
struct OrderedSet {
	scores: HashMap<String, i64>,
	ordered: BTreeSet<(i64, String)>,
}

/// Process-local coordination store
///
/// Keyed values live in a `DashMap` so every counter and lock operation is
/// atomic under the shard lock of its key. TTLs are enforced lazily: an
/// expired value is treated as absent by the next operation that touches it.
/// Lists and ordered sets sit behind plain mutexes that are never held
/// across an await point.
pub struct MemoryCoordinationStore {
	values: DashMap<String, Value>,
	lists: Mutex<HashMap<String, VecDeque<String>>>,
	list_pushed: Notify,
	sets: Mutex<HashMap<String, OrderedSet>>,
}

impl MemoryCoordinationStore {
	pub fn new() -> Self {
		Self {
			values: DashMap::new(),
			lists: Mutex::new(HashMap::new()),
			list_pushed: Notify::new(),
			sets: Mutex::new(HashMap::new()),
		}
	}

	/// Number of entries currently waiting in a list
	pub fn list_len(&self, key: &str) -> Result<usize, StoreError> {
		Ok(self.lock_lists()?.get(key).map_or(0, VecDeque::len))
	}

	/// Number of members in an ordered set
	pub fn zcard(&self, key: &str) -> Result<usize, StoreError> {
		Ok(self.lock_sets()?.get(key).map_or(0, |set| set.scores.len()))
	}

	/// Score of a member of an ordered set
	pub fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>, StoreError> {
		Ok(self
			.lock_sets()?
			.get(key)
			.and_then(|set| set.scores.get(member).copied()))
	}

	fn lock_lists(&self) -> Result<MutexGuard<'_, HashMap<String, VecDeque<String>>>, StoreError> {
		self.lists
			.lock()
			.map_err(|_| StoreError::Backend("list state poisoned".to_string()))
	}

	fn lock_sets(&self) -> Result<MutexGuard<'_, HashMap<String, OrderedSet>>, StoreError> {
		self.sets
			.lock()
			.map_err(|_| StoreError::Backend("ordered set state poisoned".to_string()))
	}

	fn add(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
		let now = Instant::now();
		let mut value = self
			.values
			.entry(key.to_string())
			.or_insert_with(|| Value::persistent("0".to_string()));
		if value.is_expired(now) {
			*value = Value::persistent("0".to_string());
		}

		let current: i64 = value.data.parse().map_err(|_| {
			StoreError::Backend(format!("value at {} is not an integer", key))
		})?;
		let next = current + delta;
		value.data = next.to_string();
		Ok(next)
	}

	fn insert_if_absent(&self, key: &str, value: Value) -> bool {
		let now = Instant::now();
		match self.values.entry(key.to_string()) {
			Entry::Occupied(mut occupied) => {
				if occupied.get().is_expired(now) {
					occupied.insert(value);
					true
				} else {
					false
				}
			}
			Entry::Vacant(vacant) => {
				vacant.insert(value);
				true
			}
		}
	}

	fn pop_tail(&self, key: &str) -> Result<Option<String>, StoreError> {
		let mut lists = self.lock_lists()?;
		let Some(list) = lists.get_mut(key) else {
			return Ok(None);
		};
		let popped = list.pop_back();
		if list.is_empty() {
			lists.remove(key);
		}
		Ok(popped)
	}
}

impl Default for MemoryCoordinationStore {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl CoordinationStore for MemoryCoordinationStore {
	async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		let now = Instant::now();
		if let Some(value) = self.values.get(key) {
			if !value.is_expired(now) {
				return Ok(Some(value.data.clone()));
			}
		} else {
			return Ok(None);
		}
		self.values.remove_if(key, |_, value| value.is_expired(now));
		Ok(None)
	}

	async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
		self.values
			.insert(key.to_string(), Value::persistent(value.to_string()));
		Ok(())
	}

	async fn del(&self, key: &str) -> Result<(), StoreError> {
		self.values.remove(key);
		Ok(())
	}

	async fn set_nx(&self, key: &str, value: &str) -> Result<bool, StoreError> {
		Ok(self.insert_if_absent(key, Value::persistent(value.to_string())))
	}

	async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
		Ok(self.insert_if_absent(key, Value::expiring(value.to_string(), ttl)))
	}

	async fn incr(&self, key: &str) -> Result<i64, StoreError> {
		self.add(key, 1)
	}

	async fn decr(&self, key: &str) -> Result<i64, StoreError> {
		self.add(key, -1)
	}

	async fn incr_window(&self, key: &str, window: Duration) -> Result<i64, StoreError> {
		let now = Instant::now();
		match self.values.entry(key.to_string()) {
			Entry::Occupied(mut occupied) => {
				if occupied.get().is_expired(now) {
					occupied.insert(Value::expiring("1".to_string(), window));
					return Ok(1);
				}
				let value = occupied.get_mut();
				let count: i64 = value.data.parse().map_err(|_| {
					StoreError::Backend(format!("value at {} is not an integer", key))
				})?;
				value.data = (count + 1).to_string();
				Ok(count + 1)
			}
			Entry::Vacant(vacant) => {
				vacant.insert(Value::expiring("1".to_string(), window));
				Ok(1)
			}
		}
	}

	async fn lpush(&self, key: &str, value: &str) -> Result<(), StoreError> {
		self.lock_lists()?
			.entry(key.to_string())
			.or_default()
			.push_front(value.to_string());
		self.list_pushed.notify_waiters();
		Ok(())
	}

	async fn rpop(&self, key: &str) -> Result<Option<String>, StoreError> {
		self.pop_tail(key)
	}

	async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
		let deadline = tokio::time::Instant::now() + timeout;
		loop {
			// Register interest before checking so a push between the check
			// and the wait is not missed.
			let pushed = self.list_pushed.notified();
			tokio::pin!(pushed);
			pushed.as_mut().enable();

			if let Some(value) = self.pop_tail(key)? {
				return Ok(Some(value));
			}
			if tokio::time::timeout_at(deadline, pushed).await.is_err() {
				return self.pop_tail(key);
			}
		}
	}

	async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), StoreError> {
		let mut sets = self.lock_sets()?;
		let set = sets.entry(key.to_string()).or_default();
		if let Some(old) = set.scores.insert(member.to_string(), score) {
			set.ordered.remove(&(old, member.to_string()));
		}
		set.ordered.insert((score, member.to_string()));
		Ok(())
	}

	async fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
		let mut sets = self.lock_sets()?;
		let Some(set) = sets.get_mut(key) else {
			return Ok(false);
		};
		let removed = match set.scores.remove(member) {
			Some(score) => set.ordered.remove(&(score, member.to_string())),
			None => false,
		};
		if set.scores.is_empty() {
			sets.remove(key);
		}
		Ok(removed)
	}

	async fn zfirst_due(&self, key: &str, max_score: i64) -> Result<Option<String>, StoreError> {
		let sets = self.lock_sets()?;
		Ok(sets
			.get(key)
			.and_then(|set| set.ordered.iter().next())
			.filter(|(score, _)| *score <= max_score)
			.map(|(_, member)| member.clone()))
	}
}
