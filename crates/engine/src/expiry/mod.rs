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

//! Delayed expiry of unpaid orders
//!
//! Every Unpaid order has exactly one entry in a time-ordered set, scored by
//! its payment deadline in unix milliseconds. The [`ExpiryPoller`] repeatedly
//! takes the earliest entry that is due and hands it to an [`ExpiryHandler`],
//! which either closes the order or discards the stale entry.

mod poller;

pub use poller::{ExpiryHandler, ExpiryPoller};

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
	keys,
	store::{CoordinationStore, StoreError},
};

pub struct ExpiryScheduler {
	store: Arc<dyn CoordinationStore>,
	key: String,
}

impl ExpiryScheduler {
	pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
		Self {
			store,
			key: keys::ORDER_EXPIRY_SET.to_string(),
		}
	}

	/// Insert (or move) `order_id` so it becomes due at `expire_at`
	pub async fn schedule(&self, order_id: &str, expire_at: DateTime<Utc>) -> Result<(), StoreError> {
		self.store
			.zadd(&self.key, order_id, expire_at.timestamp_millis())
			.await
	}

	/// Remove the entry of `order_id`. Returns true if it was scheduled.
	pub async fn cancel(&self, order_id: &str) -> Result<bool, StoreError> {
		self.store.zrem(&self.key, order_id).await
	}

	/// Earliest order whose deadline is at or before `now`
	pub async fn next_due(&self, now: DateTime<Utc>) -> Result<Option<String>, StoreError> {
		self.store
			.zfirst_due(&self.key, now.timestamp_millis())
			.await
	}
}
