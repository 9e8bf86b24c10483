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

mod consumer;

pub use consumer::{IntentConsumer, IntentProcessor};

use std::{sync::Arc, time::Duration};

use flashsale_sdk::types::OrderIntent;

use crate::{
	keys,
	store::{CoordinationStore, StoreError},
};

/// Order intent queue between the admission path and durable order creation
///
/// A FIFO list in the coordination store: producers push onto the head,
/// the consumer pops the oldest entry from the tail. Delivery is
/// at-most-once: a popped intent that fails processing is not redelivered.
///
/// The queue does NOT:
/// - Deduplicate intents (the idempotence index does)
/// - Retry or dead-letter failed intents
pub struct OrderIntentQueue {
	store: Arc<dyn CoordinationStore>,
	key: String,
}

impl OrderIntentQueue {
	pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
		Self::with_key(store, keys::ORDER_INTENT_QUEUE)
	}

	pub fn with_key(store: Arc<dyn CoordinationStore>, key: &str) -> Self {
		Self {
			store,
			key: key.to_string(),
		}
	}

	pub async fn enqueue(&self, intent: &OrderIntent) -> Result<(), QueueError> {
		let payload = serde_json::to_string(intent)
			.map_err(|e| QueueError::Malformed(e.to_string()))?;
		self.store.lpush(&self.key, &payload).await?;
		Ok(())
	}

	/// Pop the oldest intent without waiting
	pub async fn try_dequeue(&self) -> Result<Option<OrderIntent>, QueueError> {
		match self.store.rpop(&self.key).await? {
			Some(payload) => decode(&payload).map(Some),
			None => Ok(None),
		}
	}

	/// Pop the oldest intent, waiting up to `timeout` for one to arrive
	pub async fn dequeue(&self, timeout: Duration) -> Result<Option<OrderIntent>, QueueError> {
		match self.store.brpop(&self.key, timeout).await? {
			Some(payload) => decode(&payload).map(Some),
			None => Ok(None),
		}
	}
}

fn decode(payload: &str) -> Result<OrderIntent, QueueError> {
	serde_json::from_str(payload).map_err(|e| QueueError::Malformed(format!("{}: {}", e, payload)))
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
	/// The entry was removed from the queue but could not be decoded
	#[error("Malformed intent: {0}")]
	Malformed(String),
	#[error(transparent)]
	Store(#[from] StoreError),
}
