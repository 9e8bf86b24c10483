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
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	time::Duration,
};

use async_trait::async_trait;
use flashsale_sdk::types::OrderIntent;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{OrderIntentQueue, QueueError};
use crate::{config::EngineConfig, error::SeckillError};

/// Turns one dequeued intent into a durable order
///
/// Returns the created order id, or `None` when the intent was skipped
/// because an order already exists for the pair.
#[async_trait]
pub trait IntentProcessor: Send + Sync {
	async fn process_intent(&self, intent: OrderIntent) -> Result<Option<String>, SeckillError>;
}

#[derive(Debug, Clone, Copy)]
enum PopMode {
	/// Wait on the store's blocking pop for up to the given duration
	Blocking(Duration),
	/// Pop without waiting and sleep for the given duration when empty
	Polling(Duration),
}

/// Background worker draining the order intent queue
///
/// A single logical consumer. Several consumers may run against the same
/// store since every pop and every state change downstream is atomic.
pub struct IntentConsumer {
	task_handle: Option<JoinHandle<()>>,
	shutdown: Arc<AtomicBool>,
}

impl IntentConsumer {
	pub fn start(
		queue: Arc<OrderIntentQueue>,
		processor: Arc<dyn IntentProcessor>,
		config: &EngineConfig,
	) -> Self {
		let shutdown = Arc::new(AtomicBool::new(false));
		let shutdown_clone = shutdown.clone();
		let mode = if config.consumer_blocking_pop {
			PopMode::Blocking(config.consumer_block())
		} else {
			PopMode::Polling(config.consumer_idle())
		};

		let task_handle = tokio::spawn(async move {
			info!(target: "intent_consumer", mode = ?mode, "Intent consumer started");
			Self::run_consumer_loop(&queue, processor.as_ref(), mode, &shutdown_clone).await;
			info!(target: "intent_consumer", "Intent consumer stopped");
		});

		Self {
			task_handle: Some(task_handle),
			shutdown,
		}
	}

	async fn run_consumer_loop(
		queue: &OrderIntentQueue,
		processor: &dyn IntentProcessor,
		mode: PopMode,
		shutdown: &AtomicBool,
	) {
		loop {
			if shutdown.load(Ordering::Relaxed) {
				break;
			}

			let popped = match mode {
				PopMode::Blocking(timeout) => queue.dequeue(timeout).await,
				PopMode::Polling(_) => queue.try_dequeue().await,
			};

			let intent = match popped {
				Ok(Some(intent)) => intent,
				Ok(None) => {
					if let PopMode::Polling(idle) = mode {
						tokio::time::sleep(idle).await;
					}
					continue;
				}
				Err(QueueError::Malformed(e)) => {
					warn!(target: "intent_consumer", error = %e, "Dropping malformed intent");
					continue;
				}
				Err(QueueError::Store(e)) => {
					error!(target: "intent_consumer", error = %e, "Failed to pop intent");
					tokio::time::sleep(mode.backoff()).await;
					continue;
				}
			};

			match processor.process_intent(intent).await {
				Ok(Some(order_id)) => {
					debug!(
						target: "intent_consumer",
						user_id = intent.user_id,
						goods_id = intent.goods_id,
						order_id = %order_id,
						"Intent fulfilled"
					);
				}
				Ok(None) => {
					debug!(
						target: "intent_consumer",
						user_id = intent.user_id,
						goods_id = intent.goods_id,
						"Intent skipped, order already exists"
					);
				}
				Err(e) => {
					error!(
						target: "intent_consumer",
						user_id = intent.user_id,
						goods_id = intent.goods_id,
						code = e.code(),
						error = %e,
						"Intent dropped"
					);
				}
			}
		}
	}

	pub async fn shutdown(mut self) {
		info!(target: "intent_consumer", "Shutting down intent consumer");
		self.shutdown.store(true, Ordering::Relaxed);

		if let Some(handle) = self.task_handle.take()
			&& let Err(e) = handle.await
		{
			warn!(target: "intent_consumer", error = ?e, "Intent consumer task panicked");
		}
	}
}

impl PopMode {
	fn backoff(self) -> Duration {
		match self {
			PopMode::Blocking(d) | PopMode::Polling(d) => d,
		}
	}
}

impl Drop for IntentConsumer {
	fn drop(&mut self) {
		self.shutdown.store(true, Ordering::Relaxed);
	}
}
