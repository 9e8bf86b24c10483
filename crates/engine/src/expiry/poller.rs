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
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::ExpiryScheduler;
use crate::error::SeckillError;

/// Closes one order whose payment deadline has passed
///
/// Must remove the order's expiry entry on every non-error return. Returns
/// true if the order was closed, false if the entry was stale (order paid,
/// already closed or gone). On error the entry is kept and retried on a
/// later poll.
#[async_trait]
pub trait ExpiryHandler: Send + Sync {
	async fn close_expired(&self, order_id: &str) -> Result<bool, SeckillError>;
}

/// Background worker reclaiming unpaid orders
///
/// An entry whose close fails is re-scored `retry` into the future, so one
/// order that cannot be closed never holds up the entries due behind it.
pub struct ExpiryPoller {
	task_handle: Option<JoinHandle<()>>,
	shutdown: Arc<AtomicBool>,
}

impl ExpiryPoller {
	pub fn start(
		scheduler: Arc<ExpiryScheduler>,
		handler: Arc<dyn ExpiryHandler>,
		idle: Duration,
		retry: Duration,
	) -> Self {
		let shutdown = Arc::new(AtomicBool::new(false));
		let shutdown_clone = shutdown.clone();

		let task_handle = tokio::spawn(async move {
			info!(
				target: "expiry_poller",
				idle_ms = idle.as_millis() as u64,
				retry_ms = retry.as_millis() as u64,
				"Expiry poller started"
			);
			Self::run_poll_loop(&scheduler, handler.as_ref(), idle, retry, &shutdown_clone).await;
			info!(target: "expiry_poller", "Expiry poller stopped");
		});

		Self {
			task_handle: Some(task_handle),
			shutdown,
		}
	}

	async fn run_poll_loop(
		scheduler: &ExpiryScheduler,
		handler: &dyn ExpiryHandler,
		idle: Duration,
		retry: Duration,
		shutdown: &AtomicBool,
	) {
		loop {
			if shutdown.load(Ordering::Relaxed) {
				break;
			}

			let order_id = match scheduler.next_due(Utc::now()).await {
				Ok(Some(order_id)) => order_id,
				Ok(None) => {
					tokio::time::sleep(idle).await;
					continue;
				}
				Err(e) => {
					error!(target: "expiry_poller", error = %e, "Failed to query due orders");
					tokio::time::sleep(idle).await;
					continue;
				}
			};

			match handler.close_expired(&order_id).await {
				Ok(true) => {
					info!(target: "expiry_poller", order_id = %order_id, "Unpaid order closed");
				}
				Ok(false) => {
					debug!(target: "expiry_poller", order_id = %order_id, "Stale expiry entry removed");
				}
				Err(e) => {
					error!(
						target: "expiry_poller",
						order_id = %order_id,
						code = e.code(),
						error = %e,
						"Failed to close expired order"
					);
					let retry_at = Utc::now() + chrono::Duration::milliseconds(retry.as_millis() as i64);
					if let Err(e) = scheduler.schedule(&order_id, retry_at).await {
						// Entry is still due; back off so it is not retried in a hot loop
						error!(target: "expiry_poller", order_id = %order_id, error = %e, "Failed to defer expiry entry");
						tokio::time::sleep(idle).await;
					}
				}
			}
		}
	}

	pub async fn shutdown(mut self) {
		info!(target: "expiry_poller", "Shutting down expiry poller");
		self.shutdown.store(true, Ordering::Relaxed);

		if let Some(handle) = self.task_handle.take()
			&& let Err(e) = handle.await
		{
			warn!(target: "expiry_poller", error = ?e, "Expiry poller task panicked");
		}
	}
}

impl Drop for ExpiryPoller {
	fn drop(&mut self) {
		self.shutdown.store(true, Ordering::Relaxed);
	}
}
