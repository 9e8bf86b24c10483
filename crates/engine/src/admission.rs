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

//! Admission control for purchase attempts
//!
//! Two independent layers, checked in this order:
//! - **System-wide**: a process-local token bucket with capacity C and
//!   refill rate R tokens/second. A denied request is rejected immediately;
//!   nothing blocks or queues.
//! - **Per-client**: a fixed-window counter per client IP held in the
//!   shared coordination store. The window resets through the key's TTL,
//!   never through this controller.
//!
//! Neither layer retries. A deny is surfaced to the caller as a rate-limit
//! rejection.

use std::{num::NonZeroU32, sync::Arc, time::Duration};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
	config::EngineConfig,
	keys,
	store::{CoordinationStore, StoreError},
};

#[derive(Debug, Error)]
pub enum AdmissionError {
	#[error("System busy")]
	SystemBusy,
	#[error("Too many requests from client")]
	TooManyRequests,
	#[error("Invalid admission config: {0}")]
	InvalidConfig(&'static str),
	#[error(transparent)]
	Store(#[from] StoreError),
}

/// System-wide token bucket
///
/// Backed by a GCRA limiter, which admits exactly the same request pattern
/// as a bucket that holds at most `capacity` tokens and earns one token
/// every `1/rate` seconds.
pub struct TokenBucket {
	limiter: DefaultDirectRateLimiter,
}

impl TokenBucket {
	pub fn new(capacity: u32, rate_per_sec: u32) -> Result<Self, AdmissionError> {
		let capacity = NonZeroU32::new(capacity)
			.ok_or(AdmissionError::InvalidConfig("token bucket capacity must be > 0"))?;
		let rate = NonZeroU32::new(rate_per_sec)
			.ok_or(AdmissionError::InvalidConfig("token bucket rate must be > 0"))?;

		let quota = Quota::per_second(rate).allow_burst(capacity);
		Ok(Self {
			limiter: RateLimiter::direct(quota),
		})
	}

	/// Consume one token if one is available
	pub fn try_acquire(&self) -> bool {
		self.limiter.check().is_ok()
	}
}

/// Per-client fixed-window limiter over the shared store
pub struct ClientRateLimiter {
	store: Arc<dyn CoordinationStore>,
	window: Duration,
	max_requests: i64,
}

impl ClientRateLimiter {
	pub fn new(store: Arc<dyn CoordinationStore>, window: Duration, max_requests: i64) -> Self {
		Self {
			store,
			window,
			max_requests,
		}
	}

	/// Count this request against the client's window
	pub async fn check(&self, client_ip: &str) -> Result<(), AdmissionError> {
		let key = keys::rate_limit_key(client_ip);
		let count = self.store.incr_window(&key, self.window).await?;
		if count > self.max_requests {
			debug!(
				target: "seckill::admission",
				client_ip = client_ip,
				count = count,
				max_requests = self.max_requests,
				"Client over its request window"
			);
			return Err(AdmissionError::TooManyRequests);
		}
		Ok(())
	}
}

pub struct AdmissionController {
	system: TokenBucket,
	client: ClientRateLimiter,
}

impl AdmissionController {
	pub fn new(store: Arc<dyn CoordinationStore>, config: &EngineConfig) -> Result<Self, AdmissionError> {
		Ok(Self {
			system: TokenBucket::new(config.system_burst, config.system_rate_per_sec)?,
			client: ClientRateLimiter::new(
				store,
				config.client_window(),
				config.client_max_requests,
			),
		})
	}

	/// Admit one request from `client_ip`, or reject it
	pub async fn admit(&self, client_ip: &str) -> Result<(), AdmissionError> {
		if !self.system.try_acquire() {
			warn!(target: "seckill::admission", client_ip = client_ip, "System token bucket empty");
			return Err(AdmissionError::SystemBusy);
		}
		self.client.check(client_ip).await
	}
}
