// Copyright 2025 chenjjiaa
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

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default payment window of a new order (can be overridden by SECKILL_PAYMENT_WINDOW_SECS)
pub const DEFAULT_PAYMENT_WINDOW_SECS: i64 = 900;

/// Default TTL of a reservation lock, the failsafe for a crashed holder
pub const DEFAULT_LOCK_TTL_SECS: u64 = 60;

/// Default system-wide token refill rate (tokens per second)
pub const DEFAULT_SYSTEM_RATE_PER_SEC: u32 = 1_000;

/// Default system-wide token bucket capacity
pub const DEFAULT_SYSTEM_BURST: u32 = 1_000;

/// Default per-client fixed window length
pub const DEFAULT_CLIENT_WINDOW_SECS: u64 = 10;

/// Default number of requests a client may make inside one window
pub const DEFAULT_CLIENT_MAX_REQUESTS: i64 = 20;

/// Default number of intent consumer workers
pub const DEFAULT_CONSUMER_WORKERS: usize = 1;

/// Default sleep of the intent consumer when the queue is empty
pub const DEFAULT_CONSUMER_IDLE_MS: u64 = 500;

/// Default wait of a blocking intent pop before re-checking shutdown
pub const DEFAULT_CONSUMER_BLOCK_MS: u64 = 1_000;

/// Default sleep of the expiry poller when nothing is due
pub const DEFAULT_POLLER_IDLE_MS: u64 = 100;

/// Default delay before a failed close of an expired order is retried
pub const DEFAULT_POLLER_RETRY_MS: u64 = 5_000;

/// Default TTL of the admission-path goods cache
pub const DEFAULT_GOODS_CACHE_TTL_SECS: u64 = 5;

/// Default maximum number of goods held by the goods cache
pub const DEFAULT_GOODS_CACHE_CAPACITY: u64 = 10_000;

/// Seckill pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
	/// Seconds an order may stay unpaid before the expiry poller closes it
	pub payment_window_secs: i64,
	pub lock_ttl_secs: u64,
	/// Token bucket refill rate R
	pub system_rate_per_sec: u32,
	/// Token bucket capacity C
	pub system_burst: u32,
	pub client_window_secs: u64,
	pub client_max_requests: i64,
	/// Use the store's blocking pop instead of sleep-and-retry
	pub consumer_blocking_pop: bool,
	pub consumer_workers: usize,
	pub consumer_idle_ms: u64,
	pub consumer_block_ms: u64,
	pub poller_idle_ms: u64,
	/// A failed close is pushed back by this much so later entries still expire
	pub poller_retry_ms: u64,
	pub goods_cache_ttl_secs: u64,
	pub goods_cache_capacity: u64,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			payment_window_secs: DEFAULT_PAYMENT_WINDOW_SECS,
			lock_ttl_secs: DEFAULT_LOCK_TTL_SECS,
			system_rate_per_sec: DEFAULT_SYSTEM_RATE_PER_SEC,
			system_burst: DEFAULT_SYSTEM_BURST,
			client_window_secs: DEFAULT_CLIENT_WINDOW_SECS,
			client_max_requests: DEFAULT_CLIENT_MAX_REQUESTS,
			consumer_blocking_pop: true,
			consumer_workers: DEFAULT_CONSUMER_WORKERS,
			consumer_idle_ms: DEFAULT_CONSUMER_IDLE_MS,
			consumer_block_ms: DEFAULT_CONSUMER_BLOCK_MS,
			poller_idle_ms: DEFAULT_POLLER_IDLE_MS,
			poller_retry_ms: DEFAULT_POLLER_RETRY_MS,
			goods_cache_ttl_secs: DEFAULT_GOODS_CACHE_TTL_SECS,
			goods_cache_capacity: DEFAULT_GOODS_CACHE_CAPACITY,
		}
	}
}

impl EngineConfig {
	/// Load configuration from `SECKILL_*` environment variables
	pub fn from_env() -> Result<Self, config::ConfigError> {
		let cfg = config::Config::builder()
			.add_source(config::Environment::with_prefix("SECKILL"))
			.build()?;

		cfg.try_deserialize()
	}

	/// Load configuration from file, with environment overrides
	pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
		let cfg = config::Config::builder()
			.add_source(config::File::with_name(path))
			.add_source(config::Environment::with_prefix("SECKILL"))
			.build()?;

		cfg.try_deserialize()
	}

	/// Reject values the pipeline cannot run with
	pub fn validate(&self) -> Result<(), String> {
		if self.payment_window_secs <= 0 {
			return Err(format!(
				"payment_window_secs must be positive, got {}",
				self.payment_window_secs
			));
		}
		if self.lock_ttl_secs == 0 {
			return Err("lock_ttl_secs must be positive".to_string());
		}
		if self.consumer_blocking_pop && self.consumer_block_ms == 0 {
			// BRPOP with a zero timeout waits forever
			return Err("consumer_block_ms must be positive with blocking pop".to_string());
		}
		if self.poller_retry_ms == 0 {
			return Err("poller_retry_ms must be positive".to_string());
		}
		Ok(())
	}

	pub fn payment_window(&self) -> chrono::Duration {
		chrono::Duration::seconds(self.payment_window_secs)
	}

	pub fn lock_ttl(&self) -> Duration {
		Duration::from_secs(self.lock_ttl_secs)
	}

	pub fn client_window(&self) -> Duration {
		Duration::from_secs(self.client_window_secs)
	}

	pub fn consumer_idle(&self) -> Duration {
		Duration::from_millis(self.consumer_idle_ms)
	}

	pub fn consumer_block(&self) -> Duration {
		Duration::from_millis(self.consumer_block_ms)
	}

	pub fn poller_idle(&self) -> Duration {
		Duration::from_millis(self.poller_idle_ms)
	}

	pub fn poller_retry(&self) -> Duration {
		Duration::from_millis(self.poller_retry_ms)
	}

	pub fn goods_cache_ttl(&self) -> Duration {
		Duration::from_secs(self.goods_cache_ttl_secs)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_config_is_valid() {
		assert!(EngineConfig::default().validate().is_ok());
	}

	#[test]
	fn test_rejects_unusable_windows() {
		let negative_window = EngineConfig {
			payment_window_secs: -5,
			..EngineConfig::default()
		};
		assert!(negative_window.validate().is_err());

		let zero_lock_ttl = EngineConfig {
			lock_ttl_secs: 0,
			..EngineConfig::default()
		};
		assert!(zero_lock_ttl.validate().is_err());

		let forever_pop = EngineConfig {
			consumer_blocking_pop: true,
			consumer_block_ms: 0,
			..EngineConfig::default()
		};
		assert!(forever_pop.validate().is_err());

		let polling = EngineConfig {
			consumer_blocking_pop: false,
			consumer_block_ms: 0,
			..EngineConfig::default()
		};
		assert!(polling.validate().is_ok());
	}
}
