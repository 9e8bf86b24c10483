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

use std::{env, net::SocketAddr, str::FromStr};

use anyhow::{Context, Result, bail};
use flashsale_engine::EngineConfig;
use flashsale_sdk::types::Goods;
use serde::{Deserialize, Serialize};

// Logging configuration constants
/// Default log level (can be overridden by RUST_LOG environment variable)
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default log directory component name
pub const LOG_COMPONENT_NAME: &str = "gateway";

/// Default console output enabled (can be overridden by LOG_TO_CONSOLE environment variable)
pub const DEFAULT_LOG_TO_CONSOLE: bool = false;

// Server configuration constants
/// Default HTTP server bind address (can be overridden by GATEWAY_BIND_ADDR environment variable)
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Default maximum HTTP request body size in bytes (can be overridden by GATEWAY_MAX_BODY_BYTES)
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024;

/// Default coordination store backend (can be overridden by GATEWAY_STORE_BACKEND)
pub const DEFAULT_STORE_BACKEND: &str = "memory";

/// Default Redis URL when the redis backend is selected (can be overridden by GATEWAY_REDIS_URL)
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default trust of `X-Forwarded-For` (can be overridden by GATEWAY_TRUST_FORWARDED_FOR)
///
/// Enable only when the gateway sits behind a proxy that overwrites the header.
pub const DEFAULT_TRUST_FORWARDED_FOR: bool = false;

/// Where transient coordination state lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
	Memory,
	Redis,
}

impl FromStr for StoreBackend {
	type Err = anyhow::Error;

	fn from_str(s: &str) -> Result<Self> {
		match s.to_ascii_lowercase().as_str() {
			"memory" => Ok(StoreBackend::Memory),
			"redis" => Ok(StoreBackend::Redis),
			other => bail!("Unknown store backend: {}", other),
		}
	}
}

#[derive(Debug, Clone)]
pub struct GatewayRuntimeConfig {
	pub bind_addr: SocketAddr,
	pub workers: usize,
	pub max_body_bytes: usize,
	pub store_backend: StoreBackend,
	pub redis_url: String,
	/// Optional goods catalog file loaded into the durable store at startup
	pub catalog_file: Option<String>,
	/// Take the client address for rate limiting from `X-Forwarded-For`
	pub trust_forwarded_for: bool,
	/// Shared secret of internal callbacks; internal routes are disabled
	/// while unset
	pub internal_token: Option<String>,
	pub engine: EngineConfig,
}

impl GatewayRuntimeConfig {
	pub fn from_env() -> Result<Self> {
		dotenv::dotenv().ok();

		let bind_addr_str =
			env::var("GATEWAY_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
		let bind_addr = bind_addr_str
			.parse()
			.with_context(|| format!("Invalid bind address: {}", bind_addr_str))?;

		let workers = env::var("GATEWAY_WORKERS")
			.ok()
			.and_then(|w| w.parse().ok())
			.unwrap_or_else(num_cpus::get);

		let max_body_bytes = env::var("GATEWAY_MAX_BODY_BYTES")
			.ok()
			.and_then(|v| v.parse().ok())
			.unwrap_or(DEFAULT_MAX_BODY_BYTES);

		let store_backend = env::var("GATEWAY_STORE_BACKEND")
			.unwrap_or_else(|_| DEFAULT_STORE_BACKEND.to_string())
			.parse()?;

		let redis_url =
			env::var("GATEWAY_REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());

		let catalog_file = env::var("GATEWAY_CATALOG_FILE").ok();

		let trust_forwarded_for = env::var("GATEWAY_TRUST_FORWARDED_FOR")
			.ok()
			.and_then(|v| v.parse().ok())
			.unwrap_or(DEFAULT_TRUST_FORWARDED_FOR);

		let internal_token = env::var("GATEWAY_INTERNAL_TOKEN")
			.ok()
			.filter(|token| !token.trim().is_empty());

		let engine = match env::var("SECKILL_CONFIG_FILE") {
			Ok(path) => EngineConfig::from_file(&path)
				.with_context(|| format!("Failed to load engine config from {}", path))?,
			Err(_) => EngineConfig::from_env().context("Failed to load engine config")?,
		};

		Ok(Self {
			bind_addr,
			workers,
			max_body_bytes,
			store_backend,
			redis_url,
			catalog_file,
			trust_forwarded_for,
			internal_token,
			engine,
		})
	}
}

/// Goods catalog seeded into the in-memory durable store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
	#[serde(default)]
	pub goods: Vec<Goods>,
	/// Seed stock counters for every good right after loading
	#[serde(default)]
	pub activate_on_start: bool,
}

impl CatalogConfig {
	/// Load a catalog from file (any format the `config` crate understands)
	pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
		let cfg = config::Config::builder()
			.add_source(config::File::with_name(path))
			.build()?;

		cfg.try_deserialize()
	}
}
