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

//! Flashsale Gateway Service
//!
//! HTTP front of the seckill pipeline. It hosts the engine in-process: the
//! request handlers run the admission path, while the intent consumer and
//! the expiry poller run as background tasks on the same runtime.
//!
//! # Identity Model
//!
//! The gateway does not authenticate users. It trusts the `X-User-Id`
//! header set by the authentication layer in front of it, and rate limits
//! per client IP.

mod config;
mod handlers;
mod logging;
mod middleware;
mod otel;
mod routes;
mod server;

use anyhow::{Context, Result};
use tracing::info;

use crate::{config::GatewayRuntimeConfig, logging::init_logging, server::GatewayServer};

#[actix_rt::main]
async fn main() -> Result<()> {
	// Initialize logging first
	init_logging()?;

	let config = GatewayRuntimeConfig::from_env()?;
	info!(target: "server", "Starting Flashsale Gateway on {}", config.bind_addr);

	let server = GatewayServer::new(config)
		.await
		.context("Failed to create gateway server")?;

	server.serve().await.context("Gateway server failed")?;

	info!(target: "server", "Gateway stopped");
	Ok(())
}
