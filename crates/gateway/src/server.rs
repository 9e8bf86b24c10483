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

use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use anyhow::{Context, Result};
use flashsale_engine::{
	CoordinationStore, MemoryCoordinationStore, MemoryDurableStore, SeckillService,
};
use tracing::info;

use crate::{
	config::{CatalogConfig, GatewayRuntimeConfig, StoreBackend},
	middleware::{CorsMiddleware, LoggingMiddleware},
	routes::configure_routes,
};

/// Shared handler state
#[derive(Clone)]
pub struct GatewayState {
	pub service: Arc<SeckillService>,
	pub trust_forwarded_for: bool,
	pub internal_token: Option<String>,
}

/// Gateway server hosting the seckill service and its background workers
pub struct GatewayServer {
	config: GatewayRuntimeConfig,
	state: GatewayState,
}

impl GatewayServer {
	pub async fn new(config: GatewayRuntimeConfig) -> Result<Self> {
		let store = build_store(&config).await?;

		let catalog = match &config.catalog_file {
			Some(path) => CatalogConfig::from_file(path)
				.with_context(|| format!("Failed to load goods catalog from {}", path))?,
			None => CatalogConfig::default(),
		};
		let durable = Arc::new(MemoryDurableStore::new());
		for goods in &catalog.goods {
			durable.insert_goods(goods.clone())?;
		}

		let service = Arc::new(
			SeckillService::new(store, durable.clone(), durable, config.engine.clone())
				.context("Failed to create seckill service")?,
		);

		if catalog.activate_on_start {
			for goods in &catalog.goods {
				service
					.activate_goods(goods.owner_id, goods.id)
					.await
					.with_context(|| format!("Failed to activate goods {}", goods.id))?;
			}
		}

		info!(
			target: "server",
			store_backend = ?config.store_backend,
			goods = catalog.goods.len(),
			activated = catalog.activate_on_start,
			trust_forwarded_for = config.trust_forwarded_for,
			internal_routes = config.internal_token.is_some(),
			"Gateway state initialized"
		);

		let state = GatewayState {
			service,
			trust_forwarded_for: config.trust_forwarded_for,
			internal_token: config.internal_token.clone(),
		};
		Ok(Self { config, state })
	}

	/// Serve HTTP until the process receives a shutdown signal, then stop
	/// the background workers
	pub async fn serve(self) -> Result<()> {
		let state = web::Data::new(self.state.clone());
		let max_body_bytes = self.config.max_body_bytes;

		let server = HttpServer::new(move || {
			App::new()
				.app_data(state.clone())
				.app_data(web::PayloadConfig::new(max_body_bytes))
				.wrap(LoggingMiddleware)
				.wrap(CorsMiddleware)
				.configure(configure_routes)
		})
		.workers(self.config.workers)
		.bind(self.config.bind_addr)
		.with_context(|| format!("Failed to bind {}", self.config.bind_addr))?
		.run();

		let workers = self.state.service.start_workers();
		info!(
			target: "server",
			addr = %self.config.bind_addr,
			http_workers = self.config.workers,
			"Gateway listening"
		);

		let result = server.await;

		info!(target: "server", "HTTP server stopped, draining background workers");
		workers.shutdown().await;

		result.context("HTTP server failed")
	}
}

async fn build_store(config: &GatewayRuntimeConfig) -> Result<Arc<dyn CoordinationStore>> {
	match config.store_backend {
		StoreBackend::Memory => Ok(Arc::new(MemoryCoordinationStore::new())),
		#[cfg(feature = "redis")]
		StoreBackend::Redis => {
			let store = flashsale_engine::RedisCoordinationStore::new(&config.redis_url)
				.await
				.with_context(|| format!("Failed to connect to {}", config.redis_url))?;
			Ok(Arc::new(store))
		}
		#[cfg(not(feature = "redis"))]
		StoreBackend::Redis => {
			anyhow::bail!("Redis backend requested but the gateway was built without the `redis` feature")
		}
	}
}
