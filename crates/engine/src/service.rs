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

//! Order lifecycle
//!
//! `Reserved -> Unpaid -> Paid | Closed`
//!
//! - **Reserved**: the stock counter was decremented and an intent queued,
//!   no durable row exists yet.
//! - **Unpaid**: the intent consumer created the Order and OrderInfo rows.
//! - **Paid**: payment was confirmed externally. Terminal.
//! - **Closed**: the payment window elapsed or the owner cancelled. Terminal.
//!
//! A Reserved attempt that never becomes Unpaid is abandoned: its stock unit
//! is handed back and its reservation lock released on every exit path.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, Utc};
use flashsale_sdk::types::{
	Goods, GoodsId, OrderInfo, OrderIntent, OrderStatus, OrderView, SaleStatus, SeckillOutcome,
	SeckillResult, UserId,
};
use moka::sync::Cache;
use rand::Rng;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
	admission::AdmissionController,
	config::EngineConfig,
	durable::{DurableError, GoodsRepository, OrderRepository},
	error::SeckillError,
	expiry::{ExpiryHandler, ExpiryPoller, ExpiryScheduler},
	keys,
	lock::ReservationLockManager,
	queue::{IntentConsumer, IntentProcessor, OrderIntentQueue},
	stock::StockReservation,
	store::CoordinationStore,
};

pub struct SeckillService {
	config: EngineConfig,
	store: Arc<dyn CoordinationStore>,
	goods_repo: Arc<dyn GoodsRepository>,
	orders: Arc<dyn OrderRepository>,
	admission: AdmissionController,
	locks: ReservationLockManager,
	stock: StockReservation,
	intents: Arc<OrderIntentQueue>,
	expiry: Arc<ExpiryScheduler>,
	/// Admission-path goods lookups only; seeding and order creation read
	/// the durable store
	goods_cache: Cache<GoodsId, Goods>,
}

impl SeckillService {
	pub fn new(
		store: Arc<dyn CoordinationStore>,
		goods_repo: Arc<dyn GoodsRepository>,
		orders: Arc<dyn OrderRepository>,
		config: EngineConfig,
	) -> Result<Self, SeckillError> {
		config.validate().map_err(SeckillError::Config)?;
		let admission = AdmissionController::new(store.clone(), &config)?;
		let goods_cache = Cache::builder()
			.max_capacity(config.goods_cache_capacity)
			.time_to_live(config.goods_cache_ttl())
			.build();

		Ok(Self {
			admission,
			locks: ReservationLockManager::new(store.clone(), config.lock_ttl()),
			stock: StockReservation::new(store.clone()),
			intents: Arc::new(OrderIntentQueue::new(store.clone())),
			expiry: Arc::new(ExpiryScheduler::new(store.clone())),
			store,
			goods_repo,
			orders,
			goods_cache,
			config,
		})
	}

	pub fn config(&self) -> &EngineConfig {
		&self.config
	}

	pub fn stock(&self) -> &StockReservation {
		&self.stock
	}

	pub fn locks(&self) -> &ReservationLockManager {
		&self.locks
	}

	pub fn intent_queue(&self) -> Arc<OrderIntentQueue> {
		self.intents.clone()
	}

	pub fn expiry_scheduler(&self) -> Arc<ExpiryScheduler> {
		self.expiry.clone()
	}

	/// Spawn the intent consumers and the expiry poller on the current runtime
	pub fn start_workers(self: &Arc<Self>) -> Workers {
		let consumers = (0..self.config.consumer_workers.max(1))
			.map(|_| IntentConsumer::start(self.intents.clone(), self.clone(), &self.config))
			.collect();
		let poller = ExpiryPoller::start(
			self.expiry.clone(),
			self.clone(),
			self.config.poller_idle(),
			self.config.poller_retry(),
		);
		Workers { consumers, poller }
	}

	/// Seed the stock counter of one good the seller owns
	///
	/// Returns the counter in force afterwards. Activating an already active
	/// good keeps its live counter.
	pub async fn activate_goods(
		&self,
		owner_id: UserId,
		goods_id: GoodsId,
	) -> Result<i64, SeckillError> {
		let goods = self.load_goods(goods_id).await?;
		if goods.owner_id != owner_id {
			return Err(SeckillError::Forbidden(format!(
				"goods {} is not owned by seller {}",
				goods_id, owner_id
			)));
		}
		self.seed_goods(&goods).await
	}

	/// Seed the stock counters of every good a seller owns
	pub async fn activate_owner_goods(&self, owner_id: UserId) -> Result<usize, SeckillError> {
		let goods = self.goods_repo.list_goods_by_owner(owner_id).await?;
		for g in &goods {
			self.seed_goods(g).await?;
		}

		info!(target: "seckill", owner_id = owner_id, count = goods.len(), "Seller goods activated");
		Ok(goods.len())
	}

	async fn seed_goods(&self, goods: &Goods) -> Result<i64, SeckillError> {
		let seeded = self.stock.seed(goods.id, goods.stock).await?;
		self.goods_cache.invalidate(&goods.id);

		if seeded {
			info!(target: "seckill", goods_id = goods.id, stock = goods.stock, "Goods activated");
			return Ok(goods.stock);
		}
		let current = self.stock.current(goods.id).await?.unwrap_or(goods.stock);
		info!(target: "seckill", goods_id = goods.id, counter = current, "Goods already active");
		Ok(current)
	}

	/// Purchase attempt
	///
	/// Returns `Accepted` once the reservation is queued for durable creation;
	/// every rejection is an error whose [`SeckillError::outcome`] names it.
	pub async fn attempt_seckill(
		&self,
		user_id: UserId,
		goods_id: GoodsId,
		client_ip: &str,
	) -> Result<SeckillOutcome, SeckillError> {
		self.admission.admit(client_ip).await?;

		let goods = self.cached_goods(goods_id).await?;
		match goods.sale_status(Utc::now()) {
			SaleStatus::NotStarted => return Err(SeckillError::NotStarted),
			SaleStatus::Ended => return Err(SeckillError::Ended),
			SaleStatus::SoldOut => return Err(SeckillError::SoldOut),
			SaleStatus::OnGoing => {}
		}

		if self.find_order_id(user_id, goods_id).await?.is_some() {
			return Err(SeckillError::AlreadyParticipated);
		}

		let token = Uuid::new_v4().to_string();
		if !self.locks.try_lock(user_id, goods_id, &token).await? {
			debug!(target: "seckill", user_id = user_id, goods_id = goods_id, "Reservation lock held");
			return Err(SeckillError::LockContention);
		}

		// From here on the lock is ours: the consumer releases it on success,
		// every failed exit releases it here
		let intent = OrderIntent { user_id, goods_id };
		if let Err(e) = self.reserve(intent).await {
			self.release_lock(user_id, goods_id).await;
			return Err(e);
		}

		info!(target: "seckill", user_id = user_id, goods_id = goods_id, "Reservation accepted");
		Ok(SeckillOutcome::Accepted)
	}

	async fn reserve(&self, intent: OrderIntent) -> Result<(), SeckillError> {
		// Re-check under the lock: an order may have been indexed since the
		// unlocked check
		if self.find_order_id(intent.user_id, intent.goods_id).await?.is_some() {
			return Err(SeckillError::AlreadyParticipated);
		}

		let remaining = self.stock.decrement(intent.goods_id).await?;
		if remaining < 0 {
			self.return_stock(intent.goods_id).await;
			return Err(SeckillError::SoldOut);
		}

		if let Err(e) = self.intents.enqueue(&intent).await {
			self.return_stock(intent.goods_id).await;
			return Err(e.into());
		}
		Ok(())
	}

	pub async fn get_outcome(
		&self,
		user_id: UserId,
		goods_id: GoodsId,
	) -> Result<SeckillResult, SeckillError> {
		Ok(match self.find_order_id(user_id, goods_id).await? {
			Some(order_id) => SeckillResult::Ordered { order_id },
			None => SeckillResult::Pending,
		})
	}

	/// Consumer side of the intent queue
	///
	/// Creates the durable order, indexes it, schedules its expiry and
	/// releases the reservation lock, in that order. Returns `None` when an
	/// order already exists for the pair.
	pub async fn create_order_from_intent(
		&self,
		intent: OrderIntent,
	) -> Result<Option<String>, SeckillError> {
		let OrderIntent { user_id, goods_id } = intent;

		let created = match self.find_order_id(user_id, goods_id).await {
			Ok(Some(existing)) => {
				debug!(
					target: "seckill",
					user_id = user_id,
					goods_id = goods_id,
					order_id = %existing,
					"Order already indexed, skipping intent"
				);
				Ok(None)
			}
			Ok(None) => self.create_durable_order(intent).await.map(Some),
			Err(e) => Err(e),
		};

		let info = match created {
			Ok(Some(info)) => info,
			Ok(None) => {
				self.abandon_reservation(intent).await;
				return Ok(None);
			}
			// The counter ran ahead of durable stock: the unit never existed,
			// so handing it back would let one more buyer through
			Err(SeckillError::SoldOut) => {
				warn!(
					target: "seckill",
					user_id = user_id,
					goods_id = goods_id,
					"Durable stock exhausted, intent dropped"
				);
				self.release_lock(user_id, goods_id).await;
				return Err(SeckillError::SoldOut);
			}
			Err(e) => {
				self.abandon_reservation(intent).await;
				return Err(e);
			}
		};

		// Durable order exists: the unit is sold, so later failures are
		// logged and never compensated
		let indexed = self
			.store
			.set(&keys::order_id_key(user_id, goods_id), &info.order_id)
			.await;
		if let Err(e) = &indexed {
			error!(target: "seckill", order_id = %info.order_id, error = %e, "Failed to index order");
		}

		let expire_at = info.created_at + self.config.payment_window();
		let scheduled = self.expiry.schedule(&info.order_id, expire_at).await;
		if let Err(e) = &scheduled {
			error!(target: "seckill", order_id = %info.order_id, error = %e, "Failed to schedule order expiry");
		}

		self.release_lock(user_id, goods_id).await;
		indexed?;
		scheduled?;

		info!(
			target: "seckill",
			user_id = user_id,
			goods_id = goods_id,
			order_id = %info.order_id,
			"Order created"
		);
		Ok(Some(info.order_id))
	}

	async fn create_durable_order(&self, intent: OrderIntent) -> Result<OrderInfo, SeckillError> {
		let goods = self.load_goods(intent.goods_id).await?;
		let info = OrderInfo {
			order_id: generate_order_id(),
			user_id: intent.user_id,
			goods_id: goods.id,
			goods_name: goods.name,
			goods_img: goods.img,
			goods_price: goods.price,
			status: OrderStatus::Unpaid,
			created_at: Utc::now(),
		};

		self.orders.create_order(&info).await.map_err(|e| match e {
			DurableError::StockExhausted(_) => SeckillError::SoldOut,
			other => SeckillError::DurableWriteFailed(other.to_string()),
		})?;
		Ok(info)
	}

	/// Close a due order, or drop its expiry entry if it is no longer Unpaid
	pub async fn close_expired(&self, order_id: &str) -> Result<bool, SeckillError> {
		let info = match self.orders.find_order_info(order_id).await {
			Ok(info) => info,
			Err(DurableError::NotFound(_)) => {
				self.expiry.cancel(order_id).await?;
				return Ok(false);
			}
			Err(e) => return Err(e.into()),
		};

		if info.status != OrderStatus::Unpaid {
			self.expiry.cancel(order_id).await?;
			return Ok(false);
		}

		match self.close_order(&info).await {
			Ok(()) => Ok(true),
			// Paid or closed between the read and the close
			Err(SeckillError::OrderStatus(_)) => {
				self.expiry.cancel(order_id).await?;
				Ok(false)
			}
			Err(e) => Err(e),
		}
	}

	/// Owner-initiated close of an Unpaid order
	pub async fn cancel_order(
		&self,
		user_id: UserId,
		order_id: &str,
	) -> Result<OrderInfo, SeckillError> {
		let mut info = self.owned_order(user_id, order_id).await?;
		if info.status != OrderStatus::Unpaid {
			return Err(SeckillError::OrderStatus(order_id.to_string()));
		}

		self.close_order(&info).await?;
		info!(target: "seckill", user_id = user_id, order_id = %order_id, "Order cancelled");

		info.status = OrderStatus::Closed;
		Ok(info)
	}

	/// Record an external payment confirmation
	pub async fn confirm_payment(&self, order_id: &str) -> Result<OrderInfo, SeckillError> {
		let info = self.orders.mark_paid(order_id).await.map_err(|e| match e {
			DurableError::NotFound(_) => SeckillError::OrderNotFound(order_id.to_string()),
			DurableError::StatusConflict(_) => SeckillError::OrderStatus(order_id.to_string()),
			other => SeckillError::Durable(other),
		})?;

		// A leftover entry is discarded by the poller's status check
		if let Err(e) = self.expiry.cancel(order_id).await {
			warn!(target: "seckill", order_id = %order_id, error = %e, "Failed to remove expiry entry");
		}

		info!(target: "seckill", order_id = %order_id, "Order paid");
		Ok(info)
	}

	pub async fn get_order(&self, user_id: UserId, order_id: &str) -> Result<OrderView, SeckillError> {
		let info = self.owned_order(user_id, order_id).await?;

		let remaining_payment_secs = if info.status == OrderStatus::Unpaid {
			let deadline = info.created_at + self.config.payment_window();
			(deadline - Utc::now()).num_seconds().max(0)
		} else {
			0
		};

		Ok(OrderView {
			info,
			remaining_payment_secs,
			payment_window_secs: self.config.payment_window_secs,
		})
	}

	/// Durable close, then cache compensation
	///
	/// Compensation runs only after the durable close succeeded, in a fixed
	/// order, and a failing step is logged without undoing the ones before.
	async fn close_order(&self, info: &OrderInfo) -> Result<(), SeckillError> {
		match self.orders.close_order(info).await {
			Ok(()) => {}
			Err(DurableError::StatusConflict(_)) => {
				return Err(SeckillError::OrderStatus(info.order_id.clone()));
			}
			Err(e) => {
				return Err(SeckillError::OrderCloseFailed(format!("{}: {}", info.order_id, e)));
			}
		}

		if let Err(e) = self.stock.increment(info.goods_id).await {
			error!(
				target: "seckill",
				order_id = %info.order_id,
				goods_id = info.goods_id,
				error = %e,
				"Expiry compensation failed: stock increment"
			);
		}
		if let Err(e) = self
			.store
			.del(&keys::order_id_key(info.user_id, info.goods_id))
			.await
		{
			error!(
				target: "seckill",
				order_id = %info.order_id,
				error = %e,
				"Expiry compensation failed: order index delete"
			);
		}
		if let Err(e) = self.expiry.cancel(&info.order_id).await {
			error!(
				target: "seckill",
				order_id = %info.order_id,
				error = %e,
				"Expiry compensation failed: expiry entry removal"
			);
		}
		Ok(())
	}

	async fn owned_order(&self, user_id: UserId, order_id: &str) -> Result<OrderInfo, SeckillError> {
		match self.orders.find_order_info(order_id).await {
			Ok(info) if info.user_id == user_id => Ok(info),
			Ok(_) | Err(DurableError::NotFound(_)) => {
				Err(SeckillError::OrderNotFound(order_id.to_string()))
			}
			Err(e) => Err(e.into()),
		}
	}

	async fn find_order_id(
		&self,
		user_id: UserId,
		goods_id: GoodsId,
	) -> Result<Option<String>, SeckillError> {
		let order_id = self.store.get(&keys::order_id_key(user_id, goods_id)).await?;
		Ok(order_id.filter(|id| !id.is_empty()))
	}

	async fn cached_goods(&self, goods_id: GoodsId) -> Result<Goods, SeckillError> {
		if let Some(goods) = self.goods_cache.get(&goods_id) {
			return Ok(goods);
		}
		let goods = self.load_goods(goods_id).await?;
		self.goods_cache.insert(goods_id, goods.clone());
		Ok(goods)
	}

	async fn load_goods(&self, goods_id: GoodsId) -> Result<Goods, SeckillError> {
		self.goods_repo
			.find_goods_by_id(goods_id)
			.await
			.map_err(|e| match e {
				DurableError::NotFound(_) => SeckillError::GoodsNotFound(goods_id),
				other => SeckillError::Durable(other),
			})
	}

	async fn abandon_reservation(&self, intent: OrderIntent) {
		self.return_stock(intent.goods_id).await;
		self.release_lock(intent.user_id, intent.goods_id).await;
	}

	async fn return_stock(&self, goods_id: GoodsId) {
		if let Err(e) = self.stock.increment(goods_id).await {
			error!(target: "seckill", goods_id = goods_id, error = %e, "Failed to return stock unit");
		}
	}

	async fn release_lock(&self, user_id: UserId, goods_id: GoodsId) {
		if let Err(e) = self.locks.unlock(user_id, goods_id).await {
			// The lock TTL frees it eventually
			warn!(
				target: "seckill",
				user_id = user_id,
				goods_id = goods_id,
				error = %e,
				"Failed to release reservation lock"
			);
		}
	}
}

#[async_trait]
impl IntentProcessor for SeckillService {
	async fn process_intent(&self, intent: OrderIntent) -> Result<Option<String>, SeckillError> {
		self.create_order_from_intent(intent).await
	}
}

#[async_trait]
impl ExpiryHandler for SeckillService {
	async fn close_expired(&self, order_id: &str) -> Result<bool, SeckillError> {
		SeckillService::close_expired(self, order_id).await
	}
}

/// Background workers of one service instance
pub struct Workers {
	consumers: Vec<IntentConsumer>,
	poller: ExpiryPoller,
}

impl Workers {
	pub async fn shutdown(self) {
		for consumer in self.consumers {
			consumer.shutdown().await;
		}
		self.poller.shutdown().await;
	}
}

/// `YYYYMMDDHHMMSS` on the local clock followed by six random digits
pub fn generate_order_id() -> String {
	let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
	format!("{}{:06}", Local::now().format("%Y%m%d%H%M%S"), suffix)
}
