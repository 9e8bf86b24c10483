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

//! Integration tests for the seckill pipeline
//!
//! These tests verify:
//! - No oversell under concurrent attempts
//! - No duplicate purchase per (user, goods)
//! - System token bucket bound
//! - Expiry of unpaid orders and its compensation
//! - Compensation on every failed reservation path
//! - Expiry keeps going when single closes or compensations fail

use std::{
	sync::{
		Arc, Mutex,
		atomic::{AtomicBool, Ordering},
	},
	time::Duration,
};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use flashsale_engine::{
	CoordinationStore, DurableError, EngineConfig, GoodsRepository, MemoryCoordinationStore,
	MemoryDurableStore, OrderRepository, SeckillError, SeckillService, StoreError, keys,
};
use flashsale_sdk::types::{
	Goods, GoodsId, OrderInfo, OrderIntent, OrderStatus, SeckillOutcome, SeckillResult,
};

const GOODS_ID: GoodsId = 1;
const SELLER_ID: u64 = 42;

fn on_sale(id: GoodsId, stock: i64) -> Goods {
	let now = Utc::now();
	Goods {
		id,
		name: "limited sneaker".to_string(),
		img: "https://img.example/sneaker.png".to_string(),
		origin_price: 999.0,
		price: 99.0,
		amount: stock,
		stock,
		start_time: now - ChronoDuration::hours(1),
		end_time: now + ChronoDuration::hours(1),
		owner_id: SELLER_ID,
	}
}

fn test_config() -> EngineConfig {
	EngineConfig {
		client_max_requests: 1_000_000,
		system_burst: 100_000,
		system_rate_per_sec: 100_000,
		consumer_block_ms: 50,
		consumer_idle_ms: 10,
		poller_idle_ms: 50,
		..EngineConfig::default()
	}
}

struct Harness {
	store: Arc<MemoryCoordinationStore>,
	durable: Arc<MemoryDurableStore>,
	service: Arc<SeckillService>,
}

fn harness(stock: i64, config: EngineConfig) -> Harness {
	let store = Arc::new(MemoryCoordinationStore::new());
	let durable = Arc::new(MemoryDurableStore::new());
	durable.insert_goods(on_sale(GOODS_ID, stock)).unwrap();
	let service = Arc::new(
		SeckillService::new(store.clone(), durable.clone(), durable.clone(), config).unwrap(),
	);
	Harness {
		store,
		durable,
		service,
	}
}

fn outcome_of(result: Result<SeckillOutcome, SeckillError>) -> SeckillOutcome {
	match result {
		Ok(outcome) => outcome,
		Err(e) => e
			.outcome()
			.unwrap_or_else(|| panic!("unexpected internal error: {}", e)),
	}
}

/// Wait until the intent queue is empty and no reservation lock is held
async fn wait_until_drained(h: &Harness, users: impl Iterator<Item = u64> + Clone) {
	for _ in 0..200 {
		let mut locked = false;
		for user_id in users.clone() {
			if h.service.locks().is_locked(user_id, GOODS_ID).await.unwrap() {
				locked = true;
				break;
			}
		}
		if !locked && h.store.list_len(keys::ORDER_INTENT_QUEUE).unwrap() == 0 {
			return;
		}
		tokio::time::sleep(Duration::from_millis(20)).await;
	}
	panic!("intent queue was not drained in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_oversell_under_concurrent_attempts() {
	const STOCK: i64 = 10;
	const USERS: u64 = 200;

	let h = harness(STOCK, test_config());
	h.service.activate_goods(SELLER_ID, GOODS_ID).await.unwrap();
	let workers = h.service.start_workers();

	let mut handles = Vec::new();
	for user_id in 1..=USERS {
		let service = h.service.clone();
		handles.push(tokio::spawn(async move {
			outcome_of(
				service
					.attempt_seckill(user_id, GOODS_ID, &format!("10.0.{}.{}", user_id / 256, user_id % 256))
					.await,
			)
		}));
	}

	let mut accepted = 0;
	for handle in handles {
		match handle.await.unwrap() {
			SeckillOutcome::Accepted => accepted += 1,
			SeckillOutcome::SoldOut => {}
			other => panic!("unexpected outcome {:?}", other),
		}
	}
	assert_eq!(accepted, STOCK);

	wait_until_drained(&h, 1..=USERS).await;
	workers.shutdown().await;

	assert_eq!(h.durable.live_order_count(GOODS_ID).unwrap(), STOCK as usize);
	assert_eq!(h.durable.find_goods_by_id(GOODS_ID).await.unwrap().stock, 0);
	assert_eq!(h.service.stock().current(GOODS_ID).await.unwrap(), Some(0));
	assert_eq!(h.store.zcard(keys::ORDER_EXPIRY_SET).unwrap(), STOCK as usize);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_duplicate_purchase() {
	let h = harness(100, test_config());
	h.service.activate_goods(SELLER_ID, GOODS_ID).await.unwrap();
	let workers = h.service.start_workers();

	let mut handles = Vec::new();
	for _ in 0..20 {
		let service = h.service.clone();
		handles.push(tokio::spawn(async move {
			outcome_of(service.attempt_seckill(7, GOODS_ID, "10.0.0.7").await)
		}));
	}

	let mut accepted = 0;
	for handle in handles {
		match handle.await.unwrap() {
			SeckillOutcome::Accepted => accepted += 1,
			SeckillOutcome::LockContention | SeckillOutcome::AlreadyParticipated => {}
			other => panic!("unexpected outcome {:?}", other),
		}
	}
	assert_eq!(accepted, 1);

	wait_until_drained(&h, 7..=7).await;

	// Once indexed, every further attempt is a repeat
	for _ in 0..5 {
		assert_eq!(
			outcome_of(h.service.attempt_seckill(7, GOODS_ID, "10.0.0.7").await),
			SeckillOutcome::AlreadyParticipated
		);
	}
	workers.shutdown().await;

	assert_eq!(h.durable.order_info_count(GOODS_ID).unwrap(), 1);
	assert!(matches!(
		h.service.get_outcome(7, GOODS_ID).await.unwrap(),
		SeckillResult::Ordered { .. }
	));
	assert_eq!(h.service.stock().current(GOODS_ID).await.unwrap(), Some(99));
}

#[tokio::test]
async fn test_token_bucket_bound_on_attempts() {
	let h = harness(
		100,
		EngineConfig {
			system_burst: 5,
			system_rate_per_sec: 1,
			..test_config()
		},
	);
	h.service.activate_goods(SELLER_ID, GOODS_ID).await.unwrap();

	for user_id in 1..=5 {
		assert_eq!(
			outcome_of(h.service.attempt_seckill(user_id, GOODS_ID, "10.0.0.1").await),
			SeckillOutcome::Accepted
		);
	}
	assert_eq!(
		outcome_of(h.service.attempt_seckill(6, GOODS_ID, "10.0.0.1").await),
		SeckillOutcome::RateLimited
	);

	tokio::time::sleep(Duration::from_millis(1_050)).await;
	assert_eq!(
		outcome_of(h.service.attempt_seckill(7, GOODS_ID, "10.0.0.1").await),
		SeckillOutcome::Accepted
	);
	assert_eq!(
		outcome_of(h.service.attempt_seckill(8, GOODS_ID, "10.0.0.1").await),
		SeckillOutcome::RateLimited
	);
}

#[tokio::test]
async fn test_client_window_limits_one_ip_only() {
	let h = harness(
		100,
		EngineConfig {
			client_max_requests: 2,
			..test_config()
		},
	);
	h.service.activate_goods(SELLER_ID, GOODS_ID).await.unwrap();

	outcome_of(h.service.attempt_seckill(1, GOODS_ID, "10.0.0.1").await);
	outcome_of(h.service.attempt_seckill(2, GOODS_ID, "10.0.0.1").await);
	assert_eq!(
		outcome_of(h.service.attempt_seckill(3, GOODS_ID, "10.0.0.1").await),
		SeckillOutcome::RateLimited
	);
	assert_eq!(
		outcome_of(h.service.attempt_seckill(3, GOODS_ID, "10.0.0.2").await),
		SeckillOutcome::Accepted
	);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_expiry_closes_stale_orders() {
	let h = harness(
		5,
		EngineConfig {
			payment_window_secs: 1,
			..test_config()
		},
	);
	h.service.activate_goods(SELLER_ID, GOODS_ID).await.unwrap();
	let workers = h.service.start_workers();

	assert_eq!(
		outcome_of(h.service.attempt_seckill(9, GOODS_ID, "10.0.0.9").await),
		SeckillOutcome::Accepted
	);
	wait_until_drained(&h, 9..=9).await;

	let order_id = match h.service.get_outcome(9, GOODS_ID).await.unwrap() {
		SeckillResult::Ordered { order_id } => order_id,
		SeckillResult::Pending => panic!("order was not created"),
	};
	assert_eq!(h.durable.find_goods_by_id(GOODS_ID).await.unwrap().stock, 4);

	// One second window plus a few poll cycles
	tokio::time::sleep(Duration::from_millis(1_500)).await;
	workers.shutdown().await;

	let info = h.durable.find_order_info(&order_id).await.unwrap();
	assert_eq!(info.status, OrderStatus::Closed);
	assert_eq!(h.durable.find_goods_by_id(GOODS_ID).await.unwrap().stock, 5);
	assert_eq!(h.durable.live_order_count(GOODS_ID).unwrap(), 0);
	assert_eq!(h.service.get_outcome(9, GOODS_ID).await.unwrap(), SeckillResult::Pending);
	assert_eq!(h.store.zcard(keys::ORDER_EXPIRY_SET).unwrap(), 0);
	assert_eq!(h.service.stock().current(GOODS_ID).await.unwrap(), Some(5));
}

async fn create_order(h: &Harness, user_id: u64) -> String {
	outcome_of(
		h.service
			.attempt_seckill(user_id, GOODS_ID, "10.0.0.1")
			.await,
	);
	let intent = h
		.service
		.intent_queue()
		.try_dequeue()
		.await
		.unwrap()
		.unwrap();
	h.service
		.create_order_from_intent(intent)
		.await
		.unwrap()
		.unwrap()
}

#[tokio::test]
async fn test_repoll_of_closed_or_paid_order_is_idempotent() {
	let h = harness(5, test_config());
	h.service.activate_goods(SELLER_ID, GOODS_ID).await.unwrap();

	let closed = create_order(&h, 1).await;
	let paid = create_order(&h, 2).await;
	h.service.cancel_order(1, &closed).await.unwrap();
	h.service.confirm_payment(&paid).await.unwrap();

	let durable_stock = h.durable.find_goods_by_id(GOODS_ID).await.unwrap().stock;
	let counter = h.service.stock().current(GOODS_ID).await.unwrap();

	// Leave stale entries behind for both, already due
	let scheduler = h.service.expiry_scheduler();
	let past = Utc::now() - ChronoDuration::seconds(5);
	scheduler.schedule(&closed, past).await.unwrap();
	scheduler.schedule(&paid, past).await.unwrap();
	assert_eq!(h.store.zcard(keys::ORDER_EXPIRY_SET).unwrap(), 2);

	for _ in 0..2 {
		assert!(!h.service.close_expired(&closed).await.unwrap());
		assert!(!h.service.close_expired(&paid).await.unwrap());
	}

	assert_eq!(h.store.zcard(keys::ORDER_EXPIRY_SET).unwrap(), 0);
	assert_eq!(
		h.durable.find_goods_by_id(GOODS_ID).await.unwrap().stock,
		durable_stock
	);
	assert_eq!(h.service.stock().current(GOODS_ID).await.unwrap(), counter);
	assert_eq!(
		h.durable.find_order_info(&paid).await.unwrap().status,
		OrderStatus::Paid
	);
}

#[tokio::test]
async fn test_expiry_entry_for_missing_order_is_dropped() {
	let h = harness(5, test_config());
	h.service
		.expiry_scheduler()
		.schedule("20250101000000123456", Utc::now())
		.await
		.unwrap();

	assert!(!h.service.close_expired("20250101000000123456").await.unwrap());
	assert_eq!(h.store.zcard(keys::ORDER_EXPIRY_SET).unwrap(), 0);
}

#[tokio::test]
async fn test_sold_out_creates_nothing() {
	let h = harness(1, test_config());
	h.service.activate_goods(SELLER_ID, GOODS_ID).await.unwrap();

	assert_eq!(
		outcome_of(h.service.attempt_seckill(1, GOODS_ID, "10.0.0.1").await),
		SeckillOutcome::Accepted
	);
	assert_eq!(
		outcome_of(h.service.attempt_seckill(2, GOODS_ID, "10.0.0.2").await),
		SeckillOutcome::SoldOut
	);

	// Only the winner's intent was queued
	assert_eq!(h.store.list_len(keys::ORDER_INTENT_QUEUE).unwrap(), 1);
	let intent = h.service.intent_queue().try_dequeue().await.unwrap().unwrap();
	assert_eq!(intent.user_id, 1);
	h.service.create_order_from_intent(intent).await.unwrap();

	assert_eq!(h.durable.order_info_count(GOODS_ID).unwrap(), 1);
	assert_eq!(h.store.zcard(keys::ORDER_EXPIRY_SET).unwrap(), 1);
	assert_eq!(h.service.get_outcome(2, GOODS_ID).await.unwrap(), SeckillResult::Pending);
	assert!(!h.service.locks().is_locked(2, GOODS_ID).await.unwrap());
	// The sold-out decrement was handed back at once
	assert_eq!(h.service.stock().current(GOODS_ID).await.unwrap(), Some(0));
}

/// Order store whose writes always fail
struct FailingOrders {
	inner: Arc<MemoryDurableStore>,
}

#[async_trait]
impl OrderRepository for FailingOrders {
	async fn create_order(&self, _info: &OrderInfo) -> Result<(), DurableError> {
		Err(DurableError::Storage("connection reset".to_string()))
	}

	async fn close_order(&self, info: &OrderInfo) -> Result<(), DurableError> {
		self.inner.close_order(info).await
	}

	async fn find_order_info(&self, order_id: &str) -> Result<OrderInfo, DurableError> {
		self.inner.find_order_info(order_id).await
	}

	async fn mark_paid(&self, order_id: &str) -> Result<OrderInfo, DurableError> {
		self.inner.mark_paid(order_id).await
	}
}

// Abandoned reservations hand their unit back: a failed durable write
// increments the counter and releases the lock instead of shrinking stock
#[tokio::test]
async fn test_durable_failure_compensates_reservation() {
	let store = Arc::new(MemoryCoordinationStore::new());
	let durable = Arc::new(MemoryDurableStore::new());
	durable.insert_goods(on_sale(GOODS_ID, 3)).unwrap();
	let orders = Arc::new(FailingOrders {
		inner: durable.clone(),
	});
	let service =
		SeckillService::new(store.clone(), durable.clone(), orders, test_config()).unwrap();
	service.activate_goods(SELLER_ID, GOODS_ID).await.unwrap();

	service.attempt_seckill(1, GOODS_ID, "10.0.0.1").await.unwrap();
	assert_eq!(service.stock().current(GOODS_ID).await.unwrap(), Some(2));

	let intent = service.intent_queue().try_dequeue().await.unwrap().unwrap();
	let err = service.create_order_from_intent(intent).await.unwrap_err();
	assert!(matches!(err, SeckillError::DurableWriteFailed(_)));
	assert_eq!(err.code(), 5000);

	assert_eq!(service.stock().current(GOODS_ID).await.unwrap(), Some(3));
	assert!(!service.locks().is_locked(1, GOODS_ID).await.unwrap());
	assert_eq!(service.get_outcome(1, GOODS_ID).await.unwrap(), SeckillResult::Pending);
	assert_eq!(store.zcard(keys::ORDER_EXPIRY_SET).unwrap(), 0);
	assert_eq!(durable.order_info_count(GOODS_ID).unwrap(), 0);
}

// A redelivered intent for an already indexed pair also hands its unit back
#[tokio::test]
async fn test_duplicate_intent_compensates_reservation() {
	let h = harness(5, test_config());
	h.service.activate_goods(SELLER_ID, GOODS_ID).await.unwrap();
	create_order(&h, 1).await;
	assert_eq!(h.service.stock().current(GOODS_ID).await.unwrap(), Some(4));

	// A second reservation for the same pair that slipped past admission
	h.service.stock().decrement(GOODS_ID).await.unwrap();
	let skipped = h
		.service
		.create_order_from_intent(OrderIntent {
			user_id: 1,
			goods_id: GOODS_ID,
		})
		.await
		.unwrap();

	assert_eq!(skipped, None);
	assert_eq!(h.service.stock().current(GOODS_ID).await.unwrap(), Some(4));
	assert_eq!(h.durable.order_info_count(GOODS_ID).unwrap(), 1);
}

/// Order store that cannot close one chosen order
struct StuckCloseOrders {
	inner: Arc<MemoryDurableStore>,
	stuck: Mutex<Option<String>>,
}

#[async_trait]
impl OrderRepository for StuckCloseOrders {
	async fn create_order(&self, info: &OrderInfo) -> Result<(), DurableError> {
		self.inner.create_order(info).await
	}

	async fn close_order(&self, info: &OrderInfo) -> Result<(), DurableError> {
		if self.stuck.lock().unwrap().as_deref() == Some(info.order_id.as_str()) {
			return Err(DurableError::Storage("lock wait timeout".to_string()));
		}
		self.inner.close_order(info).await
	}

	async fn find_order_info(&self, order_id: &str) -> Result<OrderInfo, DurableError> {
		self.inner.find_order_info(order_id).await
	}

	async fn mark_paid(&self, order_id: &str) -> Result<OrderInfo, DurableError> {
		self.inner.mark_paid(order_id).await
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_order_that_cannot_close_does_not_block_expiry() {
	let store = Arc::new(MemoryCoordinationStore::new());
	let durable = Arc::new(MemoryDurableStore::new());
	durable.insert_goods(on_sale(GOODS_ID, 5)).unwrap();
	let orders = Arc::new(StuckCloseOrders {
		inner: durable.clone(),
		stuck: Mutex::new(None),
	});
	let config = EngineConfig {
		payment_window_secs: 1,
		poller_retry_ms: 60_000,
		..test_config()
	};
	let h = Harness {
		service: Arc::new(
			SeckillService::new(store.clone(), durable.clone(), orders.clone(), config).unwrap(),
		),
		store,
		durable,
	};
	h.service.activate_goods(SELLER_ID, GOODS_ID).await.unwrap();

	let stuck = create_order(&h, 1).await;
	*orders.stuck.lock().unwrap() = Some(stuck.clone());
	let behind = create_order(&h, 2).await;

	let workers = h.service.start_workers();
	tokio::time::sleep(Duration::from_millis(1_800)).await;
	workers.shutdown().await;

	assert_eq!(
		h.durable.find_order_info(&behind).await.unwrap().status,
		OrderStatus::Closed
	);
	assert_eq!(
		h.durable.find_order_info(&stuck).await.unwrap().status,
		OrderStatus::Unpaid
	);

	// The stuck entry was pushed back for a later retry
	assert_eq!(h.store.zcard(keys::ORDER_EXPIRY_SET).unwrap(), 1);
	let retry_at = h.store.zscore(keys::ORDER_EXPIRY_SET, &stuck).unwrap().unwrap();
	assert!(retry_at > (Utc::now() + ChronoDuration::seconds(30)).timestamp_millis());
	assert_eq!(h.service.stock().current(GOODS_ID).await.unwrap(), Some(4));
}

/// Coordination store whose counter increments and deletes can be switched off
struct FlakyStore {
	inner: MemoryCoordinationStore,
	failing: AtomicBool,
}

impl FlakyStore {
	fn check(&self, op: &str) -> Result<(), StoreError> {
		if self.failing.load(Ordering::Relaxed) {
			return Err(StoreError::Backend(format!("{} refused", op)));
		}
		Ok(())
	}
}

#[async_trait]
impl CoordinationStore for FlakyStore {
	async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		self.inner.get(key).await
	}

	async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
		self.inner.set(key, value).await
	}

	async fn del(&self, key: &str) -> Result<(), StoreError> {
		self.check("DEL")?;
		self.inner.del(key).await
	}

	async fn set_nx(&self, key: &str, value: &str) -> Result<bool, StoreError> {
		self.inner.set_nx(key, value).await
	}

	async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
		self.inner.set_nx_ex(key, value, ttl).await
	}

	async fn incr(&self, key: &str) -> Result<i64, StoreError> {
		self.check("INCR")?;
		self.inner.incr(key).await
	}

	async fn decr(&self, key: &str) -> Result<i64, StoreError> {
		self.inner.decr(key).await
	}

	async fn incr_window(&self, key: &str, window: Duration) -> Result<i64, StoreError> {
		self.inner.incr_window(key, window).await
	}

	async fn lpush(&self, key: &str, value: &str) -> Result<(), StoreError> {
		self.inner.lpush(key, value).await
	}

	async fn rpop(&self, key: &str) -> Result<Option<String>, StoreError> {
		self.inner.rpop(key).await
	}

	async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
		self.inner.brpop(key, timeout).await
	}

	async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), StoreError> {
		self.inner.zadd(key, member, score).await
	}

	async fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
		self.inner.zrem(key, member).await
	}

	async fn zfirst_due(&self, key: &str, max_score: i64) -> Result<Option<String>, StoreError> {
		self.inner.zfirst_due(key, max_score).await
	}
}

// Cache-side compensation after a durable close is logged only: the close
// stands and the expiry entry is still cleared
#[tokio::test]
async fn test_failed_compensation_after_close_is_not_fatal() {
	let store = Arc::new(FlakyStore {
		inner: MemoryCoordinationStore::new(),
		failing: AtomicBool::new(false),
	});
	let durable = Arc::new(MemoryDurableStore::new());
	durable.insert_goods(on_sale(GOODS_ID, 3)).unwrap();
	let service =
		SeckillService::new(store.clone(), durable.clone(), durable.clone(), test_config()).unwrap();
	service.activate_goods(SELLER_ID, GOODS_ID).await.unwrap();

	service.attempt_seckill(1, GOODS_ID, "10.0.0.1").await.unwrap();
	let intent = service.intent_queue().try_dequeue().await.unwrap().unwrap();
	let order_id = service.create_order_from_intent(intent).await.unwrap().unwrap();
	assert_eq!(service.stock().current(GOODS_ID).await.unwrap(), Some(2));

	store.failing.store(true, Ordering::Relaxed);
	assert!(service.close_expired(&order_id).await.unwrap());

	assert_eq!(
		durable.find_order_info(&order_id).await.unwrap().status,
		OrderStatus::Closed
	);
	assert_eq!(durable.find_goods_by_id(GOODS_ID).await.unwrap().stock, 3);
	assert_eq!(store.inner.zcard(keys::ORDER_EXPIRY_SET).unwrap(), 0);
	// Neither the unit nor the index entry came back
	assert_eq!(service.stock().current(GOODS_ID).await.unwrap(), Some(2));
	assert!(matches!(
		service.get_outcome(1, GOODS_ID).await.unwrap(),
		SeckillResult::Ordered { .. }
	));

	// A second poll of the same order is a no-op
	store.failing.store(false, Ordering::Relaxed);
	assert!(!service.close_expired(&order_id).await.unwrap());
	assert_eq!(service.stock().current(GOODS_ID).await.unwrap(), Some(2));
}
