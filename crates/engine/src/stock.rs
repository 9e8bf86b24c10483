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

use std::sync::Arc;

use flashsale_sdk::types::GoodsId;

use crate::{
	keys,
	store::{CoordinationStore, StoreError},
};

/// Cache-resident sellable-unit counter per good
///
/// `decrement` has no pre-check: under contention the counter may dip below
/// zero, and any result < 0 means sold out. The engine never clamps it back;
/// callers issue `increment` explicitly to return a unit.
pub struct StockReservation {
	store: Arc<dyn CoordinationStore>,
}

impl StockReservation {
	pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
		Self { store }
	}

	/// Set the counter to the durable stock when a sale is activated
	///
	/// Only the first activation seeds; a live counter is never reset, since
	/// queued intents already hold units taken from it. Returns true if this
	/// call seeded the counter.
	pub async fn seed(&self, goods_id: GoodsId, stock: i64) -> Result<bool, StoreError> {
		self.store
			.set_nx(&keys::stock_key(goods_id), &stock.to_string())
			.await
	}

	pub async fn decrement(&self, goods_id: GoodsId) -> Result<i64, StoreError> {
		self.store.decr(&keys::stock_key(goods_id)).await
	}

	/// Compensation: return one unit
	pub async fn increment(&self, goods_id: GoodsId) -> Result<i64, StoreError> {
		self.store.incr(&keys::stock_key(goods_id)).await
	}

	/// Current counter, None if the good was never seeded
	pub async fn current(&self, goods_id: GoodsId) -> Result<Option<i64>, StoreError> {
		match self.store.get(&keys::stock_key(goods_id)).await? {
			Some(raw) => raw.parse().map(Some).map_err(|_| {
				StoreError::Serialization(format!("stock counter for {} is not an integer", goods_id))
			}),
			None => Ok(None),
		}
	}
}
