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

mod memory;

use async_trait::async_trait;
use flashsale_sdk::types::{Goods, GoodsId, OrderInfo, UserId};
use thiserror::Error;

pub use memory::MemoryDurableStore;

#[derive(Debug, Error)]
pub enum DurableError {
	#[error("Record not found: {0}")]
	NotFound(String),
	#[error("Durable stock exhausted for goods {0}")]
	StockExhausted(GoodsId),
	#[error("Order {0} is not in the expected status")]
	StatusConflict(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

/// Inventory lookup
#[async_trait]
pub trait GoodsRepository: Send + Sync {
	/// Current durable row, including remaining stock and sale window
	async fn find_goods_by_id(&self, id: GoodsId) -> Result<Goods, DurableError>;

	async fn list_goods_by_owner(&self, owner_id: UserId) -> Result<Vec<Goods>, DurableError>;
}

/// Durable order store, the source of truth for orders
///
/// Both state-changing operations are all-or-nothing: either every row
/// they touch is updated or none is.
#[async_trait]
pub trait OrderRepository: Send + Sync {
	/// Decrement the good's remaining stock (only while it is > 0), insert
	/// the Order row and the Unpaid OrderInfo row.
	async fn create_order(&self, info: &OrderInfo) -> Result<(), DurableError>;

	/// Increment the good's remaining stock, delete the Order row and mark
	/// the OrderInfo Closed. Fails with `StatusConflict` unless the stored
	/// OrderInfo is still Unpaid.
	async fn close_order(&self, info: &OrderInfo) -> Result<(), DurableError>;

	async fn find_order_info(&self, order_id: &str) -> Result<OrderInfo, DurableError>;

	/// Record an external payment confirmation for an Unpaid order
	async fn mark_paid(&self, order_id: &str) -> Result<OrderInfo, DurableError>;
}
