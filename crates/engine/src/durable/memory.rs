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
	collections::HashMap,
	sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use flashsale_sdk::types::{Goods, GoodsId, Order, OrderInfo, OrderStatus, UserId};

use super::{DurableError, GoodsRepository, OrderRepository};

#[derive(Default)]
struct Tables {
	goods: HashMap<GoodsId, Goods>,
	orders: HashMap<String, Order>,
	order_infos: HashMap<String, OrderInfo>,
}

/// In-memory goods and order tables
///
/// A single mutex guards all tables, so each transaction validates every
/// precondition before it mutates anything and is therefore atomic.
pub struct MemoryDurableStore {
	tables: Mutex<Tables>,
}

impl MemoryDurableStore {
	pub fn new() -> Self {
		Self {
			tables: Mutex::new(Tables::default()),
		}
	}

	/// Insert or replace a good
	pub fn insert_goods(&self, goods: Goods) -> Result<(), DurableError> {
		self.lock()?.goods.insert(goods.id, goods);
		Ok(())
	}

	/// Number of live (not closed) Order rows for a good
	pub fn live_order_count(&self, goods_id: GoodsId) -> Result<usize, DurableError> {
		Ok(self
			.lock()?
			.orders
			.values()
			.filter(|o| o.goods_id == goods_id)
			.count())
	}

	/// Number of OrderInfo rows ever created for a good, in any status
	pub fn order_info_count(&self, goods_id: GoodsId) -> Result<usize, DurableError> {
		Ok(self
			.lock()?
			.order_infos
			.values()
			.filter(|o| o.goods_id == goods_id)
			.count())
	}

	fn lock(&self) -> Result<MutexGuard<'_, Tables>, DurableError> {
		self.tables
			.lock()
			.map_err(|_| DurableError::Storage("tables poisoned".to_string()))
	}
}

impl Default for MemoryDurableStore {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl GoodsRepository for MemoryDurableStore {
	async fn find_goods_by_id(&self, id: GoodsId) -> Result<Goods, DurableError> {
		self.lock()?
			.goods
			.get(&id)
			.cloned()
			.ok_or_else(|| DurableError::NotFound(format!("goods {}", id)))
	}

	async fn list_goods_by_owner(&self, owner_id: UserId) -> Result<Vec<Goods>, DurableError> {
		let tables = self.lock()?;
		let mut goods: Vec<Goods> = tables
			.goods
			.values()
			.filter(|g| g.owner_id == owner_id)
			.cloned()
			.collect();
		goods.sort_by_key(|g| g.id);
		Ok(goods)
	}
}

#[async_trait]
impl OrderRepository for MemoryDurableStore {
	async fn create_order(&self, info: &OrderInfo) -> Result<(), DurableError> {
		let mut tables = self.lock()?;

		if tables.order_infos.contains_key(&info.order_id) {
			return Err(DurableError::Storage(format!(
				"duplicate order id {}",
				info.order_id
			)));
		}
		let goods = tables
			.goods
			.get_mut(&info.goods_id)
			.ok_or_else(|| DurableError::NotFound(format!("goods {}", info.goods_id)))?;
		if goods.stock <= 0 {
			return Err(DurableError::StockExhausted(info.goods_id));
		}
		goods.stock -= 1;

		let mut info = info.clone();
		info.status = OrderStatus::Unpaid;
		tables.orders.insert(info.order_id.clone(), info.to_order());
		tables.order_infos.insert(info.order_id.clone(), info);
		Ok(())
	}

	async fn close_order(&self, info: &OrderInfo) -> Result<(), DurableError> {
		let mut tables = self.lock()?;

		let current = tables
			.order_infos
			.get(&info.order_id)
			.ok_or_else(|| DurableError::NotFound(format!("order {}", info.order_id)))?;
		if current.status != OrderStatus::Unpaid {
			return Err(DurableError::StatusConflict(info.order_id.clone()));
		}
		if !tables.orders.contains_key(&info.order_id) {
			return Err(DurableError::NotFound(format!("order row {}", info.order_id)));
		}
		let goods_id = current.goods_id;
		if !tables.goods.contains_key(&goods_id) {
			return Err(DurableError::NotFound(format!("goods {}", goods_id)));
		}

		if let Some(goods) = tables.goods.get_mut(&goods_id) {
			goods.stock += 1;
		}
		tables.orders.remove(&info.order_id);
		if let Some(current) = tables.order_infos.get_mut(&info.order_id) {
			current.status = OrderStatus::Closed;
		}
		Ok(())
	}

	async fn find_order_info(&self, order_id: &str) -> Result<OrderInfo, DurableError> {
		self.lock()?
			.order_infos
			.get(order_id)
			.cloned()
			.ok_or_else(|| DurableError::NotFound(format!("order {}", order_id)))
	}

	async fn mark_paid(&self, order_id: &str) -> Result<OrderInfo, DurableError> {
		let mut tables = self.lock()?;
		let info = tables
			.order_infos
			.get_mut(order_id)
			.ok_or_else(|| DurableError::NotFound(format!("order {}", order_id)))?;
		if info.status != OrderStatus::Unpaid {
			return Err(DurableError::StatusConflict(order_id.to_string()));
		}
		info.status = OrderStatus::Paid;
		Ok(info.clone())
	}
}
