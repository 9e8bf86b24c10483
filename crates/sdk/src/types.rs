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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = u64;
pub type GoodsId = u64;

/// A flash-sale good as stored durably
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goods {
	pub id: GoodsId,
	pub name: String,
	/// Image url snapshotted into orders
	pub img: String,
	pub origin_price: f64,
	/// Sale price
	pub price: f64,
	/// Total units offered
	pub amount: i64,
	/// Remaining durable stock
	pub stock: i64,
	/// Sale window start
	pub start_time: DateTime<Utc>,
	/// Sale window end
	pub end_time: DateTime<Utc>,
	/// Seller who owns the good
	pub owner_id: UserId,
}

/// Where a good is in its sale window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
	NotStarted,
	OnGoing,
	SoldOut,
	Ended,
}

impl Goods {
	/// Sale status at `now`, judged against the durable stock
	pub fn sale_status(&self, now: DateTime<Utc>) -> SaleStatus {
		if now < self.start_time {
			SaleStatus::NotStarted
		} else if now > self.end_time {
			SaleStatus::Ended
		} else if self.stock <= 0 {
			SaleStatus::SoldOut
		} else {
			SaleStatus::OnGoing
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
	Unpaid,
	Paid,
	Closed,
}

/// Lean order row, exists only while the order is live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
	pub order_id: String,
	pub user_id: UserId,
	pub goods_id: GoodsId,
	pub created_at: DateTime<Utc>,
}

/// Full order record with the goods snapshot taken at creation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderInfo {
	pub order_id: String,
	pub user_id: UserId,
	pub goods_id: GoodsId,
	pub goods_name: String,
	pub goods_img: String,
	pub goods_price: f64,
	pub status: OrderStatus,
	pub created_at: DateTime<Utc>,
}

impl OrderInfo {
	pub fn to_order(&self) -> Order {
		Order {
			order_id: self.order_id.clone(),
			user_id: self.user_id,
			goods_id: self.goods_id,
			created_at: self.created_at,
		}
	}
}

/// "This user won a reservation for this good", queued for durable creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIntent {
	pub user_id: UserId,
	pub goods_id: GoodsId,
}

/// Synchronous result of a purchase attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeckillOutcome {
	/// Reservation made, order creation is queued
	Accepted,
	AlreadyParticipated,
	SoldOut,
	RateLimited,
	LockContention,
	NotStarted,
	Ended,
}

/// Result of polling for an order after an accepted attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SeckillResult {
	Pending,
	Ordered { order_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeckillResponse {
	pub goods_id: GoodsId,
	pub outcome: SeckillOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeckillResultResponse {
	pub goods_id: GoodsId,
	pub result: SeckillResult,
}

/// Order as presented to its owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderView {
	#[serde(flatten)]
	pub info: OrderInfo,
	/// Seconds left to pay, 0 once the order is no longer unpaid
	pub remaining_payment_secs: i64,
	/// Length of the payment window in seconds
	pub payment_window_secs: i64,
}

/// Error body returned by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	pub code: u32,
	pub error: String,
}
