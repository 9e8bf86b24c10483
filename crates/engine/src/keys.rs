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

//! Coordination store key layout

use flashsale_sdk::types::{GoodsId, UserId};

/// FIFO list of serialized order intents
pub const ORDER_INTENT_QUEUE: &str = "precreate_order_queue";

/// Ordered set of unpaid order ids scored by payment deadline (unix millis)
pub const ORDER_EXPIRY_SET: &str = "order_timeout_delay_queue";

/// Reservation lock for one (user, goods) pair
pub fn lock_key(user_id: UserId, goods_id: GoodsId) -> String {
	format!("lock:{}:{}", user_id, goods_id)
}

/// Idempotence index entry: (user, goods) -> order id
pub fn order_id_key(user_id: UserId, goods_id: GoodsId) -> String {
	format!("order:{}:{}", user_id, goods_id)
}

/// Sellable-unit counter of a good
pub fn stock_key(goods_id: GoodsId) -> String {
	format!("goods_stock:{}", goods_id)
}

/// Per-client request counter
pub fn rate_limit_key(client_ip: &str) -> String {
	format!("rate_limit:{}", client_ip)
}
