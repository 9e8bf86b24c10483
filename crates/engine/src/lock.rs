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

use std::{sync::Arc, time::Duration};

use flashsale_sdk::types::{GoodsId, UserId};

use crate::{
	keys,
	store::{CoordinationStore, StoreError},
};

/// Short-lived mutual exclusion per (user, goods)
///
/// Collapses concurrent attempts of one user on one good into a single
/// winner. Release is an unconditional delete: the pipeline is cooperative
/// and single-writer until release, and the TTL frees a crashed holder.
pub struct ReservationLockManager {
	store: Arc<dyn CoordinationStore>,
	ttl: Duration,
}

impl ReservationLockManager {
	pub fn new(store: Arc<dyn CoordinationStore>, ttl: Duration) -> Self {
		Self { store, ttl }
	}

	/// Returns true only if no lock existed for the pair
	pub async fn try_lock(
		&self,
		user_id: UserId,
		goods_id: GoodsId,
		token: &str,
	) -> Result<bool, StoreError> {
		self.store
			.set_nx_ex(&keys::lock_key(user_id, goods_id), token, self.ttl)
			.await
	}

	pub async fn unlock(&self, user_id: UserId, goods_id: GoodsId) -> Result<(), StoreError> {
		self.store.del(&keys::lock_key(user_id, goods_id)).await
	}

	pub async fn is_locked(&self, user_id: UserId, goods_id: GoodsId) -> Result<bool, StoreError> {
		Ok(self
			.store
			.get(&keys::lock_key(user_id, goods_id))
			.await?
			.is_some())
	}
}
