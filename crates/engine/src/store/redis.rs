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

//! Redis-backed coordination store
//!
//! Each primitive maps onto a single Redis command (or one atomic
//! pipeline), so parallel gateway and worker processes can share the same
//! locks, counters and queues.
//!
//! Redis serves the commands of one connection in order, so blocking pops
//! get a connection of their own; a waiting `BRPOP` must never hold up the
//! lock and counter commands of the admission path.

use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};

use super::{CoordinationStore, StoreError};

#[derive(Clone)]
pub struct RedisCoordinationStore {
	conn_manager: ConnectionManager,
	/// Dedicated to `BRPOP`
	blocking_conn: ConnectionManager,
}

impl RedisCoordinationStore {
	/// Connect to Redis, e.g. `redis://127.0.0.1:6379`
	pub async fn new(redis_url: &str) -> Result<Self, StoreError> {
		let client = Client::open(redis_url)
			.map_err(|e| StoreError::Backend(format!("Failed to create Redis client: {}", e)))?;

		let conn_manager = ConnectionManager::new(client.clone()).await.map_err(|e| {
			StoreError::Backend(format!("Failed to create Redis connection manager: {}", e))
		})?;
		let blocking_conn = ConnectionManager::new(client).await.map_err(|e| {
			StoreError::Backend(format!("Failed to create Redis blocking connection: {}", e))
		})?;

		Ok(Self {
			conn_manager,
			blocking_conn,
		})
	}
}

fn backend(op: &'static str) -> impl Fn(redis::RedisError) -> StoreError {
	move |e| StoreError::Backend(format!("redis {} failed: {}", op, e))
}

#[async_trait]
impl CoordinationStore for RedisCoordinationStore {
	async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		let mut conn = self.conn_manager.clone();
		conn.get(key).await.map_err(backend("GET"))
	}

	async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
		let mut conn = self.conn_manager.clone();
		conn.set(key, value).await.map_err(backend("SET"))
	}

	async fn del(&self, key: &str) -> Result<(), StoreError> {
		let mut conn = self.conn_manager.clone();
		conn.del(key).await.map_err(backend("DEL"))
	}

	async fn set_nx(&self, key: &str, value: &str) -> Result<bool, StoreError> {
		let mut conn = self.conn_manager.clone();
		conn.set_nx(key, value).await.map_err(backend("SETNX"))
	}

	async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
		let mut conn = self.conn_manager.clone();
		let reply: Option<String> = redis::cmd("SET")
			.arg(key)
			.arg(value)
			.arg("NX")
			.arg("PX")
			.arg(ttl.as_millis() as u64)
			.query_async(&mut conn)
			.await
			.map_err(backend("SET NX"))?;
		Ok(reply.is_some())
	}

	async fn incr(&self, key: &str) -> Result<i64, StoreError> {
		let mut conn = self.conn_manager.clone();
		conn.incr(key, 1).await.map_err(backend("INCR"))
	}

	async fn decr(&self, key: &str) -> Result<i64, StoreError> {
		let mut conn = self.conn_manager.clone();
		conn.decr(key, 1).await.map_err(backend("DECR"))
	}

	async fn incr_window(&self, key: &str, window: Duration) -> Result<i64, StoreError> {
		let mut conn = self.conn_manager.clone();
		// EXPIRE ... NX only sets a TTL on keys that have none (Redis >= 7)
		let (count,): (i64,) = redis::pipe()
			.atomic()
			.incr(key, 1)
			.cmd("PEXPIRE")
			.arg(key)
			.arg(window.as_millis() as u64)
			.arg("NX")
			.ignore()
			.query_async(&mut conn)
			.await
			.map_err(backend("INCR/PEXPIRE"))?;
		Ok(count)
	}

	async fn lpush(&self, key: &str, value: &str) -> Result<(), StoreError> {
		let mut conn = self.conn_manager.clone();
		conn.lpush(key, value).await.map_err(backend("LPUSH"))
	}

	async fn rpop(&self, key: &str) -> Result<Option<String>, StoreError> {
		let mut conn = self.conn_manager.clone();
		conn.rpop(key, None).await.map_err(backend("RPOP"))
	}

	async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
		let mut conn = self.blocking_conn.clone();
		let reply: Option<(String, String)> = conn
			.brpop(key, timeout.as_secs_f64())
			.await
			.map_err(backend("BRPOP"))?;
		Ok(reply.map(|(_, value)| value))
	}

	async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), StoreError> {
		let mut conn = self.conn_manager.clone();
		conn.zadd(key, member, score).await.map_err(backend("ZADD"))
	}

	async fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
		let mut conn = self.conn_manager.clone();
		let removed: i64 = conn.zrem(key, member).await.map_err(backend("ZREM"))?;
		Ok(removed > 0)
	}

	async fn zfirst_due(&self, key: &str, max_score: i64) -> Result<Option<String>, StoreError> {
		let mut conn = self.conn_manager.clone();
		let members: Vec<String> = conn
			.zrangebyscore_limit(key, "-inf", max_score, 0, 1)
			.await
			.map_err(backend("ZRANGEBYSCORE"))?;
		Ok(members.into_iter().next())
	}
}
