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

//! Flashsale Seckill Engine
//!
//! This crate implements the concurrency and order-fulfillment pipeline of
//! a flash sale: many users race for a small, fixed quantity of a
//! time-boxed good, and the engine guarantees no oversell, no duplicate
//! purchase per user and bounded admission under burst load.
//!
//! Architecture:
//! - Admission controller: system token bucket plus per-client window
//! - Reservation lock per (user, goods) collapsing duplicate attempts
//! - Atomic stock counter in the coordination store
//! - Order intent queue decoupling admission from durable writes
//! - Delayed expiry scheduler reclaiming unpaid orders
//!
//! All transient state lives behind an injected [`CoordinationStore`];
//! durable goods and orders live behind [`GoodsRepository`] and
//! [`OrderRepository`].

pub mod admission;
pub mod config;
pub mod durable;
pub mod error;
pub mod expiry;
pub mod keys;
pub mod lock;
pub mod queue;
pub mod service;
pub mod stock;
pub mod store;

pub use admission::{AdmissionController, AdmissionError, ClientRateLimiter, TokenBucket};
pub use config::EngineConfig;
pub use durable::{DurableError, GoodsRepository, MemoryDurableStore, OrderRepository};
pub use error::SeckillError;
pub use expiry::{ExpiryHandler, ExpiryPoller, ExpiryScheduler};
pub use lock::ReservationLockManager;
pub use queue::{IntentConsumer, IntentProcessor, OrderIntentQueue, QueueError};
pub use service::{SeckillService, Workers, generate_order_id};
pub use stock::StockReservation;
#[cfg(feature = "redis")]
pub use store::RedisCoordinationStore;
pub use store::{CoordinationStore, MemoryCoordinationStore, StoreError};
