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

use flashsale_sdk::types::{GoodsId, SeckillOutcome};
use thiserror::Error;

use crate::{
	admission::AdmissionError, durable::DurableError, queue::QueueError, store::StoreError,
};

/// Errors surfaced by the seckill pipeline
///
/// Each variant carries a stable numeric code so callers can tell
/// rejections apart without parsing messages:
/// - `5000..5100` system errors
/// - `5100..5200` caller errors
/// - `5200..5300` goods / sale errors
/// - `5300..5400` order errors
#[derive(Debug, Error)]
pub enum SeckillError {
	#[error("Too many requests: {0}")]
	RateLimited(AdmissionError),
	#[error("Seckill failed, try later")]
	LockContention,
	#[error("Goods sold out")]
	SoldOut,
	#[error("Already participated in this seckill")]
	AlreadyParticipated,
	#[error("Seckill has not started")]
	NotStarted,
	#[error("Seckill has ended")]
	Ended,
	#[error("Forbidden: {0}")]
	Forbidden(String),
	#[error("Goods not found: {0}")]
	GoodsNotFound(GoodsId),
	#[error("Order not found: {0}")]
	OrderNotFound(String),
	#[error("Order {0} is not unpaid")]
	OrderStatus(String),
	#[error("Failed to close order: {0}")]
	OrderCloseFailed(String),
	#[error("Durable write failed: {0}")]
	DurableWriteFailed(String),
	#[error("Invalid config: {0}")]
	Config(String),
	#[error(transparent)]
	Durable(#[from] DurableError),
	#[error(transparent)]
	Store(#[from] StoreError),
	#[error(transparent)]
	Queue(#[from] QueueError),
}

impl From<AdmissionError> for SeckillError {
	fn from(err: AdmissionError) -> Self {
		match err {
			AdmissionError::Store(e) => SeckillError::Store(e),
			AdmissionError::InvalidConfig(msg) => SeckillError::Config(msg.to_string()),
			rejected => SeckillError::RateLimited(rejected),
		}
	}
}

impl SeckillError {
	pub fn code(&self) -> u32 {
		match self {
			SeckillError::Durable(_)
			| SeckillError::DurableWriteFailed(_)
			| SeckillError::Config(_) => 5000,
			SeckillError::Store(_) | SeckillError::Queue(_) => 5001,
			SeckillError::RateLimited(_) => 5040,
			SeckillError::GoodsNotFound(_) => 5044,
			SeckillError::Forbidden(_) => 5106,
			SeckillError::SoldOut => 5200,
			SeckillError::NotStarted => 5211,
			SeckillError::Ended => 5222,
			SeckillError::OrderNotFound(_) => 5300,
			SeckillError::OrderStatus(_) => 5310,
			SeckillError::OrderCloseFailed(_) => 5320,
			SeckillError::AlreadyParticipated => 5330,
			SeckillError::LockContention => 5340,
		}
	}

	/// The caller-facing outcome this rejection corresponds to, if any
	pub fn outcome(&self) -> Option<SeckillOutcome> {
		match self {
			SeckillError::RateLimited(_) => Some(SeckillOutcome::RateLimited),
			SeckillError::LockContention => Some(SeckillOutcome::LockContention),
			SeckillError::SoldOut => Some(SeckillOutcome::SoldOut),
			SeckillError::AlreadyParticipated => Some(SeckillOutcome::AlreadyParticipated),
			SeckillError::NotStarted => Some(SeckillOutcome::NotStarted),
			SeckillError::Ended => Some(SeckillOutcome::Ended),
			_ => None,
		}
	}
}
