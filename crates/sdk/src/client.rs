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

use std::time::Duration;

use reqwest::{Client as ReqwestClient, RequestBuilder};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::types::{
	ErrorResponse, GoodsId, OrderView, SeckillResponse, SeckillResult, SeckillResultResponse,
	UserId,
};

/// Header carrying the authenticated user id, set by the upstream auth layer
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Header carrying the shared secret of internal callers (payment provider
/// callbacks), never set by buyers
pub const INTERNAL_TOKEN_HEADER: &str = "X-Internal-Token";

/// Error types for client operations
#[derive(Debug, Error)]
pub enum ClientError {
	#[error("Network error: {0}")]
	Network(String),
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Gateway rejected the call with one of its error codes
	#[error("Server error {status} (code {code}): {message}")]
	Server {
		status: u16,
		code: u32,
		message: String,
	},
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
}

/// Client for interacting with the flash-sale gateway
///
/// Every call is made on behalf of one user; the gateway trusts the
/// `X-User-Id` header the same way it trusts its auth proxy.
pub struct Client {
	base_url: String,
	client: ReqwestClient,
}

impl Client {
	/// Create a new client with the given base URL
	pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
		Self::with_timeout(base_url, Duration::from_secs(30))
	}

	/// Create a new client with a custom request timeout
	pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
		let client = ReqwestClient::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| ClientError::Network(format!("Failed to create HTTP client: {}", e)))?;

		Ok(Self {
			base_url: base_url.into().trim_end_matches('/').to_string(),
			client,
		})
	}

	/// Attempt to buy one unit of a good
	///
	/// Every synchronous rejection (sold out, rate limited, duplicate attempt)
	/// comes back as `ClientError::Server` carrying the gateway error code.
	pub async fn seckill(
		&self,
		user_id: UserId,
		goods_id: GoodsId,
	) -> Result<SeckillResponse, ClientError> {
		let url = format!("{}/api/v1/seckill/{}", self.base_url, goods_id);
		self.send(self.client.post(&url), user_id).await
	}

	/// Poll whether an accepted attempt has turned into an order
	pub async fn outcome(
		&self,
		user_id: UserId,
		goods_id: GoodsId,
	) -> Result<SeckillResult, ClientError> {
		let url = format!("{}/api/v1/seckill/{}/result", self.base_url, goods_id);
		let response: SeckillResultResponse = self.send(self.client.get(&url), user_id).await?;
		Ok(response.result)
	}

	/// Get one of the user's orders
	pub async fn get_order(&self, user_id: UserId, order_id: &str) -> Result<OrderView, ClientError> {
		let url = format!("{}/api/v1/orders/{}", self.base_url, order_id);
		self.send(self.client.get(&url), user_id).await
	}

	/// Cancel an unpaid order, returning its unit to the sale
	pub async fn cancel_order(&self, user_id: UserId, order_id: &str) -> Result<(), ClientError> {
		let url = format!("{}/api/v1/orders/{}", self.base_url, order_id);
		let _: serde_json::Value = self.send(self.client.delete(&url), user_id).await?;
		Ok(())
	}

	/// Seed the sale counter of one of the seller's goods
	pub async fn activate_goods(&self, seller_id: UserId, goods_id: GoodsId) -> Result<(), ClientError> {
		let url = format!("{}/api/v1/goods/{}/activate", self.base_url, goods_id);
		let _: serde_json::Value = self.send(self.client.post(&url), seller_id).await?;
		Ok(())
	}

	/// Seed the sale counters of every good the seller owns
	pub async fn activate_seller_goods(&self, seller_id: UserId) -> Result<(), ClientError> {
		let url = format!("{}/api/v1/sellers/activate", self.base_url);
		let _: serde_json::Value = self.send(self.client.post(&url), seller_id).await?;
		Ok(())
	}

	/// Record that an order has been paid
	///
	/// Internal callback for the payment provider; the gateway rejects it
	/// without the configured internal token.
	pub async fn confirm_payment(&self, internal_token: &str, order_id: &str) -> Result<(), ClientError> {
		let url = format!("{}/internal/v1/orders/{}/payment", self.base_url, order_id);
		let request = self
			.client
			.post(&url)
			.header(INTERNAL_TOKEN_HEADER, internal_token);
		let _: serde_json::Value = self.execute(request).await?;
		Ok(())
	}

	/// Check gateway health
	pub async fn health_check(&self) -> Result<bool, ClientError> {
		let url = format!("{}/health", self.base_url);

		let response = self
			.client
			.get(&url)
			.send()
			.await
			.map_err(|e| ClientError::Network(format!("Request failed: {}", e)))?;

		Ok(response.status().is_success())
	}

	async fn send<T: DeserializeOwned>(
		&self,
		request: RequestBuilder,
		user_id: UserId,
	) -> Result<T, ClientError> {
		self.execute(request.header(USER_ID_HEADER, user_id.to_string()))
			.await
	}

	async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
		let response = request
			.send()
			.await
			.map_err(|e| ClientError::Network(format!("Request failed: {}", e)))?;

		let status = response.status();
		if !status.is_success() {
			let body = response
				.text()
				.await
				.unwrap_or_else(|_| format!("HTTP {}", status));
			return Err(match serde_json::from_str::<ErrorResponse>(&body) {
				Ok(err) => ClientError::Server {
					status: status.as_u16(),
					code: err.code,
					message: err.error,
				},
				Err(_) => ClientError::InvalidResponse(format!("{}: {}", status, body)),
			});
		}

		response
			.json()
			.await
			.map_err(|e| ClientError::Serialization(format!("Failed to parse response: {}", e)))
	}
}
