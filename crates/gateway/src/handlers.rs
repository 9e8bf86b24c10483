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

use actix_web::{HttpRequest, HttpResponse, Responder, http::StatusCode, web};
use flashsale_engine::SeckillError;
use flashsale_sdk::{
	INTERNAL_TOKEN_HEADER, USER_ID_HEADER,
	types::{ErrorResponse, GoodsId, SeckillResponse, SeckillResultResponse, UserId},
};
use thiserror::Error;
use tracing::warn;

use crate::server::GatewayState;

/// Error types for gateway operations
#[derive(Debug, Error)]
pub enum GatewayError {
	#[error("Missing X-User-Id header")]
	MissingUserId,
	#[error("Invalid X-User-Id header: {0}")]
	InvalidUserId(String),
	#[error("Internal route requires a valid X-Internal-Token")]
	InternalOnly,
	#[error(transparent)]
	Seckill(#[from] SeckillError),
}

impl GatewayError {
	pub fn code(&self) -> u32 {
		match self {
			GatewayError::MissingUserId | GatewayError::InvalidUserId(_) => 4001,
			GatewayError::InternalOnly => 4003,
			GatewayError::Seckill(e) => e.code(),
		}
	}
}

impl actix_web::ResponseError for GatewayError {
	fn status_code(&self) -> StatusCode {
		match self {
			GatewayError::MissingUserId | GatewayError::InvalidUserId(_) => StatusCode::UNAUTHORIZED,
			GatewayError::InternalOnly => StatusCode::FORBIDDEN,
			GatewayError::Seckill(e) => match e {
				SeckillError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
				SeckillError::GoodsNotFound(_) | SeckillError::OrderNotFound(_) => {
					StatusCode::NOT_FOUND
				}
				SeckillError::NotStarted | SeckillError::Ended | SeckillError::Forbidden(_) => {
					StatusCode::FORBIDDEN
				}
				SeckillError::SoldOut
				| SeckillError::AlreadyParticipated
				| SeckillError::LockContention
				| SeckillError::OrderStatus(_) => StatusCode::CONFLICT,
				SeckillError::Store(_) | SeckillError::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
				SeckillError::OrderCloseFailed(_)
				| SeckillError::DurableWriteFailed(_)
				| SeckillError::Durable(_)
				| SeckillError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
			},
		}
	}

	fn error_response(&self) -> HttpResponse {
		let status = self.status_code();
		if status.is_server_error() {
			warn!(target: "server", code = self.code(), error = %self, "Request failed");
		}

		HttpResponse::build(status).json(ErrorResponse {
			code: self.code(),
			error: self.to_string(),
		})
	}
}

/// User id set by the upstream authentication layer
fn user_id(req: &HttpRequest) -> Result<UserId, GatewayError> {
	let value = req
		.headers()
		.get(USER_ID_HEADER)
		.ok_or(GatewayError::MissingUserId)?;
	value
		.to_str()
		.ok()
		.and_then(|v| v.trim().parse().ok())
		.ok_or_else(|| {
			GatewayError::InvalidUserId(String::from_utf8_lossy(value.as_bytes()).into_owned())
		})
}

/// Client address for per-client rate limiting
///
/// `X-Forwarded-For` is client-controlled unless a proxy in front rewrites
/// it, so it is only read when `trust_forwarded_for` is set.
fn client_ip(req: &HttpRequest, trust_forwarded_for: bool) -> String {
	if !trust_forwarded_for {
		return req
			.peer_addr()
			.map(|addr| addr.ip().to_string())
			.unwrap_or_else(|| "unknown".to_string());
	}

	let info = req.connection_info();
	let addr = info.realip_remote_addr().unwrap_or("unknown");
	// Strip the port of a bare socket address
	match addr.parse::<std::net::SocketAddr>() {
		Ok(socket) => socket.ip().to_string(),
		Err(_) => addr.to_string(),
	}
}

/// Internal callers present the configured shared secret
fn require_internal(req: &HttpRequest, state: &GatewayState) -> Result<(), GatewayError> {
	let expected = state
		.internal_token
		.as_deref()
		.ok_or(GatewayError::InternalOnly)?;
	let presented = req
		.headers()
		.get(INTERNAL_TOKEN_HEADER)
		.and_then(|v| v.to_str().ok())
		.ok_or(GatewayError::InternalOnly)?;

	if presented.as_bytes() == expected.as_bytes() {
		Ok(())
	} else {
		Err(GatewayError::InternalOnly)
	}
}

/// Health check endpoint
pub async fn health() -> impl Responder {
	HttpResponse::Ok().json(serde_json::json!({
		"status": "ok",
		"service": "flashsale-gateway"
	}))
}

/// Purchase attempt
///
/// A 200 means the reservation was made and the order is being created;
/// poll the result endpoint for its id. Every rejection carries its code.
pub async fn seckill(
	state: web::Data<GatewayState>,
	path: web::Path<GoodsId>,
	req: HttpRequest,
) -> Result<HttpResponse, GatewayError> {
	let goods_id = path.into_inner();
	let user_id = user_id(&req)?;
	let client_ip = client_ip(&req, state.trust_forwarded_for);

	let outcome = state
		.service
		.attempt_seckill(user_id, goods_id, &client_ip)
		.await?;

	Ok(HttpResponse::Ok().json(SeckillResponse { goods_id, outcome }))
}

pub async fn seckill_result(
	state: web::Data<GatewayState>,
	path: web::Path<GoodsId>,
	req: HttpRequest,
) -> Result<HttpResponse, GatewayError> {
	let goods_id = path.into_inner();
	let user_id = user_id(&req)?;

	let result = state.service.get_outcome(user_id, goods_id).await?;
	Ok(HttpResponse::Ok().json(SeckillResultResponse { goods_id, result }))
}

/// Seed the stock counter of one of the caller's goods
pub async fn activate_goods(
	state: web::Data<GatewayState>,
	path: web::Path<GoodsId>,
	req: HttpRequest,
) -> Result<HttpResponse, GatewayError> {
	let goods_id = path.into_inner();
	let seller_id = user_id(&req)?;
	let stock = state.service.activate_goods(seller_id, goods_id).await?;

	Ok(HttpResponse::Ok().json(serde_json::json!({
		"goods_id": goods_id,
		"stock": stock
	})))
}

/// Seed the stock counters of every good the caller sells
pub async fn activate_owner_goods(
	state: web::Data<GatewayState>,
	req: HttpRequest,
) -> Result<HttpResponse, GatewayError> {
	let owner_id = user_id(&req)?;
	let activated = state.service.activate_owner_goods(owner_id).await?;

	Ok(HttpResponse::Ok().json(serde_json::json!({
		"owner_id": owner_id,
		"activated": activated
	})))
}

pub async fn get_order(
	state: web::Data<GatewayState>,
	path: web::Path<String>,
	req: HttpRequest,
) -> Result<HttpResponse, GatewayError> {
	let order_id = path.into_inner();
	let user_id = user_id(&req)?;

	let view = state.service.get_order(user_id, &order_id).await?;
	Ok(HttpResponse::Ok().json(view))
}

pub async fn cancel_order(
	state: web::Data<GatewayState>,
	path: web::Path<String>,
	req: HttpRequest,
) -> Result<HttpResponse, GatewayError> {
	let order_id = path.into_inner();
	let user_id = user_id(&req)?;

	let info = state.service.cancel_order(user_id, &order_id).await?;
	Ok(HttpResponse::Ok().json(info))
}

/// Payment confirmation callback of the payment provider
pub async fn confirm_payment(
	state: web::Data<GatewayState>,
	path: web::Path<String>,
	req: HttpRequest,
) -> Result<HttpResponse, GatewayError> {
	let order_id = path.into_inner();
	require_internal(&req, &state)?;

	let info = state.service.confirm_payment(&order_id).await?;
	Ok(HttpResponse::Ok().json(info))
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use actix_web::{App, test};
	use chrono::{Duration, Utc};
	use flashsale_engine::{
		EngineConfig, MemoryCoordinationStore, MemoryDurableStore, SeckillService,
	};
	use flashsale_sdk::types::{Goods, OrderStatus, OrderView, SeckillOutcome, SeckillResult};

	use super::*;
	use crate::routes::configure_routes;

	fn state() -> GatewayState {
		let durable = Arc::new(MemoryDurableStore::new());
		let now = Utc::now();
		durable
			.insert_goods(Goods {
				id: 1,
				name: "limited sneaker".to_string(),
				img: String::new(),
				origin_price: 999.0,
				price: 99.0,
				amount: 1,
				stock: 1,
				start_time: now - Duration::hours(1),
				end_time: now + Duration::hours(1),
				owner_id: 42,
			})
			.unwrap();
		let service = SeckillService::new(
			Arc::new(MemoryCoordinationStore::new()),
			durable.clone(),
			durable,
			EngineConfig::default(),
		)
		.unwrap();
		GatewayState {
			service: Arc::new(service),
			trust_forwarded_for: false,
			internal_token: Some("payments-secret".to_string()),
		}
	}

	#[actix_web::test]
	async fn test_health() {
		let app = test::init_service(App::new().configure(configure_routes)).await;
		let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
		assert!(resp.status().is_success());
	}

	#[actix_web::test]
	async fn test_seckill_flow() {
		let state = state();
		let service = state.service.clone();
		let app = test::init_service(
			App::new()
				.app_data(web::Data::new(state))
				.configure(configure_routes),
		)
		.await;

		let req = test::TestRequest::post()
			.uri("/api/v1/goods/1/activate")
			.insert_header((USER_ID_HEADER, "42"))
			.to_request();
		assert!(test::call_service(&app, req).await.status().is_success());

		// No user id
		let req = test::TestRequest::post().uri("/api/v1/seckill/1").to_request();
		let resp = test::call_service(&app, req).await;
		assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

		let req = test::TestRequest::post()
			.uri("/api/v1/seckill/1")
			.insert_header((USER_ID_HEADER, "7"))
			.to_request();
		let body: SeckillResponse = test::call_and_read_body_json(&app, req).await;
		assert_eq!(body.outcome, SeckillOutcome::Accepted);

		let req = test::TestRequest::post()
			.uri("/api/v1/seckill/1")
			.insert_header((USER_ID_HEADER, "8"))
			.to_request();
		let resp = test::call_service(&app, req).await;
		assert_eq!(resp.status(), StatusCode::CONFLICT);
		let body: ErrorResponse = test::read_body_json(resp).await;
		assert_eq!(body.code, 5200);

		let intent = service.intent_queue().try_dequeue().await.unwrap().unwrap();
		let order_id = service.create_order_from_intent(intent).await.unwrap().unwrap();

		let req = test::TestRequest::get()
			.uri("/api/v1/seckill/1/result")
			.insert_header((USER_ID_HEADER, "7"))
			.to_request();
		let body: SeckillResultResponse = test::call_and_read_body_json(&app, req).await;
		assert_eq!(
			body.result,
			SeckillResult::Ordered {
				order_id: order_id.clone()
			}
		);

		let req = test::TestRequest::get()
			.uri(&format!("/api/v1/orders/{}", order_id))
			.insert_header((USER_ID_HEADER, "7"))
			.to_request();
		let view: OrderView = test::call_and_read_body_json(&app, req).await;
		assert_eq!(view.info.order_id, order_id);

		let req = test::TestRequest::delete()
			.uri(&format!("/api/v1/orders/{}", order_id))
			.insert_header((USER_ID_HEADER, "8"))
			.to_request();
		assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

		let req = test::TestRequest::delete()
			.uri(&format!("/api/v1/orders/{}", order_id))
			.insert_header((USER_ID_HEADER, "7"))
			.to_request();
		assert!(test::call_service(&app, req).await.status().is_success());

		let req = test::TestRequest::post()
			.uri(&format!("/internal/v1/orders/{}/payment", order_id))
			.insert_header((INTERNAL_TOKEN_HEADER, "payments-secret"))
			.to_request();
		let resp = test::call_service(&app, req).await;
		assert_eq!(resp.status(), StatusCode::CONFLICT);
		let body: ErrorResponse = test::read_body_json(resp).await;
		assert_eq!(body.code, 5310);
	}

	#[actix_web::test]
	async fn test_activation_requires_the_selling_seller() {
		let app = test::init_service(
			App::new()
				.app_data(web::Data::new(state()))
				.configure(configure_routes),
		)
		.await;

		let req = test::TestRequest::post().uri("/api/v1/sellers/activate").to_request();
		assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

		let req = test::TestRequest::post().uri("/api/v1/goods/1/activate").to_request();
		assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

		let req = test::TestRequest::post()
			.uri("/api/v1/goods/1/activate")
			.insert_header((USER_ID_HEADER, "999"))
			.to_request();
		let resp = test::call_service(&app, req).await;
		assert_eq!(resp.status(), StatusCode::FORBIDDEN);
		let body: ErrorResponse = test::read_body_json(resp).await;
		assert_eq!(body.code, 5106);

		// Another seller activates only their own (empty) catalog
		let req = test::TestRequest::post()
			.uri("/api/v1/sellers/activate")
			.insert_header((USER_ID_HEADER, "999"))
			.to_request();
		let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
		assert_eq!(body["activated"], 0);

		let req = test::TestRequest::post()
			.uri("/api/v1/sellers/activate")
			.insert_header((USER_ID_HEADER, "42"))
			.to_request();
		let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
		assert_eq!(body["activated"], 1);
	}

	#[actix_web::test]
	async fn test_buyer_cannot_confirm_own_payment() {
		let state = state();
		let service = state.service.clone();
		let app = test::init_service(
			App::new()
				.app_data(web::Data::new(state))
				.configure(configure_routes),
		)
		.await;

		service.activate_goods(42, 1).await.unwrap();
		service.attempt_seckill(7, 1, "10.0.0.7").await.unwrap();
		let intent = service.intent_queue().try_dequeue().await.unwrap().unwrap();
		let order_id = service.create_order_from_intent(intent).await.unwrap().unwrap();

		// The old buyer-facing path is gone
		let req = test::TestRequest::post()
			.uri(&format!("/api/v1/orders/{}/payment", order_id))
			.insert_header((USER_ID_HEADER, "7"))
			.to_request();
		assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

		// Owner header without the internal token
		let req = test::TestRequest::post()
			.uri(&format!("/internal/v1/orders/{}/payment", order_id))
			.insert_header((USER_ID_HEADER, "7"))
			.to_request();
		let resp = test::call_service(&app, req).await;
		assert_eq!(resp.status(), StatusCode::FORBIDDEN);
		let body: ErrorResponse = test::read_body_json(resp).await;
		assert_eq!(body.code, 4003);

		let req = test::TestRequest::post()
			.uri(&format!("/internal/v1/orders/{}/payment", order_id))
			.insert_header((INTERNAL_TOKEN_HEADER, "guessed"))
			.to_request();
		assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

		let view = service.get_order(7, &order_id).await.unwrap();
		assert_eq!(view.info.status, OrderStatus::Unpaid);

		let req = test::TestRequest::post()
			.uri(&format!("/internal/v1/orders/{}/payment", order_id))
			.insert_header((INTERNAL_TOKEN_HEADER, "payments-secret"))
			.to_request();
		assert!(test::call_service(&app, req).await.status().is_success());
		let view = service.get_order(7, &order_id).await.unwrap();
		assert_eq!(view.info.status, OrderStatus::Paid);
	}

	#[actix_web::test]
	async fn test_internal_routes_disabled_without_token() {
		let state = GatewayState {
			internal_token: None,
			..state()
		};
		let app = test::init_service(
			App::new()
				.app_data(web::Data::new(state))
				.configure(configure_routes),
		)
		.await;

		let req = test::TestRequest::post()
			.uri("/internal/v1/orders/20250101000000000001/payment")
			.insert_header((INTERNAL_TOKEN_HEADER, ""))
			.to_request();
		assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
	}

	#[::core::prelude::v1::test]
	fn test_forwarded_for_ignored_unless_trusted() {
		let peer: std::net::SocketAddr = "203.0.113.9:51000".parse().unwrap();
		let req = test::TestRequest::default()
			.insert_header(("X-Forwarded-For", "198.51.100.1"))
			.peer_addr(peer)
			.to_http_request();

		assert_eq!(client_ip(&req, false), "203.0.113.9");
		assert_eq!(client_ip(&req, true), "198.51.100.1");
	}
}
