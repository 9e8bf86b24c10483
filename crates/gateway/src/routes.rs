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

use actix_web::web;

use crate::handlers;

/// Configure API routes for the gateway
///
/// - `/api/v1/seckill` - Purchase attempts and their results
/// - `/api/v1/goods`, `/api/v1/sellers` - Sale activation by the selling seller
/// - `/api/v1/orders` - Order view and cancel
/// - `/internal/v1/orders` - Payment confirmation, internal token only
/// - `/health` - Health check endpoint
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
	cfg.service(
		web::scope("/api/v1")
			.route("/seckill/{goods_id}", web::post().to(handlers::seckill))
			.route(
				"/seckill/{goods_id}/result",
				web::get().to(handlers::seckill_result),
			)
			.route(
				"/goods/{goods_id}/activate",
				web::post().to(handlers::activate_goods),
			)
			.route(
				"/sellers/activate",
				web::post().to(handlers::activate_owner_goods),
			)
			.route("/orders/{order_id}", web::get().to(handlers::get_order))
			.route(
				"/orders/{order_id}",
				web::delete().to(handlers::cancel_order),
			),
	)
	.service(web::scope("/internal/v1").route(
		"/orders/{order_id}/payment",
		web::post().to(handlers::confirm_payment),
	))
	.route("/health", web::get().to(handlers::health));
}
