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

//! OpenTelemetry export for the gateway
//!
//! Export is opt-in: when `OTEL_EXPORTER_OTLP_ENDPOINT` is set (e.g.
//! `http://localhost:4317`) spans are batched to that collector over gRPC;
//! otherwise no tracer is installed and only the log layers are active.
//!
//! W3C Trace Context (`traceparent`, `tracestate`) is registered as the
//! global propagator either way. Sampling is `ParentBased(AlwaysOn)`.

use anyhow::{Context, Result};
use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
	propagation::TraceContextPropagator, resource::Resource, trace as sdktrace,
};

/// Service name for OpenTelemetry resource identification
const SERVICE_NAME: &str = "flashsale-gateway";

/// Build the OTLP tracer, or `None` when no collector is configured
pub fn init_tracer() -> Result<Option<sdktrace::Tracer>> {
	global::set_text_map_propagator(TraceContextPropagator::new());

	let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") else {
		return Ok(None);
	};

	let trace_config = sdktrace::Config::default()
		.with_sampler(sdktrace::Sampler::ParentBased(Box::new(
			sdktrace::Sampler::AlwaysOn,
		)))
		.with_resource(Resource::new(vec![KeyValue::new(
			"service.name",
			SERVICE_NAME,
		)]));

	let exporter = opentelemetry_otlp::new_exporter()
		.tonic()
		.with_endpoint(endpoint.clone());
	let tracer = opentelemetry_otlp::new_pipeline()
		.tracing()
		.with_exporter(exporter)
		.with_trace_config(trace_config)
		.install_batch(opentelemetry_sdk::runtime::Tokio)
		.with_context(|| format!("Failed to install OTLP pipeline for {}", endpoint))?;

	Ok(Some(tracer))
}
