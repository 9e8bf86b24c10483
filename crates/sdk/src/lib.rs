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

//! Flash-sale SDK
//!
//! Shared domain types for the seckill pipeline and an async HTTP client
//! for the gateway.

pub mod client;
pub mod types;

pub use client::{Client, ClientError, INTERNAL_TOKEN_HEADER, USER_ID_HEADER};
pub use types::*;
