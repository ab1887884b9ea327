// Copyright 2025 ScriptGate Authors
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

//! ScriptGate Client
//!
//! An async JSON-RPC client for ScriptGate nodes.
//!
//! ```no_run
//! use scriptgate_client::GateClient;
//! use scriptgate_common::ScriptRequest;
//!
//! # async fn run() -> scriptgate_common::Result<()> {
//! let client = GateClient::new("http://127.0.0.1:8080")?;
//! let output = client.execute(&ScriptRequest::new("result = 2 + 2")).await?;
//! println!("{}", output);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod retry;

pub use client::GateClient;
pub use retry::RetryConfig;
