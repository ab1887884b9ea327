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

//! ScriptGate Transport Layer
//!
//! Nodes speak JSON-RPC 2.0 over HTTP/1.1. This module holds the helpers
//! shared by the node's HTTP front-end and the client.

pub mod http;

pub use http::{HttpTransport, HyperRequest, HyperResponse};
