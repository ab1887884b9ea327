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

/// Registers `$func` as `$name` in `$module` unless the policy forbids it.
macro_rules! export {
    ($exports:expr, $module:expr, $name:expr, $func:expr) => {
        if $exports.allows($name) {
            $module.set_native_fn($name, $func);
        }
    };
}

pub mod engine;
pub mod format;
pub mod resolve;
pub mod rewrite;

pub(crate) mod bindings;
pub(crate) mod conversions;
pub(crate) mod errors;
pub(crate) mod helpers;
pub(crate) mod indicators;
pub(crate) mod table;
pub(crate) mod types;


pub use engine::{Engine, ErrorInfo, ExecutionResult, TraceFrame, RESULT_NAMES};
pub use format::NO_OUTPUT;
pub use rewrite::RESULT_SLOT;
