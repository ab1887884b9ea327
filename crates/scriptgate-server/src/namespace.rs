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

//! Capability Namespace Builder
//!
//! Builds the closed set of names a script may reference.
//!
//! # Structure
//!
//! - [`CapabilitySet`]: the immutable, thread-safe allow-list. It is built
//!   once per terminal connection epoch and shared through an `Arc`.
//! - [`Namespace`]: a per-execution script engine instantiated from the set
//!   on the executing thread, with every allowed module and helper
//!   registered and a private output buffer. Nothing a script does is
//!   visible to another execution.
//!
//! Names that are not in the set simply do not exist: there is no fallback
//! lookup into the terminal, so calling `mt5::order_send` fails with the
//! same `NameError` as calling `mt5::does_not_exist`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use parking_lot::Mutex;
use rhai::packages::{Package, StandardPackage};
use scriptgate_common::GateError;
use tracing::{debug, info};

use crate::runtime::{bindings, helpers, indicators, table, types};
use crate::terminal::TerminalGateway;

/// Names that never appear in a namespace unless the policy is changed.
pub const DEFAULT_FORBIDDEN: &[&str] = &[
    "start",
    "stop",
    "initialize",
    "shutdown",
    "login",
    "order_send",
    "order_check",
];

/// Keywords scripts may not use.
const DISABLED_SYMBOLS: &[&str] = &["eval", "import", "export"];

/// Collects the names a module actually binds, skipping forbidden ones.
pub struct Exports<'a> {
    policy: &'a NamespacePolicy,
    names: Vec<String>,
}

impl<'a> Exports<'a> {
    pub fn new(policy: &'a NamespacePolicy) -> Self {
        Self {
            policy,
            names: Vec::new(),
        }
    }

    /// Whether `name` may be bound. Allowed names are recorded once.
    pub fn allows(&mut self, name: &str) -> bool {
        if self.policy.is_forbidden(name) {
            return false;
        }
        if !self.names.iter().any(|n| n == name) {
            self.names.push(name.to_string());
        }
        true
    }

    pub fn into_names(self) -> Vec<String> {
        self.names
    }
}

/// Immutable allow-list shared by every execution of one epoch.
pub struct CapabilitySet {
    gateway: Option<Arc<TerminalGateway>>,
    policy: NamespacePolicy,
    globals: Vec<String>,
    modules: BTreeMap<String, Vec<String>>,
    epoch: u64,
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilitySet")
            .field("epoch", &self.epoch)
            .field("globals", &self.globals)
            .field("modules", &self.modules)
            .finish_non_exhaustive()
    }
}

impl CapabilitySet {
    /// Builds a set over `gateway`, dropping everything the policy forbids.
    ///
    /// Forbidden names are removed both at the top level and inside
    /// modules. Without a gateway there is no `mt5` module.
    pub fn new(gateway: Option<Arc<TerminalGateway>>, policy: NamespacePolicy) -> Self {
        let sample = Namespace::load(gateway.as_ref(), &policy);
        Self {
            globals: sample.globals,
            modules: sample.modules,
            gateway,
            policy,
            epoch: 0,
        }
    }

    fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }

    /// Connection epoch this set was built for.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether `name` is a global function or a module.
    pub fn contains(&self, name: &str) -> bool {
        self.globals.iter().any(|g| g == name) || self.modules.contains_key(name)
    }

    /// Global functions, then module names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.globals
            .iter()
            .chain(self.modules.keys())
            .map(String::as_str)
    }

    /// Members of `module`, if it is bound.
    pub fn members(&self, module: &str) -> Option<&[String]> {
        self.modules.get(module).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.globals.len() + self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fresh namespace for one execution. Call it on the executing thread.
    pub fn instantiate(&self) -> Namespace {
        Namespace::load(self.gateway.as_ref(), &self.policy)
    }
}

fn install(
    engine: &mut rhai::Engine,
    modules: &mut BTreeMap<String, Vec<String>>,
    policy: &NamespacePolicy,
    name: &str,
    build: impl FnOnce(&mut Exports<'_>) -> rhai::Module,
) {
    if policy.is_forbidden(name) {
        return;
    }
    let mut exports = Exports::new(policy);
    let module = build(&mut exports);
    engine.register_static_module(name, module.into());
    modules.insert(name.to_string(), exports.into_names());
}

/// Script engine for one execution.
///
/// Holds non-`Send` engine state, so it stays on the thread running the script.
pub struct Namespace {
    engine: rhai::Engine,
    output: Rc<RefCell<String>>,
    globals: Vec<String>,
    modules: BTreeMap<String, Vec<String>>,
    forbidden: Vec<String>,
}

impl Namespace {
    fn load(gateway: Option<&Arc<TerminalGateway>>, policy: &NamespacePolicy) -> Self {
        let output = Rc::new(RefCell::new(String::new()));
        let mut engine = rhai::Engine::new_raw();
        engine.register_global_module(StandardPackage::new().as_shared_module());
        engine.set_strict_variables(true);
        for symbol in DISABLED_SYMBOLS {
            engine.disable_symbol(*symbol);
        }

        let sink = Rc::clone(&output);
        engine.on_print(move |text| {
            let mut out = sink.borrow_mut();
            out.push_str(text);
            out.push('\n');
        });
        let sink = Rc::clone(&output);
        engine.on_debug(move |text, _, _| {
            let mut out = sink.borrow_mut();
            out.push_str(text);
            out.push('\n');
        });

        types::register(&mut engine);
        table::register(&mut engine);

        let mut exports = Exports::new(policy);
        engine.register_global_module(helpers::global_module(&mut exports).into());
        let globals = exports.into_names();

        let mut modules = BTreeMap::new();
        install(&mut engine, &mut modules, policy, "stats", helpers::stats_module);
        install(&mut engine, &mut modules, policy, "pd", helpers::pandas_module);
        install(&mut engine, &mut modules, policy, "datetime", helpers::datetime_module);
        install(&mut engine, &mut modules, policy, "ta", indicators::module);
        if let Some(gateway) = gateway {
            install(&mut engine, &mut modules, policy, "mt5", |exports| {
                bindings::mt5_module(gateway, exports)
            });
        }

        Self {
            engine,
            output,
            globals,
            modules,
            forbidden: policy.forbidden().to_vec(),
        }
    }

    pub fn engine(&self) -> &rhai::Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut rhai::Engine {
        &mut self.engine
    }

    /// Everything printed so far; the buffer is left empty.
    pub fn take_output(&self) -> String {
        std::mem::take(&mut *self.output.borrow_mut())
    }

    pub fn module_members(&self, module: &str) -> Option<&[String]> {
        self.modules.get(module).map(Vec::as_slice)
    }

    pub fn is_forbidden(&self, name: &str) -> bool {
        self.forbidden.iter().any(|f| f == name)
    }

    /// Whether `name` (or `module::name`) is a function this namespace provides.
    pub fn is_bound(&self, name: &str) -> bool {
        if let Some((module, member)) = name.split_once("::") {
            return self
                .module_members(module)
                .is_some_and(|members| members.iter().any(|m| m == member));
        }
        self.globals.iter().any(|g| g == name)
            || types::METHODS.contains(&name)
            || table::METHODS.contains(&name)
    }
}

/// Which names must never be exposed.
#[derive(Debug, Clone)]
pub struct NamespacePolicy {
    forbidden: Vec<String>,
}

impl Default for NamespacePolicy {
    fn default() -> Self {
        Self {
            forbidden: DEFAULT_FORBIDDEN.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl NamespacePolicy {
    pub fn new(forbidden: Vec<String>) -> Self {
        Self { forbidden }
    }

    pub fn forbid(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.forbidden.contains(&name) {
            self.forbidden.push(name);
        }
        self
    }

    pub fn is_forbidden(&self, name: &str) -> bool {
        self.forbidden.iter().any(|f| f == name)
    }

    pub fn forbidden(&self) -> &[String] {
        &self.forbidden
    }
}

/// Produces the [`CapabilitySet`] for the current connection.
///
/// The set is cached and rebuilt only when the gateway's epoch changes,
/// i.e. when the connection has been re-established.
pub struct NamespaceBuilder {
    gateway: Arc<TerminalGateway>,
    policy: NamespacePolicy,
    cache: Mutex<Option<Arc<CapabilitySet>>>,
}

impl NamespaceBuilder {
    pub fn new(gateway: Arc<TerminalGateway>, policy: NamespacePolicy) -> Self {
        Self {
            gateway,
            policy,
            cache: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> &NamespacePolicy {
        &self.policy
    }

    /// Returns the capability set for the active connection.
    ///
    /// # Errors
    ///
    /// Returns `GateError::Lifecycle` if the terminal connection is not active.
    pub fn build(&self) -> Result<Arc<CapabilitySet>, GateError> {
        if !self.gateway.is_active() {
            return Err(GateError::Lifecycle(format!(
                "cannot build namespace: terminal connection is {}",
                self.gateway.state()
            )));
        }

        let epoch = self.gateway.epoch();
        let mut cache = self.cache.lock();
        if let Some(set) = cache.as_ref().filter(|set| set.epoch() == epoch) {
            return Ok(Arc::clone(set));
        }

        let set = Arc::new(
            CapabilitySet::new(Some(Arc::clone(&self.gateway)), self.policy.clone())
                .with_epoch(epoch),
        );
        info!(epoch, bindings = set.len(), "Built capability set");
        debug!(names = ?set.names().collect::<Vec<_>>(), "Capability names");
        *cache = Some(Arc::clone(&set));
        Ok(set)
    }
}
