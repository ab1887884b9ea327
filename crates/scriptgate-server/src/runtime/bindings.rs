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

//! Terminal bindings (`mt5` module).
//!
//! These are the only functions through which a script reaches the terminal.
//!
//! # Script API
//!
//! - `mt5::version()`, `mt5::terminal_info()`, `mt5::account_info()`, `mt5::last_error()`
//! - `mt5::symbols_total()`, `mt5::symbols_get()`, `mt5::symbols_get(group)`,
//!   `mt5::symbol_info(symbol)`, `mt5::symbol_info_tick(symbol)`,
//!   `mt5::symbol_select(symbol)`, `mt5::symbol_select(symbol, enable)`
//! - `mt5::copy_rates_from(symbol, timeframe, date_from, count)`,
//!   `mt5::copy_rates_from_pos(symbol, timeframe, start_pos, count)`,
//!   `mt5::copy_rates_range(symbol, timeframe, date_from, date_to)`
//! - `mt5::copy_ticks_from(symbol, date_from, count)` with an optional trailing `flags`,
//!   `mt5::copy_ticks_range(symbol, date_from, date_to)` likewise
//! - `mt5::order_calc_margin(action, symbol, volume, price)`,
//!   `mt5::order_calc_profit(action, symbol, volume, price_open, price_close)`
//!
//! Dates are Unix seconds or `datetime` values (taken as UTC).
//!
//! # Safety
//!
//! Each binding holds its own `Arc` of the gateway and goes through
//! [`TerminalGateway::call`], so every terminal access is serialized and a
//! rejected call surfaces as a `ResourceError` raised inside the script.

use std::sync::Arc;

use rhai::{Array, Dynamic, ImmutableString, Module, INT};

use super::conversions::{count_arg, datum_to_dynamic, float_arg, timestamp_arg};
use super::errors::{raise, ScriptResult};
use crate::namespace::Exports;
use crate::terminal::{Datum, Terminal, TerminalGateway, TIMEFRAMES};

const CONSTANTS: &[(&str, i64)] = &[
    ("ORDER_TYPE_BUY", 0),
    ("ORDER_TYPE_SELL", 1),
    ("COPY_TICKS_ALL", -1),
    ("COPY_TICKS_INFO", 1),
    ("COPY_TICKS_TRADE", 2),
];

/// Every tick, not just quotes or trades.
const COPY_TICKS_ALL: INT = -1;

/// Runs one terminal operation through the gateway and converts the result.
fn fetch<F>(gateway: &TerminalGateway, operation: &str, f: F) -> ScriptResult<Dynamic>
where
    F: FnOnce(&mut dyn Terminal) -> Option<Datum>,
{
    gateway
        .call(operation, f)
        .map(|datum| datum_to_dynamic(&datum))
        .map_err(raise)
}

fn ticks_from(
    gw: &TerminalGateway,
    symbol: &str,
    date_from: &Dynamic,
    count: INT,
    flags: INT,
) -> ScriptResult<Dynamic> {
    const FN: &str = "copy_ticks_from";
    let date_from = timestamp_arg(FN, "date_from", date_from)?;
    let n = count_arg(FN, "count", count)?;
    fetch(gw, FN, |t| t.copy_ticks_from(symbol, date_from, n, flags))
}

fn ticks_range(
    gw: &TerminalGateway,
    symbol: &str,
    date_from: &Dynamic,
    date_to: &Dynamic,
    flags: INT,
) -> ScriptResult<Dynamic> {
    const FN: &str = "copy_ticks_range";
    let date_from = timestamp_arg(FN, "date_from", date_from)?;
    let date_to = timestamp_arg(FN, "date_to", date_to)?;
    fetch(gw, FN, |t| t.copy_ticks_range(symbol, date_from, date_to, flags))
}

/// Builds the `mt5` module over `gateway`.
///
/// Only read-only operations are bound; lifecycle and trading operations do
/// not exist in the module at all.
pub fn mt5_module(gateway: &Arc<TerminalGateway>, exports: &mut Exports<'_>) -> Module {
    let mut module = Module::new();

    export!(exports, module, "version", {
        let gw = Arc::clone(gateway);
        move || fetch(&gw, "version", |t| t.version())
    });
    export!(exports, module, "terminal_info", {
        let gw = Arc::clone(gateway);
        move || fetch(&gw, "terminal_info", |t| t.terminal_info())
    });
    export!(exports, module, "account_info", {
        let gw = Arc::clone(gateway);
        move || fetch(&gw, "account_info", |t| t.account_info())
    });
    export!(exports, module, "last_error", {
        let gw = Arc::clone(gateway);
        move || -> ScriptResult<Array> {
            let fault = gw.call("last_error", |t| Some(t.last_error())).map_err(raise)?;
            Ok(vec![Dynamic::from(fault.code), Dynamic::from(fault.message)])
        }
    });
    export!(exports, module, "symbols_total", {
        let gw = Arc::clone(gateway);
        move || fetch(&gw, "symbols_total", |t| t.symbols_total())
    });
    export!(exports, module, "symbols_get", {
        let gw = Arc::clone(gateway);
        move || fetch(&gw, "symbols_get", |t| t.symbols_get(None))
    });
    export!(exports, module, "symbols_get", {
        let gw = Arc::clone(gateway);
        move |group: ImmutableString| fetch(&gw, "symbols_get", |t| t.symbols_get(Some(group.as_str())))
    });
    export!(exports, module, "symbol_info", {
        let gw = Arc::clone(gateway);
        move |symbol: ImmutableString| fetch(&gw, "symbol_info", |t| t.symbol_info(&symbol))
    });
    export!(exports, module, "symbol_info_tick", {
        let gw = Arc::clone(gateway);
        move |symbol: ImmutableString| {
            fetch(&gw, "symbol_info_tick", |t| t.symbol_info_tick(&symbol))
        }
    });
    export!(exports, module, "symbol_select", {
        let gw = Arc::clone(gateway);
        move |symbol: ImmutableString| {
            fetch(&gw, "symbol_select", |t| t.symbol_select(&symbol, true))
        }
    });
    export!(exports, module, "symbol_select", {
        let gw = Arc::clone(gateway);
        move |symbol: ImmutableString, enable: bool| {
            fetch(&gw, "symbol_select", |t| t.symbol_select(&symbol, enable))
        }
    });
    export!(exports, module, "copy_rates_from", {
        let gw = Arc::clone(gateway);
        move |symbol: ImmutableString, timeframe: INT, date_from: Dynamic, count: INT| {
            const FN: &str = "copy_rates_from";
            let date_from = timestamp_arg(FN, "date_from", &date_from)?;
            let n = count_arg(FN, "count", count)?;
            fetch(&gw, FN, |t| t.copy_rates_from(&symbol, timeframe, date_from, n))
        }
    });
    export!(exports, module, "copy_rates_from_pos", {
        let gw = Arc::clone(gateway);
        move |symbol: ImmutableString, timeframe: INT, start_pos: INT, count: INT| {
            const FN: &str = "copy_rates_from_pos";
            let start = count_arg(FN, "start_pos", start_pos)?;
            let n = count_arg(FN, "count", count)?;
            fetch(&gw, FN, |t| t.copy_rates_from_pos(&symbol, timeframe, start, n))
        }
    });
    export!(exports, module, "copy_rates_range", {
        let gw = Arc::clone(gateway);
        move |symbol: ImmutableString, timeframe: INT, date_from: Dynamic, date_to: Dynamic| {
            const FN: &str = "copy_rates_range";
            let date_from = timestamp_arg(FN, "date_from", &date_from)?;
            let date_to = timestamp_arg(FN, "date_to", &date_to)?;
            fetch(&gw, FN, |t| t.copy_rates_range(&symbol, timeframe, date_from, date_to))
        }
    });
    export!(exports, module, "copy_ticks_from", {
        let gw = Arc::clone(gateway);
        move |symbol: ImmutableString, date_from: Dynamic, count: INT| {
            ticks_from(&gw, &symbol, &date_from, count, COPY_TICKS_ALL)
        }
    });
    export!(exports, module, "copy_ticks_from", {
        let gw = Arc::clone(gateway);
        move |symbol: ImmutableString, date_from: Dynamic, count: INT, flags: INT| {
            ticks_from(&gw, &symbol, &date_from, count, flags)
        }
    });
    export!(exports, module, "copy_ticks_range", {
        let gw = Arc::clone(gateway);
        move |symbol: ImmutableString, date_from: Dynamic, date_to: Dynamic| {
            ticks_range(&gw, &symbol, &date_from, &date_to, COPY_TICKS_ALL)
        }
    });
    export!(exports, module, "copy_ticks_range", {
        let gw = Arc::clone(gateway);
        move |symbol: ImmutableString, date_from: Dynamic, date_to: Dynamic, flags: INT| {
            ticks_range(&gw, &symbol, &date_from, &date_to, flags)
        }
    });
    export!(exports, module, "order_calc_margin", {
        let gw = Arc::clone(gateway);
        move |action: INT, symbol: ImmutableString, volume: Dynamic, price: Dynamic| {
            const FN: &str = "order_calc_margin";
            let volume = float_arg(FN, "volume", &volume)?;
            let price = float_arg(FN, "price", &price)?;
            fetch(&gw, FN, |t| t.order_calc_margin(action, &symbol, volume, price))
        }
    });
    export!(exports, module, "order_calc_profit", {
        let gw = Arc::clone(gateway);
        move |action: INT,
              symbol: ImmutableString,
              volume: Dynamic,
              price_open: Dynamic,
              price_close: Dynamic| {
            const FN: &str = "order_calc_profit";
            let volume = float_arg(FN, "volume", &volume)?;
            let open = float_arg(FN, "price_open", &price_open)?;
            let close = float_arg(FN, "price_close", &price_close)?;
            fetch(&gw, FN, |t| t.order_calc_profit(action, &symbol, volume, open, close))
        }
    });

    for (name, value) in TIMEFRAMES.iter().chain(CONSTANTS) {
        if exports.allows(name) {
            module.set_var(*name, *value);
        }
    }
    module
}
