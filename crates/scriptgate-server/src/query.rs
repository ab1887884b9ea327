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


//! Structured terminal queries.
//!
//! A query names one read-only terminal operation and passes its arguments
//! as JSON. There is no script involved: the operation is looked up in a
//! fixed table, the parameters are checked and converted, and the terminal
//! result comes back as JSON.
//!
//! # Parameters
//!
//! | Operation | Parameters |
//! |-----------|------------|
//! | `copy_rates_from` | `timeframe`, `date_from`, `count` |
//! | `copy_rates_from_pos` | `timeframe`, `start_pos` (0), `count` |
//! | `copy_rates_range` | `timeframe`, `date_from`, `date_to` |
//! | `copy_ticks_from` | `date_from`, `count`, `flags` (all) |
//! | `copy_ticks_range` | `date_from`, `date_to`, `flags` (all) |
//! | `symbol_select` | `enable` (true) |
//! | `symbols_get` | `group` (optional) |
//! | `order_calc_margin` | `order_type`, `volume`, `price` |
//! | `order_calc_profit` | `order_type`, `volume`, `price_open`, `price_close` |
//!
//! Every `copy_*`, `symbol_*` and `order_calc_*` operation also needs a
//! symbol, given either as the request's `symbol` or as a parameter.
//! Timeframes are names such as `"H1"` or `"TIMEFRAME_H1"`, or the numeric
//! code. Dates are Unix seconds or ISO-8601 strings, taken as UTC. Order
//! types are `"buy"`, `"sell"`, `0` or `1`.

use chrono::{NaiveDate, NaiveDateTime};
use scriptgate_common::{GateError, QueryRequest, Result};
use serde_json::{Map, Value};
use tracing::debug;

use crate::namespace::NamespacePolicy;
use crate::runtime::conversions::datum_to_json;
use crate::terminal::{Datum, TerminalGateway, TIMEFRAMES};

const COPY_TICKS_ALL: i64 = -1;

/// A read-only terminal operation reachable through a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOperation {
    CopyRatesFrom,
    CopyRatesFromPos,
    CopyRatesRange,
    CopyTicksFrom,
    CopyTicksRange,
    SymbolInfo,
    SymbolInfoTick,
    SymbolSelect,
    SymbolsTotal,
    SymbolsGet,
    AccountInfo,
    TerminalInfo,
    Version,
    OrderCalcMargin,
    OrderCalcProfit,
}

impl QueryOperation {
    pub const ALL: [QueryOperation; 15] = [
        QueryOperation::CopyRatesFrom,
        QueryOperation::CopyRatesFromPos,
        QueryOperation::CopyRatesRange,
        QueryOperation::CopyTicksFrom,
        QueryOperation::CopyTicksRange,
        QueryOperation::SymbolInfo,
        QueryOperation::SymbolInfoTick,
        QueryOperation::SymbolSelect,
        QueryOperation::SymbolsTotal,
        QueryOperation::SymbolsGet,
        QueryOperation::AccountInfo,
        QueryOperation::TerminalInfo,
        QueryOperation::Version,
        QueryOperation::OrderCalcMargin,
        QueryOperation::OrderCalcProfit,
    ];

    pub fn name(self) -> &'static str {
        match self {
            QueryOperation::CopyRatesFrom => "copy_rates_from",
            QueryOperation::CopyRatesFromPos => "copy_rates_from_pos",
            QueryOperation::CopyRatesRange => "copy_rates_range",
            QueryOperation::CopyTicksFrom => "copy_ticks_from",
            QueryOperation::CopyTicksRange => "copy_ticks_range",
            QueryOperation::SymbolInfo => "symbol_info",
            QueryOperation::SymbolInfoTick => "symbol_info_tick",
            QueryOperation::SymbolSelect => "symbol_select",
            QueryOperation::SymbolsTotal => "symbols_total",
            QueryOperation::SymbolsGet => "symbols_get",
            QueryOperation::AccountInfo => "account_info",
            QueryOperation::TerminalInfo => "terminal_info",
            QueryOperation::Version => "version",
            QueryOperation::OrderCalcMargin => "order_calc_margin",
            QueryOperation::OrderCalcProfit => "order_calc_profit",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }
}

/// The operations `policy` leaves available, in table order.
pub fn available(policy: &NamespacePolicy) -> Vec<&'static str> {
    QueryOperation::ALL
        .into_iter()
        .map(QueryOperation::name)
        .filter(|name| !policy.is_forbidden(name))
        .collect()
}

/// Runs `request` against the terminal and returns the result as JSON.
///
/// # Errors
///
/// - `GateError::InvalidRequest` for an unknown or forbidden operation, a
///   missing symbol, or a parameter that is missing or has the wrong type
/// - `GateError::Lifecycle` if the terminal connection is not active
/// - `GateError::Resource` if the terminal rejects the call
pub fn dispatch(
    gateway: &TerminalGateway,
    policy: &NamespacePolicy,
    request: &QueryRequest,
) -> Result<Value> {
    let operation = QueryOperation::from_name(&request.operation)
        .filter(|op| !policy.is_forbidden(op.name()))
        .ok_or_else(|| {
            GateError::InvalidRequest(format!(
                "operation '{}' is not available. Available: {}",
                request.operation,
                available(policy).join(", ")
            ))
        })?;

    let params = Params::new(operation, request)?;
    debug!(operation = operation.name(), symbol = ?params.symbol, "Dispatching query");
    let datum = run(gateway, operation, &params)?;
    Ok(datum_to_json(&datum))
}

fn run(gateway: &TerminalGateway, operation: QueryOperation, params: &Params<'_>) -> Result<Datum> {
    let name = operation.name();
    match operation {
        QueryOperation::Version => gateway.call(name, |t| t.version()),
        QueryOperation::TerminalInfo => gateway.call(name, |t| t.terminal_info()),
        QueryOperation::AccountInfo => gateway.call(name, |t| t.account_info()),
        QueryOperation::SymbolsTotal => gateway.call(name, |t| t.symbols_total()),
        QueryOperation::SymbolsGet => {
            let group = params.string("group")?.filter(|g| !g.is_empty());
            gateway.call(name, |t| t.symbols_get(group))
        }
        QueryOperation::SymbolInfo => {
            let symbol = params.symbol()?;
            gateway.call(name, |t| t.symbol_info(symbol))
        }
        QueryOperation::SymbolInfoTick => {
            let symbol = params.symbol()?;
            gateway.call(name, |t| t.symbol_info_tick(symbol))
        }
        QueryOperation::SymbolSelect => {
            let symbol = params.symbol()?;
            let enable = params.flag("enable", true)?;
            gateway.call(name, |t| t.symbol_select(symbol, enable))
        }
        QueryOperation::CopyRatesFrom => {
            let symbol = params.symbol()?;
            let timeframe = params.timeframe()?;
            let date_from = params.timestamp("date_from")?;
            let count = params.count("count")?;
            gateway.call(name, |t| t.copy_rates_from(symbol, timeframe, date_from, count))
        }
        QueryOperation::CopyRatesFromPos => {
            let symbol = params.symbol()?;
            let timeframe = params.timeframe()?;
            let start_pos = params.count_or("start_pos", 0)?;
            let count = params.count("count")?;
            gateway.call(name, |t| t.copy_rates_from_pos(symbol, timeframe, start_pos, count))
        }
        QueryOperation::CopyRatesRange => {
            let symbol = params.symbol()?;
            let timeframe = params.timeframe()?;
            let date_from = params.timestamp("date_from")?;
            let date_to = params.timestamp("date_to")?;
            gateway.call(name, |t| t.copy_rates_range(symbol, timeframe, date_from, date_to))
        }
        QueryOperation::CopyTicksFrom => {
            let symbol = params.symbol()?;
            let date_from = params.timestamp("date_from")?;
            let count = params.count("count")?;
            let flags = params.int_or("flags", COPY_TICKS_ALL)?;
            gateway.call(name, |t| t.copy_ticks_from(symbol, date_from, count, flags))
        }
        QueryOperation::CopyTicksRange => {
            let symbol = params.symbol()?;
            let date_from = params.timestamp("date_from")?;
            let date_to = params.timestamp("date_to")?;
            let flags = params.int_or("flags", COPY_TICKS_ALL)?;
            gateway.call(name, |t| t.copy_ticks_range(symbol, date_from, date_to, flags))
        }
        QueryOperation::OrderCalcMargin => {
            let symbol = params.symbol()?;
            let action = params.order_type()?;
            let volume = params.float("volume")?;
            let price = params.float("price")?;
            gateway.call(name, |t| t.order_calc_margin(action, symbol, volume, price))
        }
        QueryOperation::OrderCalcProfit => {
            let symbol = params.symbol()?;
            let action = params.order_type()?;
            let volume = params.float("volume")?;
            let price_open = params.float("price_open")?;
            let price_close = params.float("price_close")?;
            gateway.call(name, |t| {
                t.order_calc_profit(action, symbol, volume, price_open, price_close)
            })
        }
    }
}

/// Checked access to a query's parameters.
struct Params<'a> {
    operation: QueryOperation,
    symbol: Option<String>,
    values: &'a Map<String, Value>,
}

impl<'a> Params<'a> {
    fn new(operation: QueryOperation, request: &'a QueryRequest) -> Result<Self> {
        let symbol = match &request.symbol {
            Some(symbol) => Some(symbol.clone()),
            None => match request.parameters.get("symbol") {
                None | Some(Value::Null) => None,
                Some(Value::String(symbol)) => Some(symbol.clone()),
                Some(other) => {
                    return Err(invalid(operation, "symbol", "a string", other));
                }
            },
        }
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty());

        Ok(Self {
            operation,
            symbol,
            values: &request.parameters,
        })
    }

    fn symbol(&self) -> Result<&str> {
        self.symbol.as_deref().ok_or_else(|| {
            GateError::InvalidRequest(format!("{} requires a symbol", self.operation.name()))
        })
    }

    fn get(&self, name: &str) -> Option<&'a Value> {
        self.values.get(name).filter(|v| !v.is_null())
    }

    fn require(&self, name: &str) -> Result<&'a Value> {
        self.get(name).ok_or_else(|| {
            GateError::InvalidRequest(format!(
                "{} requires parameter '{}'",
                self.operation.name(),
                name
            ))
        })
    }

    fn string(&self, name: &str) -> Result<Option<&'a str>> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(invalid(self.operation, name, "a string", other)),
        }
    }

    fn flag(&self, name: &str, default: bool) -> Result<bool> {
        match self.get(name) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(invalid(self.operation, name, "a boolean", other)),
        }
    }

    fn int(&self, name: &str) -> Result<i64> {
        let value = self.require(name)?;
        value
            .as_i64()
            .ok_or_else(|| invalid(self.operation, name, "an integer", value))
    }

    fn int_or(&self, name: &str, default: i64) -> Result<i64> {
        match self.get(name) {
            None => Ok(default),
            Some(_) => self.int(name),
        }
    }

    fn count(&self, name: &str) -> Result<usize> {
        let value = self.require(name)?;
        value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| invalid(self.operation, name, "a non-negative integer", value))
    }

    fn count_or(&self, name: &str, default: usize) -> Result<usize> {
        match self.get(name) {
            None => Ok(default),
            Some(_) => self.count(name),
        }
    }

    fn float(&self, name: &str) -> Result<f64> {
        let value = self.require(name)?;
        value
            .as_f64()
            .ok_or_else(|| invalid(self.operation, name, "a number", value))
    }

    fn timeframe(&self) -> Result<i64> {
        let value = self.require("timeframe")?;
        let code = match value {
            Value::String(s) => timeframe_code(s),
            Value::Number(n) => n
                .as_i64()
                .filter(|code| TIMEFRAMES.iter().any(|(_, c)| c == code)),
            _ => None,
        };
        code.ok_or_else(|| {
            let valid: Vec<&str> = TIMEFRAMES
                .iter()
                .map(|(name, _)| name.trim_start_matches("TIMEFRAME_"))
                .collect();
            GateError::InvalidRequest(format!(
                "invalid timeframe {}. Valid: {}",
                value,
                valid.join(", ")
            ))
        })
    }

    fn order_type(&self) -> Result<i64> {
        let value = match self.get("order_type") {
            Some(value) => value,
            None => self.require("action")?,
        };
        let code = match value {
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "buy" => Some(0),
                "sell" => Some(1),
                _ => None,
            },
            Value::Number(n) => n.as_i64().filter(|code| matches!(*code, 0 | 1)),
            _ => None,
        };
        code.ok_or_else(|| {
            GateError::InvalidRequest(format!("invalid order_type {}. Valid: buy, sell", value))
        })
    }

    fn timestamp(&self, name: &str) -> Result<i64> {
        let value = self.require(name)?;
        let seconds = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => parse_timestamp(s),
            _ => None,
        };
        seconds.ok_or_else(|| invalid(self.operation, name, "Unix seconds or an ISO-8601 date", value))
    }
}

fn invalid(operation: QueryOperation, name: &str, expected: &str, got: &Value) -> GateError {
    GateError::InvalidRequest(format!(
        "{} parameter '{}' must be {}, got {}",
        operation.name(),
        name,
        expected,
        got
    ))
}

/// `"H1"`, `"h1"` and `"TIMEFRAME_H1"` all name the same code.
fn timeframe_code(name: &str) -> Option<i64> {
    let upper = name.trim().to_ascii_uppercase();
    let short = upper.trim_start_matches("TIMEFRAME_");
    TIMEFRAMES
        .iter()
        .find(|(full, _)| full.trim_start_matches("TIMEFRAME_") == short)
        .map(|(_, code)| *code)
}

fn parse_timestamp(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp());
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.and_utc().timestamp());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}
