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

//! Deterministic in-process terminal.
//!
//! Prices are a pure function of `(seed, symbol, bar time)`: a slow sine
//! drift plus seeded noise, with every bar opening at the previous bar's
//! close. The same request therefore always returns the same data, which
//! keeps tests and demos reproducible without a real terminal.

use std::collections::HashMap;
use std::f64::consts::TAU;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scriptgate_common::TerminalFault;
use tracing::debug;

use super::{Datum, Terminal};

const NOT_FOUND: i64 = -4;
const INVALID_PARAMS: i64 = -2;
const NO_CONNECTION: i64 = -10004;
const TRADE_DISABLED: i64 = 10027;

/// Upper bound on bars or ticks returned by one call.
pub const MAX_SERIES_LEN: usize = 100_000;

/// Seconds between synthetic ticks.
const TICK_STEP: i64 = 5;

const LEVERAGE: f64 = 100.0;
const BALANCE: f64 = 10_000.0;

const PRICE_STREAM: u64 = 0;
const SHAPE_STREAM: u64 = 1;

struct SymbolSpec {
    name: &'static str,
    description: &'static str,
    digits: u32,
    base_price: f64,
    volatility: f64,
    spread_points: i64,
    contract_size: f64,
    currency_base: &'static str,
    currency_profit: &'static str,
}

const SYMBOLS: &[SymbolSpec] = &[
    SymbolSpec {
        name: "EURUSD",
        description: "Euro vs US Dollar",
        digits: 5,
        base_price: 1.0850,
        volatility: 0.0008,
        spread_points: 12,
        contract_size: 100_000.0,
        currency_base: "EUR",
        currency_profit: "USD",
    },
    SymbolSpec {
        name: "GBPUSD",
        description: "Great Britain Pound vs US Dollar",
        digits: 5,
        base_price: 1.2650,
        volatility: 0.0010,
        spread_points: 15,
        contract_size: 100_000.0,
        currency_base: "GBP",
        currency_profit: "USD",
    },
    SymbolSpec {
        name: "USDJPY",
        description: "US Dollar vs Japanese Yen",
        digits: 3,
        base_price: 149.50,
        volatility: 0.0009,
        spread_points: 14,
        contract_size: 100_000.0,
        currency_base: "USD",
        currency_profit: "JPY",
    },
    SymbolSpec {
        name: "XAUUSD",
        description: "Gold vs US Dollar",
        digits: 2,
        base_price: 2350.0,
        volatility: 0.0015,
        spread_points: 25,
        contract_size: 100.0,
        currency_base: "XAU",
        currency_profit: "USD",
    },
    SymbolSpec {
        name: "BTCUSD",
        description: "Bitcoin vs US Dollar",
        digits: 2,
        base_price: 65_000.0,
        volatility: 0.0040,
        spread_points: 1500,
        contract_size: 1.0,
        currency_base: "BTC",
        currency_profit: "USD",
    },
];

/// Behaviour knobs for [`SimulatedTerminal`].
#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    /// Fixed "now" in Unix seconds; the system clock when `None`.
    pub clock: Option<i64>,
    /// Sleep applied to every data operation.
    pub latency: Duration,
    /// Makes `initialize` refuse the connection.
    pub fail_initialize: bool,
    pub seed: u64,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            clock: None,
            latency: Duration::ZERO,
            fail_initialize: false,
            seed: 0x5eed,
        }
    }
}

impl SimulatedConfig {
    pub fn with_clock(mut self, unix_seconds: i64) -> Self {
        self.clock = Some(unix_seconds);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn refusing(mut self) -> Self {
        self.fail_initialize = true;
        self
    }
}

pub struct SimulatedTerminal {
    config: SimulatedConfig,
    connected: bool,
    last_error: TerminalFault,
    visible: HashMap<&'static str, bool>,
}

impl SimulatedTerminal {
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            config,
            connected: false,
            last_error: TerminalFault::new(1, "Success"),
            visible: SYMBOLS.iter().map(|s| (s.name, true)).collect(),
        }
    }

    fn now(&self) -> i64 {
        self.config
            .clock
            .unwrap_or_else(|| chrono::Utc::now().timestamp())
    }

    fn fail<T>(&mut self, code: i64, message: &str) -> Option<T> {
        self.last_error = TerminalFault::new(code, message);
        None
    }

    fn succeed<T>(&mut self, value: T) -> Option<T> {
        self.last_error = TerminalFault::new(1, "Success");
        Some(value)
    }

    /// Common prologue of data operations: latency and connection check.
    fn begin(&mut self) -> bool {
        if !self.config.latency.is_zero() {
            std::thread::sleep(self.config.latency);
        }
        if !self.connected {
            self.last_error = TerminalFault::new(NO_CONNECTION, "No IPC connection");
        }
        self.connected
    }

    fn symbol(&mut self, name: &str) -> Option<&'static SymbolSpec> {
        match SYMBOLS.iter().find(|s| s.name == name) {
            Some(spec) => Some(spec),
            None => self.fail(NOT_FOUND, "Terminal: Not found"),
        }
    }

    fn series(&mut self, symbol: &str, timeframe: i64) -> Option<(&'static SymbolSpec, i64)> {
        let spec = self.symbol(symbol)?;
        match timeframe_seconds(timeframe) {
            Some(step) => Some((spec, step)),
            None => self.fail(INVALID_PARAMS, "Terminal: Invalid params"),
        }
    }

    fn price_at(&self, spec: &SymbolSpec, step: i64, index: i64) -> f64 {
        let t = (index * step) as f64;
        let drift = 0.02 * (TAU * t / 432_000.0).sin() + 0.004 * (TAU * t / 21_600.0).sin();
        let noise = spec.volatility * self.bar_rng(spec, step, index, PRICE_STREAM).gen_range(-1.0..1.0);
        round_to(spec.base_price * (1.0 + drift + noise), spec.digits)
    }

    /// Generator for one bar, seeded from the configured seed, the symbol's
    /// catalogue position, the bar length and the bar index.
    fn bar_rng(&self, spec: &SymbolSpec, step: i64, index: i64, stream: u64) -> StdRng {
        let ordinal = SYMBOLS
            .iter()
            .position(|s| s.name == spec.name)
            .unwrap_or_default() as u64;
        let words = [self.config.seed, ordinal << 8 | stream, step as u64, index as u64];
        let mut seed = [0u8; 32];
        for (chunk, word) in seed.chunks_exact_mut(8).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        StdRng::from_seed(seed)
    }

    fn bar(&self, spec: &SymbolSpec, step: i64, index: i64) -> Datum {
        let open = self.price_at(spec, step, index - 1);
        let close = self.price_at(spec, step, index);
        let mut rng = self.bar_rng(spec, step, index, SHAPE_STREAM);
        let wick = spec.volatility * 0.5;
        let high = round_to(open.max(close) * (1.0 + wick * rng.gen::<f64>()), spec.digits);
        let low = round_to(open.min(close) * (1.0 - wick * rng.gen::<f64>()), spec.digits);
        let tick_volume = rng.gen_range(100..1000);

        Datum::record(
            "bar",
            vec![
                ("time", Datum::Int(index * step)),
                ("open", Datum::Float(open)),
                ("high", Datum::Float(high)),
                ("low", Datum::Float(low)),
                ("close", Datum::Float(close)),
                ("tick_volume", Datum::Int(tick_volume)),
                ("spread", Datum::Int(spec.spread_points)),
                ("real_volume", Datum::Int(0)),
            ],
        )
    }

    fn bars(&self, spec: &SymbolSpec, step: i64, first: i64, last: i64) -> Datum {
        Datum::List((first..=last).map(|i| self.bar(spec, step, i)).collect())
    }

    fn quote(&self, spec: &SymbolSpec, time: i64) -> (f64, f64) {
        let bid = self.price_at(spec, TICK_STEP, time.div_euclid(TICK_STEP));
        let point = 10f64.powi(-(spec.digits as i32));
        let ask = round_to(bid + spec.spread_points as f64 * point, spec.digits);
        (bid, ask)
    }

    fn tick(&self, spec: &SymbolSpec, time: i64) -> Datum {
        let (bid, ask) = self.quote(spec, time);
        Datum::record(
            "tick",
            vec![
                ("time", Datum::Int(time)),
                ("bid", Datum::Float(bid)),
                ("ask", Datum::Float(ask)),
                ("last", Datum::Float(0.0)),
                ("volume", Datum::Int(0)),
                ("time_msc", Datum::Int(time * 1000)),
                ("flags", Datum::Int(6)),
                ("volume_real", Datum::Float(0.0)),
            ],
        )
    }

    fn ticks(&self, spec: &SymbolSpec, first: i64, last: i64) -> Datum {
        let start = first.div_euclid(TICK_STEP) + i64::from(first.rem_euclid(TICK_STEP) != 0);
        let end = last.min(self.now()).div_euclid(TICK_STEP);
        Datum::List(
            (start..=end)
                .take(MAX_SERIES_LEN)
                .map(|i| self.tick(spec, i * TICK_STEP))
                .collect(),
        )
    }

    fn symbol_info_record(&self, spec: &SymbolSpec) -> Datum {
        let (bid, ask) = self.quote(spec, self.now());
        Datum::record(
            "symbol_info",
            vec![
                ("name", Datum::from(spec.name)),
                ("description", Datum::from(spec.description)),
                ("visible", Datum::Bool(self.visible.get(spec.name).copied().unwrap_or(false))),
                ("digits", Datum::Int(i64::from(spec.digits))),
                ("point", Datum::Float(10f64.powi(-(spec.digits as i32)))),
                ("spread", Datum::Int(spec.spread_points)),
                ("bid", Datum::Float(bid)),
                ("ask", Datum::Float(ask)),
                ("trade_contract_size", Datum::Float(spec.contract_size)),
                ("volume_min", Datum::Float(0.01)),
                ("volume_max", Datum::Float(100.0)),
                ("volume_step", Datum::Float(0.01)),
                ("currency_base", Datum::from(spec.currency_base)),
                ("currency_profit", Datum::from(spec.currency_profit)),
            ],
        )
    }

    /// Converts an amount in `currency` to the account currency (USD).
    fn to_account_currency(&self, amount: f64, currency: &str) -> f64 {
        if currency == "USD" {
            return amount;
        }
        match SYMBOLS
            .iter()
            .find(|s| s.currency_base == "USD" && s.currency_profit == currency)
        {
            Some(spec) => amount / self.quote(spec, self.now()).0,
            None => amount,
        }
    }
}

impl Default for SimulatedTerminal {
    fn default() -> Self {
        Self::new(SimulatedConfig::default())
    }
}

impl Terminal for SimulatedTerminal {
    fn initialize(&mut self) -> bool {
        if self.config.fail_initialize {
            self.last_error = TerminalFault::new(-6, "Terminal: Authorization failed");
            return false;
        }
        self.connected = true;
        self.last_error = TerminalFault::new(1, "Success");
        debug!(seed = self.config.seed, "Simulated terminal initialized");
        true
    }

    fn shutdown(&mut self) {
        self.connected = false;
    }

    fn last_error(&self) -> TerminalFault {
        self.last_error.clone()
    }

    fn version(&mut self) -> Option<Datum> {
        if !self.begin() {
            return None;
        }
        self.succeed(Datum::List(vec![
            Datum::Int(500),
            Datum::Int(4410),
            Datum::from("07 Jun 2024"),
        ]))
    }

    fn terminal_info(&mut self) -> Option<Datum> {
        if !self.begin() {
            return None;
        }
        self.succeed(Datum::record(
            "terminal_info",
            vec![
                ("name", Datum::from("ScriptGate Simulated Terminal")),
                ("company", Datum::from("ScriptGate")),
                ("build", Datum::Int(4410)),
                ("connected", Datum::Bool(true)),
                ("trade_allowed", Datum::Bool(false)),
                ("language", Datum::from("English")),
            ],
        ))
    }

    fn account_info(&mut self) -> Option<Datum> {
        if !self.begin() {
            return None;
        }
        self.succeed(Datum::record(
            "account_info",
            vec![
                ("login", Datum::Int(10_000_001)),
                ("trade_mode", Datum::Int(0)),
                ("leverage", Datum::Int(LEVERAGE as i64)),
                ("balance", Datum::Float(BALANCE)),
                ("equity", Datum::Float(BALANCE)),
                ("margin", Datum::Float(0.0)),
                ("margin_free", Datum::Float(BALANCE)),
                ("currency", Datum::from("USD")),
                ("server", Datum::from("Simulated-Demo")),
                ("name", Datum::from("Simulated Account")),
                ("company", Datum::from("ScriptGate")),
            ],
        ))
    }

    fn symbols_total(&mut self) -> Option<Datum> {
        if !self.begin() {
            return None;
        }
        self.succeed(Datum::Int(SYMBOLS.len() as i64))
    }

    fn symbols_get(&mut self, group: Option<&str>) -> Option<Datum> {
        if !self.begin() {
            return None;
        }
        let records = SYMBOLS
            .iter()
            .filter(|spec| group.map_or(true, |g| group_matches(g, spec.name)))
            .map(|spec| self.symbol_info_record(spec))
            .collect();
        self.succeed(Datum::List(records))
    }

    fn symbol_info(&mut self, symbol: &str) -> Option<Datum> {
        if !self.begin() {
            return None;
        }
        let spec = self.symbol(symbol)?;
        let record = self.symbol_info_record(spec);
        self.succeed(record)
    }

    fn symbol_info_tick(&mut self, symbol: &str) -> Option<Datum> {
        if !self.begin() {
            return None;
        }
        let spec = self.symbol(symbol)?;
        let now = self.now();
        let tick = self.tick(spec, now - now.rem_euclid(TICK_STEP));
        self.succeed(tick)
    }

    fn symbol_select(&mut self, symbol: &str, enable: bool) -> Option<Datum> {
        if !self.begin() {
            return None;
        }
        let spec = self.symbol(symbol)?;
        self.visible.insert(spec.name, enable);
        self.succeed(Datum::Bool(true))
    }

    fn copy_rates_from(
        &mut self,
        symbol: &str,
        timeframe: i64,
        date_from: i64,
        count: usize,
    ) -> Option<Datum> {
        if !self.begin() {
            return None;
        }
        let (spec, step) = self.series(symbol, timeframe)?;
        if count > MAX_SERIES_LEN {
            return self.fail(INVALID_PARAMS, "Terminal: Invalid params");
        }
        let last = date_from.min(self.now()).div_euclid(step);
        let bars = if count == 0 {
            Datum::List(Vec::new())
        } else {
            self.bars(spec, step, last - count as i64 + 1, last)
        };
        self.succeed(bars)
    }

    fn copy_rates_from_pos(
        &mut self,
        symbol: &str,
        timeframe: i64,
        start_pos: usize,
        count: usize,
    ) -> Option<Datum> {
        if !self.begin() {
            return None;
        }
        let (spec, step) = self.series(symbol, timeframe)?;
        if count > MAX_SERIES_LEN || start_pos > MAX_SERIES_LEN {
            return self.fail(INVALID_PARAMS, "Terminal: Invalid params");
        }
        let last = self.now().div_euclid(step) - start_pos as i64;
        let bars = if count == 0 {
            Datum::List(Vec::new())
        } else {
            self.bars(spec, step, last - count as i64 + 1, last)
        };
        self.succeed(bars)
    }

    fn copy_rates_range(
        &mut self,
        symbol: &str,
        timeframe: i64,
        date_from: i64,
        date_to: i64,
    ) -> Option<Datum> {
        if !self.begin() {
            return None;
        }
        let (spec, step) = self.series(symbol, timeframe)?;
        let first = date_from.div_euclid(step) + i64::from(date_from.rem_euclid(step) != 0);
        let last = date_to.min(self.now()).div_euclid(step);
        if last - first >= MAX_SERIES_LEN as i64 {
            return self.fail(INVALID_PARAMS, "Terminal: Invalid params");
        }
        let bars = if last < first {
            Datum::List(Vec::new())
        } else {
            self.bars(spec, step, first, last)
        };
        self.succeed(bars)
    }

    fn copy_ticks_from(
        &mut self,
        symbol: &str,
        date_from: i64,
        count: usize,
        _flags: i64,
    ) -> Option<Datum> {
        if !self.begin() {
            return None;
        }
        let spec = self.symbol(symbol)?;
        if count > MAX_SERIES_LEN {
            return self.fail(INVALID_PARAMS, "Terminal: Invalid params");
        }
        let last = date_from.saturating_add(count as i64 * TICK_STEP - 1);
        let ticks = if count == 0 {
            Datum::List(Vec::new())
        } else {
            self.ticks(spec, date_from, last)
        };
        self.succeed(ticks)
    }

    fn copy_ticks_range(
        &mut self,
        symbol: &str,
        date_from: i64,
        date_to: i64,
        _flags: i64,
    ) -> Option<Datum> {
        if !self.begin() {
            return None;
        }
        let spec = self.symbol(symbol)?;
        let ticks = self.ticks(spec, date_from, date_to);
        self.succeed(ticks)
    }

    fn order_calc_margin(
        &mut self,
        action: i64,
        symbol: &str,
        volume: f64,
        price: f64,
    ) -> Option<Datum> {
        if !self.begin() {
            return None;
        }
        let spec = self.symbol(symbol)?;
        if !(0..=1).contains(&action) || volume <= 0.0 || price <= 0.0 {
            return self.fail(INVALID_PARAMS, "Terminal: Invalid params");
        }
        let notional = volume * spec.contract_size * price;
        let margin = self.to_account_currency(notional, spec.currency_profit) / LEVERAGE;
        self.succeed(Datum::Float(round_to(margin, 2)))
    }

    fn order_calc_profit(
        &mut self,
        action: i64,
        symbol: &str,
        volume: f64,
        price_open: f64,
        price_close: f64,
    ) -> Option<Datum> {
        if !self.begin() {
            return None;
        }
        let spec = self.symbol(symbol)?;
        if !(0..=1).contains(&action) || volume <= 0.0 {
            return self.fail(INVALID_PARAMS, "Terminal: Invalid params");
        }
        let direction = if action == 0 { 1.0 } else { -1.0 };
        let raw = direction * (price_close - price_open) * volume * spec.contract_size;
        let profit = self.to_account_currency(raw, spec.currency_profit);
        self.succeed(Datum::Float(round_to(profit, 2)))
    }

    fn order_send(&mut self, _request: &Datum) -> Option<Datum> {
        if !self.begin() {
            return None;
        }
        self.fail(TRADE_DISABLED, "AutoTrading disabled by client")
    }
}

/// Length in seconds of a `TIMEFRAME_*` code.
fn timeframe_seconds(code: i64) -> Option<i64> {
    match code {
        1..=6 | 10 | 12 | 15 | 20 | 30 => Some(code * 60),
        16385..=16388 | 16390 | 16392 | 16396 => Some((code - 16384) * 3600),
        16408 => Some(86_400),
        32769 => Some(7 * 86_400),
        49153 => Some(30 * 86_400),
        _ => None,
    }
}

/// `symbols_get` group filter: comma separated globs, `!` excludes.
fn group_matches(group: &str, name: &str) -> bool {
    let mut included = false;
    let mut has_positive = false;
    for pattern in group.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some(negated) = pattern.strip_prefix('!') {
            if glob(negated, name) {
                return false;
            }
        } else {
            has_positive = true;
            included |= glob(pattern, name);
        }
    }
    included || !has_positive
}

fn glob(pattern: &str, text: &str) -> bool {
    let pattern = pattern.to_ascii_uppercase();
    let text = text.to_ascii_uppercase();
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut rest = text.as_str();
    let first = parts[0];
    if !rest.starts_with(first) {
        return false;
    }
    rest = &rest[first.len()..];
    let last = parts[parts.len() - 1];
    for middle in &parts[1..parts.len() - 1] {
        match rest.find(middle) {
            Some(at) => rest = &rest[at + middle.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

fn round_to(value: f64, digits: u32) -> f64 {
    let scale = 10f64.powi(digits as i32);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_717_243_200; // 2024-06-01 12:00:00 UTC

    fn connected() -> SimulatedTerminal {
        let mut terminal = SimulatedTerminal::new(SimulatedConfig::default().with_clock(NOW));
        assert!(terminal.initialize());
        terminal
    }

    fn field_f64(datum: &Datum, name: &str) -> f64 {
        datum.field(name).and_then(Datum::as_f64).unwrap()
    }

    fn items(datum: Datum) -> Vec<Datum> {
        match datum {
            Datum::List(items) => items,
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_requires_connection() {
        let mut terminal = SimulatedTerminal::default();
        assert!(terminal.symbols_total().is_none());
        assert_eq!(terminal.last_error().code, NO_CONNECTION);
    }

    #[test]
    fn test_refusing_initialize() {
        let mut terminal = SimulatedTerminal::new(SimulatedConfig::default().refusing());
        assert!(!terminal.initialize());
        assert_eq!(terminal.last_error().code, -6);
    }

    #[test]
    fn test_unknown_symbol() {
        let mut terminal = connected();
        assert!(terminal.symbol_info("NOPE").is_none());
        assert_eq!(terminal.last_error(), TerminalFault::new(-4, "Terminal: Not found"));
    }

    #[test]
    fn test_bars_are_deterministic_and_continuous() {
        let mut terminal = connected();
        let first = items(terminal.copy_rates_from_pos("EURUSD", 16385, 0, 10).unwrap());
        let second = items(terminal.copy_rates_from_pos("EURUSD", 16385, 0, 10).unwrap());
        assert_eq!(first, second);
        assert_eq!(first.len(), 10);

        for pair in first.windows(2) {
            assert_eq!(field_f64(&pair[1], "open"), field_f64(&pair[0], "close"));
            assert_eq!(
                pair[1].field("time").and_then(Datum::as_i64).unwrap()
                    - pair[0].field("time").and_then(Datum::as_i64).unwrap(),
                3600
            );
        }
        for bar in &first {
            assert!(field_f64(bar, "high") >= field_f64(bar, "open").max(field_f64(bar, "close")));
            assert!(field_f64(bar, "low") <= field_f64(bar, "open").min(field_f64(bar, "close")));
            let volume = bar.field("tick_volume").and_then(Datum::as_i64).unwrap();
            assert!((100..1000).contains(&volume));
        }

        let last_time = first[9].field("time").and_then(Datum::as_i64).unwrap();
        assert!(last_time <= NOW && NOW - last_time < 3600);
    }

    #[test]
    fn test_seed_changes_data() {
        let mut a = connected();
        let mut b = SimulatedTerminal::new(SimulatedConfig::default().with_clock(NOW).with_seed(7));
        b.initialize();
        assert_ne!(
            a.copy_rates_from_pos("XAUUSD", 1, 0, 5),
            b.copy_rates_from_pos("XAUUSD", 1, 0, 5)
        );
    }

    #[test]
    fn test_invalid_timeframe() {
        let mut terminal = connected();
        assert!(terminal.copy_rates_from_pos("EURUSD", 7, 0, 10).is_none());
        assert_eq!(terminal.last_error().code, INVALID_PARAMS);
    }

    #[test]
    fn test_rates_range_is_clamped_to_now() {
        let mut terminal = connected();
        let bars = items(
            terminal
                .copy_rates_range("GBPUSD", 16408, NOW - 5 * 86_400, NOW + 30 * 86_400)
                .unwrap(),
        );
        assert!(!bars.is_empty());
        assert!(bars
            .iter()
            .all(|b| b.field("time").and_then(Datum::as_i64).unwrap() <= NOW));
    }

    #[test]
    fn test_ticks() {
        let mut terminal = connected();
        let ticks = items(terminal.copy_ticks_from("USDJPY", NOW - 60, 4, -1).unwrap());
        assert_eq!(ticks.len(), 4);
        for tick in &ticks {
            assert!(field_f64(tick, "ask") > field_f64(tick, "bid"));
        }

        let latest = terminal.symbol_info_tick("USDJPY").unwrap();
        assert_eq!(latest.field("time").and_then(Datum::as_i64), Some(NOW));
    }

    #[test]
    fn test_symbols_group_filter() {
        let mut terminal = connected();
        assert_eq!(items(terminal.symbols_get(None).unwrap()).len(), 5);
        assert_eq!(items(terminal.symbols_get(Some("*USD*")).unwrap()).len(), 5);
        assert_eq!(items(terminal.symbols_get(Some("*USD,!XAU*")).unwrap()).len(), 3);
        assert_eq!(items(terminal.symbols_get(Some("!BTC*")).unwrap()).len(), 4);
        assert!(items(terminal.symbols_get(Some("AUD*")).unwrap()).is_empty());
    }

    #[test]
    fn test_margin_and_profit() {
        let mut terminal = connected();
        let margin = terminal
            .order_calc_margin(0, "EURUSD", 1.0, 1.1)
            .and_then(|d| d.as_f64())
            .unwrap();
        assert!((margin - 1100.0).abs() < 1e-6);

        let profit = terminal
            .order_calc_profit(1, "EURUSD", 1.0, 1.1, 1.09)
            .and_then(|d| d.as_f64())
            .unwrap();
        assert!((profit - 1000.0).abs() < 1e-6);

        assert!(terminal.order_calc_margin(5, "EURUSD", 1.0, 1.1).is_none());
    }

    #[test]
    fn test_orders_are_rejected() {
        let mut terminal = connected();
        assert!(terminal.order_send(&Datum::None).is_none());
        assert_eq!(terminal.last_error().code, TRADE_DISABLED);
    }
}
