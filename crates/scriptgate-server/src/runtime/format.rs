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

//! Text rendering of execution results.

use std::error::Error as _;

use rhai::{Array, Dynamic, ImmutableString, Map};

use super::conversions::dynamic_to_json;
use super::engine::ErrorInfo;
use super::table::Table;
use super::types::{DateTime, Record, TimeDelta};

/// Rendered when a run succeeds without printing or producing a value.
pub const NO_OUTPUT: &str = "Command executed successfully (no output)";

/// Python-style float text: `1.0`, `0.1`, `1e+16`, `inf`.
pub fn float_text(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let magnitude = f.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let formatted = format!("{:e}", f);
        let (mantissa, exponent) = formatted.split_once('e').unwrap_or((&formatted, "0"));
        let (sign, digits) = match exponent.strip_prefix('-') {
            Some(digits) => ('-', digits),
            None => ('+', exponent),
        };
        return format!("{}e{}{:0>2}", mantissa, sign, digits);
    }
    if f.fract() == 0.0 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

/// Inline text of a value, as `print` and table cells show it.
pub fn text(value: &Dynamic) -> String {
    if value.is_unit() {
        return String::new();
    }
    if let Ok(f) = value.as_float() {
        return float_text(f);
    }
    if let Some(s) = value.read_lock::<ImmutableString>() {
        return s.to_string();
    }
    if let Some(record) = value.read_lock::<Record>() {
        return record.to_string();
    }
    if let Some(dt) = value.read_lock::<DateTime>() {
        return dt.to_string();
    }
    if let Some(delta) = value.read_lock::<TimeDelta>() {
        return delta.to_string();
    }
    if let Some(table) = value.read_lock::<Table>() {
        return table.to_markdown(true);
    }
    if value.is::<Array>() || value.is::<Map>() {
        return dynamic_to_json(value).to_string();
    }
    value.to_string()
}

/// Renders the resolved result value of a script.
pub fn render_value(value: &Dynamic) -> String {
    if let Some(table) = value.read_lock::<Table>() {
        return table.to_markdown(true);
    }
    if value.is::<Map>() || value.is::<Record>() {
        return pretty_json(value);
    }
    if let Some(items) = value.read_lock::<Array>() {
        if !items.is_empty() && items.iter().all(is_mapping) {
            if let Ok(table) = Table::from_rows(&items) {
                return table.to_markdown(false);
            }
        }
        return pretty_json(value);
    }
    text(value)
}

fn is_mapping(value: &Dynamic) -> bool {
    value.is::<Map>() || value.is::<Record>()
}

fn pretty_json(value: &Dynamic) -> String {
    serde_json::to_string_pretty(&dynamic_to_json(value)).unwrap_or_else(|_| value.to_string())
}

/// Joins captured output and the rendered value. An empty value counts as
/// no value.
pub fn render_success(stdout: &str, value: Option<&str>) -> String {
    let stdout = stdout.trim();
    match (stdout.is_empty(), value.filter(|v| !v.is_empty())) {
        (true, None) => NO_OUTPUT.to_string(),
        (true, Some(value)) => value.to_string(),
        (false, None) => stdout.to_string(),
        (false, Some(value)) => format!("{}\n\n{}", stdout, value),
    }
}

/// Renders a failure.
///
/// The short form is a single line. The full form carries the traceback,
/// the cause chain and whatever the script printed before failing.
pub fn render_error(info: &ErrorInfo, stdout: &str, full: bool) -> String {
    if !full {
        return format!("Error: {}", flatten(&info.error.to_string()));
    }

    let mut out = String::from("Error executing command:\n\n");
    if !info.traceback.is_empty() {
        out.push_str("Traceback (most recent call last):\n");
        for frame in &info.traceback {
            out.push_str(&format!("  line {}, in {}\n", frame.line, frame.function));
            if let Some(source) = &frame.source {
                out.push_str(&format!("    {}\n", source));
                if let Some(caret) = frame.caret {
                    out.push_str(&format!("    {}^\n", " ".repeat(caret)));
                }
            }
        }
    }
    out.push_str(&info.error.to_string());

    let mut cause = info.error.source();
    if cause.is_some() {
        out.push_str("\n\nCaused by:");
    }
    while let Some(err) = cause {
        out.push_str(&format!("\n    {}", err));
        cause = err.source();
    }

    let stdout = stdout.trim();
    if !stdout.is_empty() {
        out.push_str("\n\nOutput before error:\n");
        out.push_str(stdout);
    }
    out
}

fn flatten(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::engine::TraceFrame;
    use scriptgate_common::{ExceptionKind, GateError, TerminalFault};

    fn record(fields: &[(&str, Dynamic)]) -> Dynamic {
        Dynamic::from(Record::new(
            "row",
            fields
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        ))
    }

    #[test]
    fn test_scalars() {
        assert_eq!(render_value(&Dynamic::from(40_i64)), "40");
        assert_eq!(render_value(&Dynamic::from(1.0)), "1.0");
        assert_eq!(render_value(&Dynamic::from(true)), "true");
        assert_eq!(render_value(&"raw text".into()), "raw text");
    }

    #[test]
    fn test_float_text() {
        assert_eq!(float_text(0.1), "0.1");
        assert_eq!(float_text(-2.0), "-2.0");
        assert_eq!(float_text(1e16), "1e+16");
        assert_eq!(float_text(1.5e-7), "1.5e-07");
        assert_eq!(float_text(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn test_record_renders_ordered_json() {
        let value = record(&[("zeta", Dynamic::from(1_i64)), ("alpha", Dynamic::from(2_i64))]);
        assert_eq!(render_value(&value), "{\n  \"zeta\": 1,\n  \"alpha\": 2\n}");
    }

    #[test]
    fn test_list_of_mappings_renders_table() {
        let rows = Dynamic::from_array(vec![
            record(&[("symbol", "EURUSD".into()), ("bid", Dynamic::from(1.1))]),
            record(&[("symbol", "GBPUSD".into()), ("bid", Dynamic::from(1.3))]),
        ]);
        let text = render_value(&rows);
        assert!(text.starts_with("| symbol"));
        assert!(text.contains("GBPUSD"));
    }

    #[test]
    fn test_mixed_list_renders_json() {
        let rows = Dynamic::from_array(vec![
            record(&[("a", Dynamic::from(1_i64))]),
            Dynamic::from(2_i64),
        ]);
        assert!(render_value(&rows).starts_with('['));
        assert_eq!(render_value(&Dynamic::from_array(vec![])), "[]");
    }

    #[test]
    fn test_success_joining() {
        assert_eq!(render_success("", None), NO_OUTPUT);
        assert_eq!(render_success("  \n", None), NO_OUTPUT);
        assert_eq!(render_success("hi\n", None), "hi");
        assert_eq!(render_success("hi\n", Some("40")), "hi\n\n40");
    }

    #[test]
    fn test_empty_value_is_no_output() {
        assert_eq!(render_success("", Some("")), NO_OUTPUT);
        assert_eq!(render_success("hi\n", Some("")), "hi");
    }

    #[test]
    fn test_short_error_is_one_line() {
        let info = ErrorInfo::new(GateError::exec(ExceptionKind::ValueError, "bad\nvalue"));
        assert_eq!(render_error(&info, "", false), "Error: ValueError: bad value");
    }

    #[test]
    fn test_full_error_with_traceback_and_cause() {
        let mut info = ErrorInfo::new(GateError::Resource {
            operation: "symbol_info".into(),
            fault: Some(TerminalFault::new(-4, "Terminal: Not found")),
        });
        info.traceback = vec![
            TraceFrame {
                line: 3,
                function: "<script>".into(),
                source: Some("result = lookup(\"XXX\")".into()),
                caret: None,
            },
            TraceFrame {
                line: 2,
                function: "lookup".into(),
                source: None,
                caret: None,
            },
        ];
        let text = render_error(&info, "started\n", true);
        assert!(text.starts_with("Error executing command:\n\nTraceback (most recent call last):\n"));
        assert!(text.contains("  line 3, in <script>\n    result = lookup(\"XXX\")\n  line 2, in lookup\n"));
        assert!(text.contains("ResourceError: symbol_info failed (code -4): Terminal: Not found"));
        assert!(text.contains("Caused by:\n    terminal error -4: Terminal: Not found"));
        assert!(text.ends_with("Output before error:\nstarted"));
    }

    #[test]
    fn test_caret_under_column() {
        let mut info = ErrorInfo::new(GateError::Syntax {
            message: "unexpected token".into(),
            line: 1,
            column: 5,
        });
        info.traceback = vec![TraceFrame {
            line: 1,
            function: "<script>".into(),
            source: Some("x = )".into()),
            caret: Some(4),
        }];
        let text = render_error(&info, "", true);
        assert!(text.contains("    x = )\n        ^\n"));
    }
}
