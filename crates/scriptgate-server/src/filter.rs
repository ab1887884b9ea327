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

//! Danger-Pattern Filter
//!
//! A static text scan run before a script is parsed. It rejects scripts
//! containing constructs that are never legitimate here: connection lifecycle
//! calls, process and filesystem access, dynamic evaluation and imports.
//!
//! # Limitations
//!
//! This is a coarse textual match, not a semantic check. It does not
//! understand aliasing, string building or indirect references, and it also
//! fires on matches inside string literals and comments. It is a cheap first
//! line of defense; the capability whitelist built by
//! [`crate::namespace::NamespaceBuilder`] is what actually keeps these
//! operations out of reach.

use scriptgate_common::GateError;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// Matches anywhere. A pattern starting with a letter or digit must not
    /// continue an identifier, so `os.` does not fire on `pos.`.
    Literal,
    /// Matches only as a complete identifier.
    Word,
    /// A complete identifier followed by `(`, so reading a field named
    /// `open` is fine but calling `open(...)` is not.
    Call,
}

#[derive(Debug, Clone)]
pub struct DangerPattern {
    pub pattern: String,
    pub kind: PatternKind,
    pub reason: String,
}

impl DangerPattern {
    pub fn literal(pattern: &str, reason: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            kind: PatternKind::Literal,
            reason: reason.to_string(),
        }
    }

    pub fn word(pattern: &str, reason: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            kind: PatternKind::Word,
            reason: reason.to_string(),
        }
    }

    pub fn call(pattern: &str, reason: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            kind: PatternKind::Call,
            reason: reason.to_string(),
        }
    }

    /// Byte offset of the first match in `text`.
    pub fn find(&self, text: &str) -> Option<usize> {
        if self.pattern.is_empty() {
            return None;
        }
        let guard_start = match self.kind {
            PatternKind::Word | PatternKind::Call => true,
            PatternKind::Literal => self
                .pattern
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric()),
        };

        text.match_indices(&self.pattern).map(|(at, _)| at).find(|&at| {
            let before = text[..at].chars().next_back();
            let rest = &text[at + self.pattern.len()..];
            if guard_start && before.is_some_and(is_ident_char) {
                return false;
            }
            match self.kind {
                PatternKind::Literal => true,
                PatternKind::Word => !rest.chars().next().is_some_and(is_ident_char),
                PatternKind::Call => rest.trim_start().starts_with('('),
            }
        })
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

const LIFECYCLE: &str = "the terminal connection is managed by the server";
const PROCESS: &str = "process and system access is not available";
const DYNAMIC: &str = "dynamic code evaluation is not available";
const IMPORTS: &str = "imports are not available; helper modules are pre-loaded";
const BLOCKING: &str = "blocking the execution thread is not available";

fn default_patterns() -> Vec<DangerPattern> {
    vec![
        DangerPattern::literal("mt5::initialize", LIFECYCLE),
        DangerPattern::literal("mt5::shutdown", LIFECYCLE),
        DangerPattern::literal("mt5::login", LIFECYCLE),
        DangerPattern::literal("order_send", "order placement is not available"),
        DangerPattern::literal("os::", PROCESS),
        DangerPattern::call("system", PROCESS),
        DangerPattern::call("exec", PROCESS),
        DangerPattern::literal("__", "double-underscore names are reserved"),
        DangerPattern::word("import", IMPORTS),
        DangerPattern::call("eval", DYNAMIC),
        DangerPattern::call("sleep", BLOCKING),
    ]
}

/// Pre-parse scan for known-dangerous constructs.
#[derive(Debug, Clone)]
pub struct DangerFilter {
    patterns: Vec<DangerPattern>,
}

impl Default for DangerFilter {
    fn default() -> Self {
        Self {
            patterns: default_patterns(),
        }
    }
}

impl DangerFilter {
    /// Filter with exactly `patterns`, replacing the defaults.
    pub fn with_patterns(patterns: Vec<DangerPattern>) -> Self {
        Self { patterns }
    }

    pub fn add(mut self, pattern: DangerPattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    pub fn patterns(&self) -> &[DangerPattern] {
        &self.patterns
    }

    /// Rejects `text` if any pattern matches.
    ///
    /// When several patterns match, the one occurring first in the text is
    /// reported.
    ///
    /// # Errors
    ///
    /// Returns `GateError::ForbiddenPattern` naming the pattern and the reason.
    pub fn check(&self, text: &str) -> Result<(), GateError> {
        let hit = self
            .patterns
            .iter()
            .filter_map(|p| p.find(text).map(|at| (at, p)))
            .min_by_key(|(at, _)| *at);

        match hit {
            None => Ok(()),
            Some((at, pattern)) => {
                warn!(pattern = %pattern.pattern, offset = at, "Blocked forbidden pattern");
                Err(GateError::ForbiddenPattern {
                    pattern: pattern.pattern.clone(),
                    reason: pattern.reason.clone(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(text: &str) -> String {
        match DangerFilter::default().check(text) {
            Err(GateError::ForbiddenPattern { pattern, .. }) => pattern,
            other => panic!("expected rejection for {text:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_lifecycle_calls_rejected() {
        assert_eq!(rejected("mt5::initialize()"), "mt5::initialize");
        assert_eq!(rejected("x = 1\nmt5::shutdown()"), "mt5::shutdown");
        assert_eq!(rejected("mt5::order_send(req)"), "order_send");
    }

    #[test]
    fn test_whole_words() {
        assert_eq!(rejected("import \"os\" as os;"), "import");
        assert_eq!(rejected("eval(\"1\")"), "eval");
        assert_eq!(rejected("sleep (10)"), "sleep");
        assert_eq!(rejected("important = 1\nimport \"m\";"), "import");

        let filter = DangerFilter::default();
        assert!(filter.check("evaluation = 1").is_ok());
        assert!(filter.check("asleep = true").is_ok());
        assert!(filter.check("system_time = 3").is_ok());
        assert!(filter.check("result = bars.map(|b| b.open)").is_ok());
        assert!(filter.check("result = bar.open - bar.close").is_ok());
    }

    #[test]
    fn test_literal_guards_identifier_prefix() {
        let filter = DangerFilter::default();
        assert!(filter.check("pos::x").is_ok());
        assert_eq!(rejected("os::system(\"ls\")"), "os::");
        assert_eq!(rejected("x = a__b"), "__");
        assert_eq!(rejected("gate__result = 1"), "__");
    }

    #[test]
    fn test_first_occurrence_reported() {
        assert_eq!(rejected("exec(\"x\")\nimport \"sys\";"), "exec");
    }

    #[test]
    fn test_ordinary_scripts_pass() {
        let filter = DangerFilter::default();
        let script = "rates = mt5::copy_rates_from_pos(\"EURUSD\", mt5::TIMEFRAME_H1, 0, 10)\n\
                      df = pd::DataFrame(rates)\n\
                      result = df.tail(3)";
        assert!(filter.check(script).is_ok());
    }

    #[test]
    fn test_message_names_pattern_and_reason() {
        let err = DangerFilter::default().check("system(\"ls\")").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("'system'"));
        assert!(text.contains("process and system access"));
    }

    #[test]
    fn test_custom_patterns() {
        let filter = DangerFilter::with_patterns(vec![DangerPattern::word("account_info", "no")]);
        assert!(filter.check("import \"os\";").is_ok());
        assert!(filter.check("mt5::account_info()").is_err());
    }
}
