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

//! Source preparation ahead of compilation.
//!
//! Scripts are written one statement per line, so [`prepare`] scans the text
//! once and:
//!
//! - ends a statement at every line break that cannot continue it
//! - collects the names first assigned at statement level outside `fn`
//!   bodies, so the engine can declare them before the run
//! - rewrites a trailing bare expression into an assignment to
//!   [`RESULT_SLOT`]
//! - spells `-9223372036854775808` as `(-9223372036854775807 - 1)`, since the
//!   positive literal does not fit an `i64`
//!
//! Line numbers never change. On the line holding the captured tail,
//! [`Prepared::original_column`] maps compiler columns back to the text the
//! caller sent.

/// Variable receiving the captured tail value. Scripts cannot write it: the
/// danger filter rejects any `__` in their text.
pub const RESULT_SLOT: &str = "gate__result";

const MIN_INT_MAGNITUDE: &str = "9223372036854775808";
const MIN_INT_SPELLED: &str = "(-9223372036854775807 - 1)";

/// Keywords that begin a statement which is not an expression.
const STATEMENT_KEYWORDS: &[&str] = &[
    "let", "const", "if", "switch", "do", "while", "until", "loop", "for", "fn", "private",
    "return", "throw", "try", "break", "continue", "import", "export",
];

/// Keywords after which a line break never ends the statement.
const OPEN_KEYWORDS: &[&str] = &[
    "let", "const", "if", "else", "while", "until", "for", "in", "fn", "do", "loop", "switch",
    "try", "catch", "private", "import", "export", "as", "is",
];

/// Punctuation after which a line break never ends the statement.
const OPEN_PUNCTUATION: &[&str] = &[
    "(", "[", "?[", "{", "#{", ",", ";", "=", "+=", "-=", "*=", "/=", "%=", "**=", "<<=",
    ">>=", "&=", "|=", "^=", "+", "-", "*", "/", "%", "**", "==", "!=", "<", ">", "<=", ">=",
    "&&", "||", "&", "|", "^", "<<", ">>", "??", ".", "?.", "::", "=>", "..", "..=", "!", ":",
];

/// Punctuation that continues the previous line when it starts a line.
const CONTINUING_PUNCTUATION: &[&str] = &[
    ")", "]", "}", ",", ".", "?.", "::", "{", "=", "==", "!=", "<", ">", "<=", ">=", "&&",
    "||", "??", "*", "/", "%", "**", "&", "|", "^", "<<", ">>", "=>", "..", "..=", "+=", "-=",
    "*=", "/=", "%=", "**=", "<<=", ">>=", "&=", "|=", "^=", ":", "?",
];

const ASSIGNMENT_OPERATORS: &[&str] = &[
    "=", "+=", "-=", "*=", "/=", "%=", "**=", "<<=", ">>=", "&=", "|=", "^=",
];

/// Multi-character punctuation, longest first.
const PUNCTUATION: &[&str] = &[
    "**=", "<<=", ">>=", "..=", "#{", "==", "!=", "<=", ">=", "&&", "||", "+=", "-=", "*=",
    "/=", "%=", "&=", "|=", "^=", "**", "=>", "::", "..", "?.", "??", "?[", "<<", ">>",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    Text,
    Punct,
    Newline,
}

/// One lexical unit of the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte range in the original text.
    pub start: usize,
    pub end: usize,
    pub line: usize,
    /// 1-based, in characters.
    pub column: usize,
}

impl Token<'_> {
    pub(crate) fn is(&self, kind: TokenKind, text: &str) -> bool {
        self.kind == kind && self.text == text
    }

    pub(crate) fn is_punct(&self, text: &str) -> bool {
        self.is(TokenKind::Punct, text)
    }

    pub(crate) fn is_word(&self, text: &str) -> bool {
        self.is(TokenKind::Ident, text)
    }
}

/// Splits `text` into tokens. Comments and blank space are dropped, except
/// that line breaks (including those inside block comments) are kept.
///
/// Unterminated strings and comments run to the end of the text; the
/// compiler reports them.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let offset = |i: usize| chars.get(i).map_or(text.len(), |(byte, _)| *byte);
    let at = |i: usize| chars.get(i).map(|(_, c)| *c);

    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line = 1;
    let mut line_start = 0;

    while let Some(c) = at(i) {
        let begin = i;
        let (token_line, column) = (line, i - line_start + 1);

        let kind = match c {
            '\n' => {
                i += 1;
                line += 1;
                line_start = i;
                TokenKind::Newline
            }
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '/' if at(i + 1) == Some('/') => {
                while at(i).is_some_and(|c| c != '\n') {
                    i += 1;
                }
                continue;
            }
            '/' if at(i + 1) == Some('*') => {
                let mut depth = 0;
                let mut broke_line = false;
                while let Some(c) = at(i) {
                    match (c, at(i + 1)) {
                        ('/', Some('*')) => {
                            depth += 1;
                            i += 2;
                        }
                        ('*', Some('/')) => {
                            depth -= 1;
                            i += 2;
                            if depth == 0 {
                                break;
                            }
                        }
                        ('\n', _) => {
                            i += 1;
                            line += 1;
                            line_start = i;
                            broke_line = true;
                        }
                        _ => i += 1,
                    }
                }
                if !broke_line {
                    continue;
                }
                TokenKind::Newline
            }
            '"' | '\'' | '`' => {
                i += 1;
                while let Some(c) = at(i) {
                    i += 1;
                    match c {
                        '\\' if chars[begin].1 != '`' => {
                            if at(i) == Some('\n') {
                                line += 1;
                                line_start = i + 1;
                            }
                            i += 1;
                        }
                        '\n' => {
                            line += 1;
                            line_start = i;
                        }
                        c if c == chars[begin].1 => break,
                        _ => {}
                    }
                }
                TokenKind::Text
            }
            c if c.is_ascii_digit() => {
                let hex = matches!(at(i + 1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B')) && c == '0';
                let digit_at = |j: usize| at(j).is_some_and(|c| c.is_ascii_digit());
                let mut seen_dot = false;
                loop {
                    match at(i) {
                        Some(c) if c.is_ascii_alphanumeric() || c == '_' => i += 1,
                        Some('.') if !seen_dot && !hex && digit_at(i + 1) => {
                            seen_dot = true;
                            i += 1;
                        }
                        Some('+' | '-')
                            if !hex
                                && matches!(at(i - 1), Some('e' | 'E'))
                                && digit_at(i + 1) =>
                        {
                            i += 1
                        }
                        _ => break,
                    }
                }
                TokenKind::Number
            }
            c if c.is_alphabetic() || c == '_' => {
                while at(i).is_some_and(|c| c.is_alphanumeric() || c == '_') {
                    i += 1;
                }
                TokenKind::Ident
            }
            _ => {
                let rest = &text[offset(i)..];
                i += PUNCTUATION
                    .iter()
                    .find(|p| rest.starts_with(*p))
                    .map_or(1, |p| p.len());
                TokenKind::Punct
            }
        };

        let (start, end) = (offset(begin), offset(i));
        tokens.push(Token {
            kind,
            text: &text[start..end],
            start,
            end,
            line: token_line,
            column,
        });
    }
    tokens
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Plain,
    Function,
    Do,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Nesting {
    /// `(`, `[` or `?[`.
    Group,
    /// `#{`.
    Map,
    Block(Block),
}

/// A script ready to compile, with what the engine needs to know about it.
#[derive(Debug, Clone)]
pub struct Prepared<'a> {
    /// Text handed to the compiler.
    pub source: String,
    /// Names to declare before running, in order of first assignment.
    pub declared: Vec<String>,
    /// Whether the final statement was captured into [`RESULT_SLOT`].
    pub captured: bool,
    tokens: Vec<Token<'a>>,
    /// `(line, column, width)` of the inserted capture prefix.
    shift: Option<(usize, usize, usize)>,
}

impl<'a> Prepared<'a> {
    /// Tokens of the original text.
    pub fn tokens(&self) -> &[Token<'a>] {
        &self.tokens
    }

    /// Maps a compiler column on `line` back to the original text.
    pub fn original_column(&self, line: usize, column: usize) -> usize {
        match self.shift {
            Some((shifted, start, width)) if shifted == line && column >= start + width => {
                column - width
            }
            Some((shifted, start, _)) if shifted == line && column > start => start,
            _ => column,
        }
    }
}

fn significant<'t, 'a>(
    tokens: &'t [Token<'a>],
    range: impl Iterator<Item = usize>,
) -> Option<&'t Token<'a>> {
    range
        .map(|i| &tokens[i])
        .find(|t| t.kind != TokenKind::Newline)
}

fn in_statement_position(stack: &[Nesting]) -> bool {
    matches!(stack.last(), None | Some(Nesting::Block(_)))
}

/// Whether the line break at `index` ends the statement before it.
fn breaks_statement(tokens: &[Token<'_>], index: usize, after_do: bool) -> bool {
    let Some(previous) = significant(tokens, (0..index).rev()) else {
        return false;
    };
    let Some(next) = significant(tokens, index + 1..tokens.len()) else {
        return false;
    };

    let open = match previous.kind {
        TokenKind::Punct => OPEN_PUNCTUATION.contains(&previous.text),
        TokenKind::Ident => OPEN_KEYWORDS.contains(&previous.text),
        _ => false,
    };
    let continued = match next.kind {
        TokenKind::Punct => CONTINUING_PUNCTUATION.contains(&next.text),
        TokenKind::Ident => {
            matches!(next.text, "else" | "catch")
                || (after_do && matches!(next.text, "while" | "until"))
        }
        _ => false,
    };
    !open && !continued
}

/// Whether the statement starting at `first` is a bare expression.
fn is_expression(tokens: &[Token<'_>], first: usize) -> bool {
    let head = &tokens[first];
    if head.kind == TokenKind::Ident && STATEMENT_KEYWORDS.contains(&head.text) {
        return false;
    }
    let mut depth = 0usize;
    for token in &tokens[first..] {
        if token.kind != TokenKind::Punct {
            continue;
        }
        match token.text {
            "(" | "[" | "?[" | "{" | "#{" => depth += 1,
            ")" | "]" | "}" => depth = depth.saturating_sub(1),
            op if depth == 0 && ASSIGNMENT_OPERATORS.contains(&op) => return false,
            _ => {}
        }
    }
    true
}

/// Whether the `-` at `index` is a prefix operator.
fn is_prefix_minus(tokens: &[Token<'_>], index: usize) -> bool {
    match significant(tokens, (0..index).rev()) {
        None => true,
        Some(previous) => match previous.kind {
            TokenKind::Punct => !matches!(previous.text, ")" | "]" | "}"),
            TokenKind::Ident => matches!(previous.text, "return" | "in" | "throw"),
            _ => false,
        },
    }
}

/// Prepares `text` for compilation.
pub fn prepare(text: &str) -> Prepared<'_> {
    let tokens = tokenize(text);
    let mut edits: Vec<(usize, usize, String)> = Vec::new();
    let mut declared: Vec<String> = Vec::new();
    let mut statements: Vec<usize> = Vec::new();
    let mut stack: Vec<Nesting> = Vec::new();
    let mut pending = Block::Plain;
    let mut at_start = true;
    let mut closed_do = false;
    let mut terminated: Option<usize> = None;

    for (index, token) in tokens.iter().enumerate() {
        if token.kind == TokenKind::Newline {
            if in_statement_position(&stack) && breaks_statement(&tokens, index, closed_do) {
                let previous = significant(&tokens, (0..index).rev()).map(|t| t.end);
                if let Some(end) = previous.filter(|end| terminated != Some(*end)) {
                    edits.push((end, end, ";".to_string()));
                    terminated = Some(end);
                }
                at_start = true;
            }
            continue;
        }

        let continuation = token.is_word("else")
            || token.is_word("catch")
            || (closed_do && (token.is_word("while") || token.is_word("until")))
            || token.is_punct(";")
            || token.is_punct("}");
        if at_start && !continuation {
            if stack.is_empty() {
                statements.push(index);
            }
            let assigned = token.kind == TokenKind::Ident
                && !STATEMENT_KEYWORDS.contains(&token.text)
                && significant(&tokens, index + 1..tokens.len()).is_some_and(|n| n.is_punct("="));
            let in_function = stack.contains(&Nesting::Block(Block::Function));
            if assigned && !in_function && !declared.iter().any(|d| d == token.text) {
                declared.push(token.text.to_string());
            }
            at_start = false;
        }
        closed_do = false;

        match token.kind {
            TokenKind::Ident if token.text == "fn" => pending = Block::Function,
            TokenKind::Ident if token.text == "do" => pending = Block::Do,
            TokenKind::Number if token.text == MIN_INT_MAGNITUDE => {
                let minus = (0..index).rev().find(|&i| tokens[i].kind != TokenKind::Newline);
                if let Some(minus) = minus.filter(|&i| tokens[i].is_punct("-")) {
                    if is_prefix_minus(&tokens, minus) {
                        edits.push((tokens[minus].start, token.end, MIN_INT_SPELLED.to_string()));
                    }
                }
            }
            TokenKind::Punct => match token.text {
                "(" | "[" | "?[" => stack.push(Nesting::Group),
                "#{" => stack.push(Nesting::Map),
                "{" => {
                    stack.push(Nesting::Block(pending));
                    pending = Block::Plain;
                    at_start = true;
                }
                ")" | "]" => {
                    stack.pop();
                }
                "}" => {
                    closed_do = stack.pop() == Some(Nesting::Block(Block::Do));
                }
                ";" if in_statement_position(&stack) => at_start = true,
                _ => {}
            },
            _ => {}
        }
    }

    let mut shift = None;
    let mut captured = false;
    if let Some(&first) = statements.last() {
        if is_expression(&tokens, first) {
            let head = &tokens[first];
            let prefix = format!("{} = ", RESULT_SLOT);
            shift = Some((head.line, head.column, prefix.len()));
            edits.push((head.start, head.start, prefix));
            captured = true;
        }
    }

    // Insertions go before a replacement that starts at the same offset.
    edits.sort_by_key(|(start, end, _)| (*start, *end));
    let mut source = String::with_capacity(text.len() + 32);
    let mut copied = 0;
    for (start, end, replacement) in &edits {
        source.push_str(&text[copied..*start]);
        source.push_str(replacement);
        copied = *end;
    }
    source.push_str(&text[copied..]);

    Prepared {
        source,
        declared,
        captured,
        tokens,
        shift,
    }
}
