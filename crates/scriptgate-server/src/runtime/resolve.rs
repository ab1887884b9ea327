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

//! Static name resolution.
//!
//! Runs after compilation and before execution, so a script that reaches
//! for a capability outside the whitelist is rejected before it can make
//! any terminal call. Variable reads are already checked by the compiler;
//! this pass covers what it leaves to runtime:
//!
//! - `module::member` paths, which must name a bound module and one of its
//!   members
//! - calls of forbidden names the script does not define itself

use scriptgate_common::GateError;

use super::rewrite::{Prepared, Token, TokenKind};
use crate::namespace::Namespace;

/// Module path root that always refers to the script's own globals.
const GLOBAL_MODULE: &str = "global";

/// Verifies every module path and call in `prepared` against `namespace`.
///
/// # Errors
///
/// Returns the `NameError` and the line it was found on.
pub fn check_names(prepared: &Prepared<'_>, namespace: &Namespace) -> Result<(), (GateError, usize)> {
    let tokens: Vec<&Token<'_>> = prepared
        .tokens()
        .iter()
        .filter(|t| t.kind != TokenKind::Newline)
        .collect();
    let defined: Vec<&str> = tokens
        .windows(2)
        .filter(|pair| pair[0].is_word("fn") && pair[1].kind == TokenKind::Ident)
        .map(|pair| pair[1].text)
        .collect();

    for (i, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Ident {
            continue;
        }
        let previous = i.checked_sub(1).map(|p| tokens[p]);
        let next = tokens.get(i + 1);

        if next.is_some_and(|t| t.is_punct("::")) {
            if previous.is_some_and(|t| t.is_punct("::")) || token.text == GLOBAL_MODULE {
                continue;
            }
            let member = tokens.get(i + 2).filter(|t| t.kind == TokenKind::Ident);
            check_path(namespace, token, member.copied())?;
            continue;
        }

        let is_call = next.is_some_and(|t| t.is_punct("("));
        let is_method = previous.is_some_and(|t| {
            t.is_punct(".") || t.is_punct("?.") || t.is_punct("::") || t.is_word("fn")
        });
        if is_call
            && !is_method
            && namespace.is_forbidden(token.text)
            && !defined.contains(&token.text)
        {
            return Err((
                GateError::NameResolution(format!("name '{}' is not defined", token.text)),
                token.line,
            ));
        }
    }
    Ok(())
}

fn check_path(
    namespace: &Namespace,
    module: &Token<'_>,
    member: Option<&Token<'_>>,
) -> Result<(), (GateError, usize)> {
    let Some(members) = namespace.module_members(module.text) else {
        return Err((
            GateError::NameResolution(format!("name '{}' is not defined", module.text)),
            module.line,
        ));
    };
    match member {
        Some(member) if !members.iter().any(|m| m == member.text) => Err((
            GateError::NameResolution(format!(
                "module '{}' has no member '{}'",
                module.text, member.text
            )),
            member.line,
        )),
        _ => Ok(()),
    }
}
