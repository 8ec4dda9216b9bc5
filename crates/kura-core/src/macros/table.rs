use indexmap::IndexMap;
use log::debug;
use parking_lot::Mutex;

use crate::macros::error::MacroSystemError;

/// Well-known file spec tokens understood by every storage manager.
pub mod path_macros {
    /// Root directory for application-level configuration files.
    pub const APP_CONFIG: &str = "$APP_CONFIG$";
    /// Spec of the workspace-local file. Data stored under it never
    /// roams, whatever classification a caller requests.
    pub const WORKSPACE_FILE: &str = "$WORKSPACE_FILE$";
}

/// Ordered table of `$NAME$` path macros.
///
/// Expansion and collapse both run a single substitution pass in
/// registration order, so the table's insertion order is part of its
/// contract. The table grows for the life of its manager and never
/// shrinks; re-registering a token silently overwrites its expansion
/// while keeping the original position.
#[derive(Debug, Default)]
pub struct MacroTable {
    entries: Mutex<IndexMap<String, String>>,
}

impl MacroTable {
    /// Create an empty macro table
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
        }
    }

    /// Register or overwrite a macro. Safe to call concurrently; the
    /// table carries its own lock, independent of the registry lock.
    pub fn add_macro(&self, token: impl Into<String>, expansion: impl Into<String>) {
        let token = token.into();
        let expansion = expansion.into();
        debug!("Registering path macro {} -> {}", token, expansion);
        self.entries.lock().insert(token, expansion);
    }

    /// Number of registered macros
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Registered tokens, in registration order
    pub fn tokens(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Current expansion of `token`, if registered
    pub fn expansion_of(&self, token: &str) -> Option<String> {
        self.entries.lock().get(token).cloned()
    }

    /// Expand every macro occurring in `input`.
    ///
    /// Each `$NAME$` token found in the input must be registered,
    /// otherwise the whole call fails with
    /// [`MacroSystemError::UnknownMacro`]. Substitution is one pass over
    /// the registered macros in registration order; a token introduced
    /// *by* an earlier replacement is only picked up if its macro comes
    /// later in the table, and the output is never re-scanned. Expansion
    /// is not recursive.
    pub fn expand(&self, input: &str) -> Result<String, MacroSystemError> {
        let entries = self.entries.lock();
        for token in scan_tokens(input) {
            if !entries.contains_key(token) {
                return Err(MacroSystemError::UnknownMacro {
                    token: token.to_string(),
                    input: input.to_string(),
                });
            }
        }
        let mut out = input.to_string();
        for (token, expansion) in entries.iter() {
            if out.contains(token.as_str()) {
                out = out.replace(token.as_str(), expansion);
            }
        }
        Ok(out)
    }

    /// Replace each macro's expansion value with its token.
    ///
    /// The inverse direction of [`expand`](Self::expand): one pass, in
    /// registration order, no recursion. Where two expansions overlap the
    /// first-registered macro wins for a given position.
    pub fn collapse(&self, input: &str) -> String {
        let entries = self.entries.lock();
        let mut out = input.to_string();
        for (token, expansion) in entries.iter() {
            if !expansion.is_empty() && out.contains(expansion.as_str()) {
                out = out.replace(expansion.as_str(), token);
            }
        }
        out
    }
}

/// Find `$NAME$` occurrences in `input` (minimal match, non-nested).
///
/// A candidate only counts as a token when the text between the dollar
/// signs is a plain macro name; anything else (spaces, separators, an
/// empty span) leaves the second `$` free to open the next candidate.
fn scan_tokens(input: &str) -> Vec<&str> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        match bytes[i + 1..].iter().position(|&b| b == b'$') {
            None => break,
            Some(off) => {
                let j = i + 1 + off;
                let name = &input[i + 1..j];
                if !name.is_empty() && name.bytes().all(is_token_byte) {
                    tokens.push(&input[i..=j]);
                    i = j + 1;
                } else {
                    i = j;
                }
            }
        }
    }
    tokens
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'-'
}
