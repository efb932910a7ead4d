//! Resolves a logical key name to the `(code, key, windows_virtual_key_code,
//! is_char)` tuple CDP's `Input.dispatchKeyEvent` needs.
//!
//! No example repo drives raw CDP key events (phoenix-ide's `type_str` path
//! never needs `code`/`keyCode` at all — see `tools.rs`'s per-part dispatch).
//! This table is a fresh extrapolation from the CDP `UIEvent.code` values,
//! scoped to the named keys the spec calls out explicitly.

/// A resolved key event target, independent of whether it's pressed or released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKey {
    pub code: String,
    pub key: String,
    pub windows_virtual_key_code: i64,
    /// True for single printable characters, where CDP also wants `text` set.
    pub is_char: bool,
}

impl ResolvedKey {
    fn named(code: &str, key: &str, windows_virtual_key_code: i64) -> Self {
        Self { code: code.to_owned(), key: key.to_owned(), windows_virtual_key_code, is_char: false }
    }
}

const NAMED_KEYS: &[(&str, &str, &str, i64)] = &[
    ("Enter", "Enter", "Enter", 13),
    ("Tab", "Tab", "Tab", 9),
    ("Escape", "Escape", "Escape", 27),
    ("Backspace", "Backspace", "Backspace", 8),
    ("Delete", "Delete", "Delete", 46),
    ("Home", "Home", "Home", 36),
    ("End", "End", "End", 35),
    ("PageUp", "PageUp", "PageUp", 33),
    ("PageDown", "PageDown", "PageDown", 34),
    ("ArrowUp", "ArrowUp", "ArrowUp", 38),
    ("ArrowDown", "ArrowDown", "ArrowDown", 40),
    ("ArrowLeft", "ArrowLeft", "ArrowLeft", 37),
    ("ArrowRight", "ArrowRight", "ArrowRight", 39),
    ("Shift", "ShiftLeft", "Shift", 16),
    ("Control", "ControlLeft", "Control", 17),
    ("Alt", "AltLeft", "Alt", 18),
    ("Meta", "MetaLeft", "Meta", 91),
    ("CapsLock", "CapsLock", "CapsLock", 20),
    ("Insert", "Insert", "Insert", 45),
    ("F1", "F1", "F1", 112),
    ("F2", "F2", "F2", 113),
    ("F3", "F3", "F3", 114),
    ("F4", "F4", "F4", 115),
    ("F5", "F5", "F5", 116),
    ("F6", "F6", "F6", 117),
    ("F7", "F7", "F7", 118),
    ("F8", "F8", "F8", 119),
    ("F9", "F9", "F9", 120),
    ("F10", "F10", "F10", 121),
    ("F11", "F11", "F11", 122),
    ("F12", "F12", "F12", 123),
];

/// F13-F24 follow F12's virtual-key-code run contiguously (124..135) and
/// would bloat the static table above; resolved separately.
fn resolve_extended_function_key(name: &str) -> Option<ResolvedKey> {
    let n: u32 = name.strip_prefix('F')?.parse().ok()?;
    if !(13..=24).contains(&n) {
        return None;
    }
    let label = format!("F{n}");
    Some(ResolvedKey::named(&label, &label, 112 + n as i64 - 1))
}

fn resolve_single_char(ch: char) -> Option<ResolvedKey> {
    if ch.is_ascii_alphabetic() {
        let upper = ch.to_ascii_uppercase();
        return Some(ResolvedKey {
            code: format!("Key{upper}"),
            key: ch.to_string(),
            windows_virtual_key_code: upper as i64,
            is_char: true,
        });
    }
    if ch.is_ascii_digit() {
        return Some(ResolvedKey {
            code: format!("Digit{ch}"),
            key: ch.to_string(),
            windows_virtual_key_code: ch as i64,
            is_char: true,
        });
    }
    Some(ResolvedKey { code: String::new(), key: ch.to_string(), windows_virtual_key_code: ch as i64, is_char: true })
}

/// Resolve a logical key name (`"Enter"`, `"ArrowLeft"`, `"a"`, `"F13"`, ...)
/// to the CDP fields needed for a key event. Falls back to the single-char
/// heuristic when `name` isn't a recognized named key.
pub fn resolve_key(name: &str) -> Option<ResolvedKey> {
    if let Some((_, code, key, vk)) = NAMED_KEYS.iter().find(|(n, ..)| *n == name) {
        return Some(ResolvedKey::named(code, key, *vk));
    }
    if let Some(found) = resolve_extended_function_key(name) {
        return Some(found);
    }
    let mut chars = name.chars();
    let first = chars.next()?;
    if chars.next().is_none() {
        return resolve_single_char(first);
    }
    None
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
