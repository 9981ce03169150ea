// Text entry strategy for `adb shell input text`.
// ASCII goes through `input text` with shell escaping; anything else needs the
// ADB Keyboard IME, which receives the text as a base64 broadcast.
use base64::Engine as _;

/// Broadcast action understood by the ADB Keyboard IME.
pub const ADB_KEYBOARD_B64_ACTION: &str = "ADB_INPUT_B64";

/// Returns true if `input text` cannot type this string.
pub fn needs_ime(text: &str) -> bool {
    !text.is_ascii()
}

/// Escapes `text` for `input text`, which runs through the device shell.
/// Spaces become `%s`, the encoding `input` expects.
pub fn escape_for_input_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for ch in text.chars() {
        match ch {
            ' ' => out.push_str("%s"),
            '\\' | '\'' | '"' | '(' | ')' | '&' | '<' | '>' | '|' | ';' | '*' | '~' | '`' | '$'
            | '?' | '#' | '[' | ']' | '{' | '}' | '!' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

pub fn ime_payload(text: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(text.as_bytes())
}

/// IME component id for `ime enable` / `ime set`.
pub fn ime_component(package: &str) -> String {
    format!("{package}/.AdbIME")
}
