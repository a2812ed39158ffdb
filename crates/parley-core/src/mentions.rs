//! Lexical mention scanning.
//!
//! Three surface forms are recognized:
//!
//! - `@[token]`: bracketed, may contain spaces
//! - `<@token>`: angle-bracketed
//! - `@word`: bare; must not follow a word character (so `a@b.com` is not a
//!   mention) and never ends in `.` or `-`
//!
//! Broadcast mentions (`@all`, `@everyone`, `@channel`, `@here`) are detected
//! separately by [`is_mention_all`], with the same token boundaries as bare
//! mentions: `@all-hands` is the token `all-hands`, not a broadcast.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@\[([^\]\r\n]+)\]|<@([^>\s]+)>|@(\w(?:[\w.-]*\w)?)")
        .unwrap_or_else(|e| unreachable!("mention pattern is valid: {e}"))
});

static MENTION_ALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^\w])@(?:all|everyone|channel|here)(?:$|[^\w.-]|[.-](?:$|[^\w]))")
        .unwrap_or_else(|e| unreachable!("mention-all pattern is valid: {e}"))
});

/// Extract distinct mention tokens in first-occurrence order.
pub fn extract_mentions(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();

    for caps in MENTION_RE.captures_iter(text) {
        let token = if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
            m.as_str().trim()
        } else if let Some(m) = caps.get(3) {
            // `@` sits one byte before the bare token.
            let at = m.start() - 1;
            let preceded_by_word = text[..at]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric() || c == '_');
            if preceded_by_word {
                continue;
            }
            m.as_str()
        } else {
            continue;
        };

        if token.is_empty() {
            continue;
        }
        if seen.insert(token.to_owned()) {
            tokens.push(token.to_owned());
        }
    }

    tokens
}

/// Whether `text` addresses everyone (`@all`, `@everyone`, `@channel`, `@here`).
pub fn is_mention_all(text: &str) -> bool {
    MENTION_ALL_RE.is_match(text)
}
