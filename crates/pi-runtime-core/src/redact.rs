//! Pattern-based sanitiser for sensitive substrings in error messages.
//!
//! Applied to every message passed through [`crate::error::RuntimeError::new`] so
//! that API keys and bearer tokens surfaced from upstream LLM providers never reach
//! logs or host callers intact.

/// Prefixes recognized as the start of an API-key-shaped token.
const KEY_PREFIXES: &[&str] = &["sk-ant-", "sk-", "Bearer ", "bearer "];

/// Replaces any substring starting with a known key prefix and followed by a run of
/// token-like characters with `{prefix}***redacted***`.
///
/// Scans for the earliest-starting match across all prefixes rather than
/// picking the first prefix in `KEY_PREFIXES` order that matches anywhere —
/// otherwise a prefix listed earlier but occurring later in the text (e.g.
/// `sk-ant-` before `sk-`) would win the match and copy an earlier, still
/// unredacted secret straight into the output via `rest[..start]`. Ties at
/// the same start (`sk-ant-abc` also matches the shorter `sk-` prefix) go to
/// the longer, more specific prefix.
pub fn redact(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut rest = message;

    loop {
        let mut best: Option<(usize, &str, usize)> = None;
        for prefix in KEY_PREFIXES {
            let Some(start) = rest.find(prefix) else {
                continue;
            };
            let token_start = start + prefix.len();
            let token_end = rest[token_start..]
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
                .map(|off| token_start + off)
                .unwrap_or(rest.len());
            if token_end <= token_start {
                continue;
            }

            let better = match best {
                None => true,
                Some((best_start, best_prefix, _)) => {
                    start < best_start || (start == best_start && prefix.len() > best_prefix.len())
                }
            };
            if better {
                best = Some((start, prefix, token_end));
            }
        }

        let Some((start, prefix, token_end)) = best else {
            break;
        };
        out.push_str(&rest[..start]);
        out.push_str(prefix.trim_end());
        out.push_str("***redacted***");
        rest = &rest[token_end..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_anthropic_key() {
        let redacted = redact("failed with token sk-ant-abc123XYZ_456 in request");
        assert!(!redacted.contains("abc123XYZ_456"));
        assert!(redacted.contains("***redacted***"));
    }

    #[test]
    fn redacts_bearer_header() {
        let redacted = redact("Authorization: Bearer abcDEF123 rejected");
        assert!(!redacted.contains("abcDEF123"));
    }

    #[test]
    fn leaves_ordinary_text_untouched() {
        assert_eq!(redact("upstream returned 503"), "upstream returned 503");
    }

    #[test]
    fn redacts_multiple_occurrences() {
        let redacted = redact("keys sk-aaa111 and sk-bbb222 both leaked");
        assert!(!redacted.contains("aaa111"));
        assert!(!redacted.contains("bbb222"));
    }

    #[test]
    fn redacts_earlier_secret_even_when_a_later_prefix_is_tried_first() {
        // "sk-ant-" sorts before "sk-" in KEY_PREFIXES, but the "sk-"
        // occurrence here comes first in the string; it must not be
        // skipped over in favor of the later "sk-ant-" match.
        let redacted = redact("leaked sk-AAAA and sk-ant-BBBB");
        assert!(!redacted.contains("AAAA"));
        assert!(!redacted.contains("BBBB"));
    }
}
