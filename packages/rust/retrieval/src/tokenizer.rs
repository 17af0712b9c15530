//! Text normalization for lexical matching.

use std::sync::LazyLock;

use regex::Regex;

/// Tokens shorter than this are dropped ("to", "is", "an", ...).
pub const MIN_TOKEN_LEN: usize = 3;

/// Split text into lowercase alphanumeric tokens of at least [`MIN_TOKEN_LEN`] chars.
///
/// Every character outside `[a-z0-9]` (after lowercasing) acts as a separator.
/// Order and duplicates are preserved.
pub fn tokenize(text: &str) -> Vec<String> {
    static NON_ALNUM_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

    let lowered = text.to_lowercase();
    NON_ALNUM_RE
        .replace_all(&lowered, " ")
        .split_whitespace()
        .filter(|token| token.len() >= MIN_TOKEN_LEN)
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_lowercases() {
        assert_eq!(tokenize("The User's Question!"), vec!["the", "user", "question"]);
    }

    #[test]
    fn drops_short_tokens() {
        assert_eq!(
            tokenize("How to log in to an MFA portal"),
            vec!["how", "log", "mfa", "portal"]
        );
    }

    #[test]
    fn keeps_digits_and_duplicates() {
        assert_eq!(
            tokenize("AES-256 and aes-256 encryption"),
            vec!["aes", "256", "and", "aes", "256", "encryption"]
        );
    }

    #[test]
    fn non_ascii_letters_are_separators() {
        assert_eq!(tokenize("données chiffrées"), vec!["donn", "chiffr"]);
    }

    #[test]
    fn empty_and_blank_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  ?! -- ").is_empty());
    }
}
