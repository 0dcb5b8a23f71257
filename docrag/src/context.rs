//! Bounding re-ranked text to the generator's context budget.

use tracing::debug;

/// Truncates context text to a character budget.
///
/// Text within budget passes through untouched. Longer text is cut at the
/// last whitespace boundary inside the budget so no word is split; text with
/// no such boundary is cut at exactly `max_chars` characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextAssembler {
    max_chars: usize,
}

impl ContextAssembler {
    /// Create an assembler with a budget of `max_chars` characters.
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    /// The configured budget.
    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Bound `text` to the budget.
    pub fn assemble(&self, text: &str) -> String {
        // Byte offset of the first character past the budget, if any.
        let Some((cut, _)) = text.char_indices().nth(self.max_chars) else {
            return text.to_string();
        };

        let prefix = &text[..cut];
        let next_is_boundary = text[cut..].starts_with(char::is_whitespace);
        let boundary = if next_is_boundary {
            Some(cut)
        } else {
            prefix.char_indices().rev().find(|(_, c)| c.is_whitespace()).map(|(i, _)| i)
        };

        let truncated = match boundary.map(|i| prefix[..i].trim_end()) {
            Some(kept) if !kept.is_empty() => kept,
            _ => prefix,
        };
        debug!(
            original_chars = text.chars().count(),
            kept_chars = truncated.chars().count(),
            budget = self.max_chars,
            "truncated context"
        );
        truncated.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn within_budget_passes_through() {
        assert_eq!(ContextAssembler::new(11).assemble("hello world"), "hello world");
        assert_eq!(ContextAssembler::new(100).assemble(""), "");
    }

    #[test]
    fn cuts_at_word_boundary() {
        assert_eq!(ContextAssembler::new(13).assemble("hello wonderful world"), "hello");
        assert_eq!(ContextAssembler::new(15).assemble("hello wonderful world"), "hello wonderful");
    }

    #[test]
    fn hard_cut_without_boundary() {
        assert_eq!(ContextAssembler::new(4).assemble("abcdefgh"), "abcd");
        assert_eq!(ContextAssembler::new(3).assemble("  abcdef"), "  a");
    }

    #[test]
    fn zero_budget_yields_empty() {
        assert_eq!(ContextAssembler::new(0).assemble("abc"), "");
    }
}
