//! The tokenizer external collaborator, required when a compaction
//! policy is configured (`spec.md` §6).

use crate::messages::Message;

/// `countTokens(messages) -> Int`.
pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, messages: &[Message]) -> u64;
}

/// A whitespace-splitting tokenizer, useful for tests and as a
/// dependency-free default; production deployments supply a real
/// tokenizer matching their model provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn count_tokens(&self, messages: &[Message]) -> u64 {
        messages
            .iter()
            .map(|m| m.content.split_whitespace().count() as u64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Role;

    #[test]
    fn counts_whitespace_separated_tokens_across_messages() {
        let tokenizer = WhitespaceTokenizer;
        let messages = vec![
            Message::new("m1", Role::User, "hello there"),
            Message::new("m2", Role::Assistant, "hi"),
        ];
        assert_eq!(tokenizer.count_tokens(&messages), 3);
    }
}
