//! Tokenization of a single pipeline segment.
//!
//! The shell has no quoting and no escaping: a segment is split on spaces, runs
//! of spaces count as one delimiter, and the redirection operators are only
//! recognized when they stand alone as a whole token.

/// A token of a pipeline segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Any token that is not an operator.
    Word(String),
    /// Input redirection symbol, `<`.
    RedirectLeft,
    /// Output redirection symbol, `>`.
    RedirectRight,
}

impl Token {
    fn classify(text: &str) -> Self {
        match text {
            "<" => Token::RedirectLeft,
            ">" => Token::RedirectRight,
            word => Token::Word(word.to_string()),
        }
    }
}

/// Split `segment` into at most `max_tokens` tokens. Extra tokens are dropped.
pub fn split_into_tokens(segment: &str, max_tokens: usize) -> Vec<Token> {
    segment
        .split(' ')
        .filter(|piece| !piece.is_empty())
        .take(max_tokens)
        .map(Token::classify)
        .collect()
}
