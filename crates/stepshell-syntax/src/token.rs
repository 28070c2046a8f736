//! Token taxonomy and the single-pass lexer.
//!
//! The lexer is a thin wrapper around a `logos`-derived [`TokenKind`]
//! that turns a source string into a flat, append-only [`Vec<Token>`]
//! ending in an explicit `EOF` sentinel. Trivia (`WHITESPACE`) is
//! never materialized into a `Token`; it only feeds `has_space_before`
//! on the token that follows it. `COMMENT` and `NEWLINE` *are* kept in
//! the vector, per the data model: the parser steps over them but a
//! whitespace-invariance check can still reconstruct their positions.

use logos::{Lexer as LogosLexer, Logos};

/// The lexer's closed token taxonomy. Distinct from [`crate::event::NodeKind`],
/// the parser's tree-node taxonomy: a token is never also a node kind here.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum TokenKind {
    // region: keywords
    #[token("fun")]
    Fun,
    #[token("var")]
    Var,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("when")]
    When,
    #[token("try")]
    Try,
    #[token("catch")]
    Catch,
    #[token("finally")]
    Finally,
    #[token("enum")]
    Enum,
    // endregion

    #[regex("true|false")]
    Boolean,

    // region: punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LSquare,
    #[token("]")]
    RSquare,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token("@")]
    At,
    // endregion

    // region: operators, longest-match-sensitive ones first
    #[token("...")]
    DotDotDot,
    #[token("->")]
    Arrow,
    #[token(">>")]
    Append,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("++")]
    Increment,
    #[token("--")]
    Decrement,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    MultiplyAssign,
    #[token("/=")]
    DivideAssign,
    #[token("%=")]
    ModuloAssign,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Multiply,
    #[token("/")]
    Divide,
    #[token("%")]
    Modulo,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("=")]
    Equals,
    #[token("!")]
    Not,
    #[token("|")]
    Pipe,
    #[token("&")]
    Ampersand,
    #[token("^")]
    Caret,
    #[token("?")]
    Question,
    // endregion

    // region: literals
    //
    // `Duration` is deliberately over-broad: it matches any digit run
    // followed by a trailing word (`30s`, `5mode`, `30sec`) so that it
    // always out-munches a plain `Integer`. `tokenize` below then
    // decides, by inspecting the matched text, whether the trailing
    // word is a real unit (keep as `Duration`) or not (split back into
    // `Integer` + `Identifier` without losing the digit run).
    #[regex(r"[0-9][0-9_]*[A-Za-z_][0-9A-Za-z_]*", priority = 3)]
    Duration,

    #[regex(r"[0-9][0-9_]*", priority = 2)]
    Integer,

    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*([eE][+-]?[0-9]+)?", priority = 2)]
    Float,

    #[token(r#"""#, lex_double_quoted_string)]
    #[token("'", lex_single_quoted_string)]
    String,

    #[regex("[A-Za-z_][0-9A-Za-z_]*")]
    Identifier,
    // endregion

    // region: trivia and structure
    #[regex(r"#[^\n\r]*")]
    #[regex(r"//[^\n\r]*")]
    #[token("/*", lex_block_comment)]
    Comment,

    #[regex(r"\r\n|\n")]
    Newline,

    #[regex(r"[ \t]+")]
    Whitespace,

    #[error]
    Illegal,
    // endregion

    /// Never produced by the logos lexer; only appended by [`tokenize`]
    /// as the trailing sentinel.
    #[doc(hidden)]
    Eof,
}

impl TokenKind {
    /// Whether this kind is never pushed into the significant token
    /// stream on its own (it only influences `has_space_before`).
    #[must_use]
    pub fn is_inline_trivia(self) -> bool {
        matches!(self, TokenKind::Whitespace)
    }
}

/// Recognized duration unit suffixes (§6.1).
const DURATION_UNITS: [&str; 7] = ["ns", "us", "ms", "s", "m", "h", "d"];

/// Split a matched `Duration` token's text at the boundary between its
/// digit run (digits and `_` separators) and whatever trails it.
fn split_duration_text(text: &str) -> (&str, &str) {
    let digit_end = text
        .find(|c: char| !(c.is_ascii_digit() || c == '_'))
        .unwrap_or(text.len());
    text.split_at(digit_end)
}

fn lex_double_quoted_string(lex: &mut LogosLexer<TokenKind>) -> Option<()> {
    lex_quoted_string(lex, b'"')
}

fn lex_single_quoted_string(lex: &mut LogosLexer<TokenKind>) -> Option<()> {
    lex_quoted_string(lex, b'\'')
}

fn lex_quoted_string(lex: &mut LogosLexer<TokenKind>, quote: u8) -> Option<()> {
    let mut escaped = false;
    for (i, b) in lex.remainder().bytes().enumerate() {
        if !escaped && b == quote {
            lex.bump(i + 1);
            return Some(());
        }
        escaped = !escaped && b == b'\\';
    }
    // Unterminated string: consume to EOF so the lexer still makes
    // progress; the parser reports the malformed/empty string case
    // per the string-interpolation degrade-to-Literal rule.
    let len = lex.remainder().len();
    lex.bump(len);
    Some(())
}

// Nested block comments, the same byte-scanning technique used for
// quoted strings above: track a depth counter across "/*" and "*/".
fn lex_block_comment(lex: &mut LogosLexer<TokenKind>) -> Option<()> {
    let mut depth = 1usize;
    let mut to_bump = 0usize;
    let mut last = 0u8;

    for b in lex.remainder().bytes() {
        to_bump += 1;
        match (last, b) {
            (b'/', b'*') => depth += 1,
            (b'*', b'/') => depth -= 1,
            _ => {}
        }
        last = b;
        if depth == 0 {
            break;
        }
    }

    lex.bump(to_bump);
    Some(())
}

/// A source position: 1-based line, 1-based column, 0-based byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

impl Position {
    #[must_use]
    pub const fn start() -> Self {
        Self {
            line: 1,
            column: 1,
            offset: 0,
        }
    }

    /// Advance the position past `text`, tracking line/column resets
    /// on `\n` (a preceding `\r` is just another byte on the same
    /// line, so `\r\n` still yields exactly one line increment).
    fn advance(&mut self, text: &str) {
        for ch in text.chars() {
            self.offset += ch.len_utf8() as u32;
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}

/// A single lexed token. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub text: &'src str,
    pub position: Position,
    pub has_space_before: bool,
}

/// Lex `source` into a complete, append-only token vector terminated
/// by an explicit `EOF`-kind sentinel (empty text, position at end of
/// input). Fails soft: invalid bytes become `Illegal` tokens rather
/// than aborting the lex.
#[must_use]
pub fn tokenize(source: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::with_capacity(source.len() / 4 + 16);
    let mut lexer = TokenKind::lexer(source);
    let mut pos = Position::start();
    let mut has_space_before = false;

    while let Some(kind) = lexer.next() {
        let text = lexer.slice();
        let start = pos;

        if kind.is_inline_trivia() {
            pos.advance(text);
            has_space_before = true;
            continue;
        }

        if matches!(kind, TokenKind::Comment) {
            pos.advance(text);
            tokens.push(Token {
                kind,
                text,
                position: start,
                has_space_before,
            });
            has_space_before = true;
            continue;
        }

        if matches!(kind, TokenKind::Duration) {
            let (digits, suffix) = split_duration_text(text);
            if suffix.is_empty() {
                tokens.push(Token {
                    kind: TokenKind::Integer,
                    text,
                    position: start,
                    has_space_before,
                });
                pos.advance(text);
            } else if DURATION_UNITS.contains(&suffix) {
                tokens.push(Token {
                    kind: TokenKind::Duration,
                    text,
                    position: start,
                    has_space_before,
                });
                pos.advance(text);
            } else {
                tokens.push(Token {
                    kind: TokenKind::Integer,
                    text: digits,
                    position: start,
                    has_space_before,
                });
                let mut mid = start;
                mid.advance(digits);
                tokens.push(Token {
                    kind: TokenKind::Identifier,
                    text: suffix,
                    position: mid,
                    has_space_before: false,
                });
                pos = mid;
                pos.advance(suffix);
            }
            has_space_before = false;
            continue;
        }

        tokens.push(Token {
            kind,
            text,
            position: start,
            has_space_before,
        });
        pos.advance(text);
        has_space_before = false;
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        text: "",
        position: pos,
        has_space_before,
    });

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_has_only_eof() {
        let tokens = tokenize("");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].position, Position::start());
    }

    #[test]
    fn duration_literal_wins_over_integer_identifier_split() {
        let tokens = tokenize("30s");
        assert_eq!(tokens[0].kind, TokenKind::Duration);
        assert_eq!(tokens[0].text, "30s");
    }

    #[test]
    fn integer_then_identifier_when_not_a_unit() {
        let tokens = tokenize("5mode");
        assert_eq!(tokens[0].kind, TokenKind::Integer);
        assert_eq!(tokens[0].text, "5");
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].text, "ode");
        assert!(!tokens[1].has_space_before);
    }

    #[test]
    fn split_never_drops_the_digit_run() {
        for src in ["30sec", "5m_backup", "42nope"] {
            let tokens = tokenize(src);
            assert_eq!(tokens[0].kind, TokenKind::Integer, "source: {src}");
            assert_eq!(tokens[1].kind, TokenKind::Identifier, "source: {src}");
            assert_eq!(
                format!("{}{}", tokens[0].text, tokens[1].text),
                src,
                "digit run must not be discarded for {src}"
            );
        }
    }

    #[test]
    fn underscore_separated_digits_split_before_the_unit() {
        let tokens = tokenize("5_000ms");
        assert_eq!(tokens[0].kind, TokenKind::Duration);
        assert_eq!(tokens[0].text, "5_000ms");
    }

    #[test]
    fn has_space_before_tracks_inter_token_whitespace() {
        let tokens = tokenize("a.b  c");
        assert!(!tokens[1].has_space_before); // "."
        assert!(!tokens[2].has_space_before); // "b"
        assert!(tokens[3].has_space_before); // "c"
    }

    #[test]
    fn dotdotdot_is_one_token_not_three_dots() {
        let tokens = tokenize("1...10");
        assert_eq!(tokens[1].kind, TokenKind::DotDotDot);
    }

    #[test]
    fn nested_block_comments_close_correctly() {
        let tokens = tokenize("/* a /* b */ c */ var");
        assert_eq!(tokens[0].kind, TokenKind::Comment);
        assert_eq!(tokens[1].kind, TokenKind::Var);
    }
}
