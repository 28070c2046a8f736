//! Structured diagnostics: errors are data, not control flow.
//!
//! Every parsing routine either consumes tokens and advances, or
//! records a [`ParseError`] and advances by at least one token. The
//! catalog strings in [`ParseErrorKind`]'s `Display` impl are part of
//! the external contract — changing their wording is a breaking
//! change for anything snapshotting diagnostics.

use std::fmt;

use thiserror::Error;

use crate::token::{Position, TokenKind};

/// All the non-fatal parse-time errors the parser can record. Kept
/// separate from [`crate::validator::ValidationErrorKind`], which
/// covers the post-parse semantic checks instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unexpected token")]
    UnexpectedToken,
    #[error("expected {0:?}")]
    ExpectedToken(TokenKind),
    #[error("expected {}", join_expected(.0))]
    ExpectedOneOf(Vec<TokenKind>),

    #[error("missing condition after 'if'")]
    MissingIfCondition,
    #[error("if condition must be a boolean expression")]
    IfConditionNotBoolean,
    #[error("missing loop variable after 'for'")]
    MissingForVariable,
    #[error("missing 'in' keyword in for loop")]
    MissingForIn,
    #[error("missing collection expression in for loop")]
    MissingForCollection,
    #[error("missing block after for loop header")]
    MissingForBody,
    #[error("missing block after 'try' | 'catch' | 'finally'")]
    MissingTryBlock,
    #[error("missing expression after 'when'")]
    MissingWhenExpr,
    #[error("missing '{{' after when expression")]
    MissingWhenBrace,
    #[error("missing '->' after pattern")]
    MissingArmArrow,
    #[error("else without matching if")]
    ElseWithoutIf,
    #[error("catch without try")]
    CatchWithoutTry,
    #[error("finally without try")]
    FinallyWithoutTry,
    #[error("function declarations must be at top level")]
    FunctionNotTopLevel,
    #[error("enum declarations must be at top level")]
    EnumNotTopLevel,
    #[error("qualified reference must use Type.Member")]
    QualifiedRefTooLong,
    #[error("missing default parameter value")]
    MissingDefaultParameterValue,
    #[error("@{0} cannot have a block")]
    DecoratorForbidsBlock(String),
    #[error("@{0} requires a block")]
    DecoratorRequiresBlock(String),
    #[error("unknown function \"{0}\"")]
    UnknownFunction(String),
    #[error("duplicate parameter '{0}'")]
    DuplicateParameter(String),
    #[error("unknown parameter '{0}' for @{1}")]
    UnknownParameter(String, String),
    #[error("missing required parameter '{0}'")]
    MissingRequiredParameter(String),
    #[error("range bounds must be integers")]
    RangeBoundsNotInteger,
    #[error("invalid input")]
    InvalidInput,
    #[error("missing '(' for decorator arguments")]
    MissingDecoratorArgs,
    #[error("parameter '{0}' expects {1} but got {2}")]
    SchemaTypeMismatch(String, String, String),
    #[error("'{0}' is not a valid value for enum parameter '{1}'")]
    SchemaEnumInvalid(String, String),
}

fn join_expected(kinds: &[TokenKind]) -> String {
    match kinds {
        [] => String::new(),
        [a] => format!("{a:?}"),
        [a, b] => format!("{a:?} or {b:?}"),
        _ => {
            let (last, rest) = kinds.split_last().unwrap();
            let rest = rest
                .iter()
                .map(|k| format!("{k:?}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{rest}, or {last:?}")
        }
    }
}

/// A structured, programmatically inspectable error category, used
/// by downstream tooling that wants to branch on more than the
/// message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorCode {
    Syntax,
    Recovery,
    SchemaTypeMismatch,
    SchemaRangeViolation,
    SchemaEnumInvalid,
    SchemaRequiredMissing,
    UnknownIdentifier,
}

/// A single parse error: position, stable kind, and the contextual
/// fields a quality diagnostic needs. `message()` is always derived
/// from `kind`'s `Display`, so the catalog strings live in exactly
/// one place.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParseError {
    pub position: Position,
    pub kind: ParseErrorKind,
    pub context: &'static str,
    pub expected: Vec<TokenKind>,
    pub got: Option<TokenKind>,
    pub suggestion: Option<String>,
    pub example: Option<String>,
    pub note: Option<String>,
    pub code: ErrorCode,
    pub path: Option<String>,
    pub expected_type: Option<String>,
    pub got_value: Option<String>,
}

impl ParseError {
    #[must_use]
    pub fn new(position: Position, kind: ParseErrorKind, context: &'static str) -> Self {
        Self {
            position,
            kind,
            context,
            expected: Vec::new(),
            got: None,
            suggestion: None,
            example: None,
            note: None,
            code: ErrorCode::Syntax,
            path: None,
            expected_type: None,
            got_value: None,
        }
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    #[must_use]
    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = Some(example.into());
        self
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = code;
        self
    }

    #[must_use]
    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    /// `file:line:col: message in context` plus a source snippet and
    /// caret, per the compact diagnostic rendering.
    #[must_use]
    pub fn render_compact(&self, file: &str, source: &str) -> String {
        let line_text = source_line(source, self.position.line);
        let mut out = format!(
            "{file}:{}:{}: {} in {}\n",
            self.position.line,
            self.position.column,
            self.message(),
            self.context
        );
        out.push_str(&format!(" {:>3} | {line_text}\n", self.position.line));
        let caret_pad = " ".repeat(self.position.column.saturating_sub(1) as usize);
        out.push_str("    | ");
        out.push_str(&caret_pad);
        out.push('^');
        if !self.expected.is_empty() {
            out.push_str(&format!(" expected {}", join_expected(&self.expected)));
        }
        if let Some(suggestion) = &self.suggestion {
            out.push('\n');
            out.push_str("   ");
            out.push_str(suggestion);
        }
        out
    }

    /// Multi-line rendering with `Error:`, `-->`, a source snippet,
    /// and separate `= Suggestion:`/`= Example:`/`= Note:` lines.
    #[must_use]
    pub fn render_detailed(&self, file: &str, source: &str, colorize: bool) -> String {
        let (bold, reset, red) = if colorize {
            ("\x1b[1m", "\x1b[0m", "\x1b[31m")
        } else {
            ("", "", "")
        };

        let line_text = source_line(source, self.position.line);
        let mut out = String::new();
        out.push_str(&format!("{red}Error:{reset} {}\n", self.message()));
        out.push_str(&format!(
            "  {bold}-->{reset} {file}:{}:{}\n",
            self.position.line, self.position.column
        ));
        out.push_str(&format!("   | {line_text}\n"));
        let caret_pad = " ".repeat(self.position.column.saturating_sub(1) as usize);
        out.push_str(&format!("   | {caret_pad}{red}^{reset}\n"));
        out.push_str(&format!("   = in {}\n", self.context));
        if let Some(suggestion) = &self.suggestion {
            out.push_str(&format!("   = Suggestion: {suggestion}\n"));
        }
        if let Some(example) = &self.example {
            out.push_str(&format!("   = Example: {example}\n"));
        }
        if let Some(note) = &self.note {
            out.push_str(&format!("   = Note: {note}\n"));
        }
        out
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} in {}",
            self.position.line, self.position.column, self.kind, self.context
        )
    }
}

/// A non-fatal diagnostic (deprecated parameter names/values). Never
/// blocks downstream stages; `errors.is_empty()` is the sole "parsed
/// cleanly" contract.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParseWarning {
    pub position: Position,
    pub message: String,
    pub note: Option<String>,
}

fn source_line(source: &str, line: u32) -> &str {
    source.lines().nth(line.saturating_sub(1) as usize).unwrap_or("")
}
