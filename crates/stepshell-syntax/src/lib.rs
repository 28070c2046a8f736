#![warn(clippy::pedantic)]
#![allow(
    clippy::unused_async,
    clippy::single_match,
    clippy::wildcard_imports,
    clippy::too_many_lines,
    clippy::enum_glob_use,
    clippy::cast_possible_truncation,
    clippy::cast_lossless,
    clippy::module_name_repetitions,
    clippy::single_match_else,
    clippy::option_option
)]

//! Resilient, event-emitting parser core for the step-shell DSL.
//!
//! The pipeline is `bytes -> lexer -> tokens -> parser (events +
//! diagnostics) -> semantic validator (more diagnostics) -> ParseTree`.
//! The tree itself is never a pointer-based AST: it is a flat
//! [`event::Event`] stream that downstream stages (planner, executor)
//! walk directly. See [`tree`] for the public entry points.

pub mod decorator;
pub mod diagnostic;
pub mod event;
pub mod interpolation;
pub mod parser;
pub mod token;
pub mod tree;
pub mod validator;

pub use decorator::{DecoratorRegistry, DecoratorSchema};
pub use diagnostic::{ParseError, ParseErrorKind, ParseWarning};
pub use event::{Event, NodeKind};
pub use token::{Position, Token, TokenKind};
pub use tree::{parse, parse_string, DebugLevel, ParseTree, ParserConfig, TelemetryLevel};
pub use validator::{ExecutionMode, ValidationError};
