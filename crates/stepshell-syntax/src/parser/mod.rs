//! This module contains all parsing-related tools: the recursive
//! descent parser itself, its context, and the individual grammar
//! routines under [`parsers`].

pub(crate) mod context;
pub mod parsers;

pub use crate::diagnostic::{ErrorCode, ParseError, ParseErrorKind, ParseWarning};
pub use parsers::ParseEnv;

use crate::decorator::DecoratorRegistry;
use crate::token::Token;
use context::Context;

/// The result of a full parse: the flat event stream plus whatever
/// errors and warnings were recorded along the way.
pub struct ParseOutput {
    pub events: Vec<crate::event::Event>,
    pub errors: Vec<ParseError>,
    pub warnings: Vec<ParseWarning>,
}

/// Parse an already-lexed token slice into a flat event stream.
///
/// Two-phase, both O(N): a name-harvest pre-pass collects every
/// top-level `fun NAME` so the main pass can allow forward references
/// when disambiguating a function call from a shell command, then the
/// full recursive-descent pass runs over the same tokens against the
/// supplied decorator registry.
#[must_use]
pub fn run<'src>(tokens: &'src [Token<'src>], registry: &DecoratorRegistry) -> ParseOutput {
    let known_functions = parsers::harvest_function_names(tokens);
    let env = ParseEnv { known_functions: &known_functions, registry };

    let mut ctx = Context::new(tokens);
    parsers::parse_source(&mut ctx, &env);
    let out = ctx.finish();

    ParseOutput {
        events: out.events,
        errors: out.errors,
        warnings: out.warnings,
    }
}
