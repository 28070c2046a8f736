#![deny(unreachable_patterns)]

//! Grammar routines for the recursive-descent parser, one module per
//! grammatical area. Every routine follows the mandatory-progress
//! contract (§4.6/§4.2): on error it either consumes at least one
//! token itself or delegates to [`Context::eat_error`]/
//! [`Context::recover_to_sync_token`], which always do.

mod control;
mod decl;
mod decorator;
mod expr;
mod shell;

use std::collections::HashSet;

use tracing::instrument;

use crate::decorator::DecoratorRegistry;
use crate::event::NodeKind::{self, *};
use crate::token::{Token, TokenKind::{self, *}};

use super::context::Context;
use super::ParseErrorKind;

pub use expr::parse_expr;

/// Everything a grammar routine needs besides the token cursor: the
/// set of forward-declared function names (from the harvest pre-pass)
/// and the read-only decorator schema registry.
pub struct ParseEnv<'a> {
    pub known_functions: &'a HashSet<&'a str>,
    pub registry: &'a DecoratorRegistry,
}

/// First phase of the two-phase parse: scan the raw token slice for
/// every top-level `fun NAME`, ignoring everything else, so the main
/// pass can allow forward references when disambiguating function
/// calls from shell commands (§4.2.7, §9). O(N), never builds events.
#[must_use]
pub fn harvest_function_names<'src>(tokens: &'src [Token<'src>]) -> HashSet<&'src str> {
    let mut names = HashSet::new();
    let mut i = 0usize;
    while i < tokens.len() {
        if tokens[i].kind == TokenKind::Fun {
            if let Some(next) = tokens.get(i + 1) {
                if next.kind == TokenKind::Identifier {
                    names.insert(next.text);
                }
            }
        }
        i += 1;
    }
    names
}

#[instrument(level = "trace", skip(ctx, env))]
pub fn parse_source(ctx: &mut Context, env: &ParseEnv) {
    ctx.start_node(Source);
    skip_newlines(ctx);
    while ctx.token() != Eof {
        let start = ctx.current_index();
        parse_top_level_item(ctx, env);
        ctx.ensure_progress(start);
        skip_newlines(ctx);
    }
    ctx.finish_node(Source);
}

fn skip_newlines(ctx: &mut Context) {
    while ctx.token() == Newline {
        ctx.eat();
    }
}

/// A top-level item: anything `parse_stmt` accepts, plus `fun` and
/// `enum` declarations, which are only legal here.
fn parse_top_level_item(ctx: &mut Context, env: &ParseEnv) {
    match ctx.token() {
        TokenKind::Fun => decl::parse_function(ctx, env),
        TokenKind::Enum => decl::parse_enum(ctx),
        _ => parse_stmt(ctx, env, true),
    }
}

/// A statement inside a block (or, via `at_top_level`, at the top of
/// `Source`). `fun`/`enum` are rejected here unless `at_top_level`.
pub(crate) fn parse_stmt(ctx: &mut Context, env: &ParseEnv, at_top_level: bool) {
    skip_newlines(ctx);
    match ctx.token() {
        Eof | RBrace => {}

        TokenKind::Fun if !at_top_level => {
            ctx.eat_error(ParseErrorKind::FunctionNotTopLevel, "statement");
        }
        TokenKind::Enum if !at_top_level => {
            ctx.eat_error(ParseErrorKind::EnumNotTopLevel, "statement");
        }
        TokenKind::Fun => decl::parse_function(ctx, env),
        TokenKind::Enum => decl::parse_enum(ctx),

        TokenKind::Var => decl::parse_var_decl(ctx, env),

        TokenKind::If => control::parse_if(ctx, env),
        TokenKind::For => control::parse_for(ctx, env),
        TokenKind::Try => control::parse_try(ctx, env),
        TokenKind::When => control::parse_when(ctx, env),

        TokenKind::Else => {
            ctx.eat_error(ParseErrorKind::ElseWithoutIf, "statement");
        }
        TokenKind::Catch => {
            ctx.eat_error(ParseErrorKind::CatchWithoutTry, "statement");
        }
        TokenKind::Finally => {
            ctx.eat_error(ParseErrorKind::FinallyWithoutTry, "statement");
        }

        TokenKind::At => shell::parse_decorator_statement(ctx, env),

        TokenKind::Identifier => {
            if matches!(
                ctx.nth(1),
                PlusAssign | MinusAssign | MultiplyAssign | DivideAssign | ModuloAssign
            ) {
                decl::parse_assignment(ctx, env);
            } else if ctx.nth(1) == LParen && !ctx.nth_has_space_before(1) {
                expr::parse_identifier_primary(ctx, env);
            } else {
                shell::parse_shell_command(ctx, env);
            }
        }

        _ => {
            ctx.eat_error(ParseErrorKind::UnexpectedToken, "statement");
            ctx.recover_to_sync_token();
        }
    }
}

/// Shared by every construct that needs `{ Statements }`: opens
/// `Block`, parses statements until `}`/`EOF`, closes `Block`.
/// Reports `missing_block` via `on_missing` if `{` is absent.
pub(crate) fn parse_block(ctx: &mut Context, env: &ParseEnv, on_missing: ParseErrorKind, context: &'static str) -> bool {
    if ctx.token() != LBrace {
        ctx.add_error(on_missing, context);
        return false;
    }
    ctx.start_node(Block);
    ctx.eat(); // {
    skip_newlines(ctx);
    while !matches!(ctx.token(), RBrace | Eof) {
        let start = ctx.current_index();
        parse_stmt(ctx, env, false);
        ctx.ensure_progress(start);
        skip_newlines(ctx);
    }
    if ctx.token() == RBrace {
        ctx.eat();
    } else {
        ctx.add_error(ParseErrorKind::UnexpectedEof, context);
    }
    ctx.finish_node(Block);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorator::DecoratorRegistry;
    use crate::event::Event;
    use crate::token::tokenize;
    use std::collections::HashSet;

    #[test]
    fn harvest_collects_top_level_function_names() {
        let tokens = crate::token::tokenize("fun greet(x) {} var y = 1 fun other {}");
        let names = harvest_function_names(&tokens);
        assert!(names.contains("greet"));
        assert!(names.contains("other"));
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn identifier_glued_to_lparen_at_statement_position_is_a_call_not_a_shell_command() {
        let tokens = tokenize(r#"missing(env = "prod")"#);
        let reg = DecoratorRegistry::new();
        let known = HashSet::new();
        let env = ParseEnv { known_functions: &known, registry: &reg };
        let mut ctx = Context::new(&tokens);
        parse_stmt(&mut ctx, &env, true);
        let out = ctx.finish();
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].message(), "unknown function \"missing\"");
        assert!(out.events.iter().any(|e| matches!(e, Event::Open(NodeKind::FunctionCall))));
        assert!(!out.events.iter().any(|e| matches!(e, Event::Open(NodeKind::ShellCommand))));
    }

    #[test]
    fn known_function_call_at_statement_position_resolves_cleanly() {
        let tokens = tokenize("greet(name = \"World\")");
        let reg = DecoratorRegistry::new();
        let mut known = HashSet::new();
        known.insert("greet");
        let env = ParseEnv { known_functions: &known, registry: &reg };
        let mut ctx = Context::new(&tokens);
        parse_stmt(&mut ctx, &env, true);
        let out = ctx.finish();
        assert!(out.errors.is_empty());
        assert!(out.events.iter().any(|e| matches!(e, Event::Open(NodeKind::FunctionCall))));
    }

    #[test]
    fn identifier_followed_by_space_then_lparen_is_still_a_shell_command() {
        // `echo ("x")` — a space before `(` means this is never a call
        // (§4.2.7), even though `echo` could be a known function.
        let tokens = tokenize(r#"echo ("x")"#);
        let reg = DecoratorRegistry::new();
        let mut known = HashSet::new();
        known.insert("echo");
        let env = ParseEnv { known_functions: &known, registry: &reg };
        let mut ctx = Context::new(&tokens);
        parse_stmt(&mut ctx, &env, true);
        let out = ctx.finish();
        assert!(out.events.iter().any(|e| matches!(e, Event::Open(NodeKind::ShellCommand))));
        assert!(!out.events.iter().any(|e| matches!(e, Event::Open(NodeKind::FunctionCall))));
    }
}
