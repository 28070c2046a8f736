//! Pratt-style expression parsing (§4.3), string interpolation
//! (§4.4), decorator references (§4.5), and qualified references
//! (§4.2.6) — everything that can appear as a primary.

use tracing::instrument;

use crate::event::NodeKind::{self, *};
use crate::interpolation::{self, Segment};
use crate::token::TokenKind::{self, *};

use super::context::Context;
use super::{decorator, ParseEnv, ParseErrorKind};

/// Whether `kind` can begin a primary expression. Used wherever the
/// grammar needs a cheap lookahead decision (is there a default
/// value? is there a collection expression? etc.) without committing
/// to a full parse.
#[must_use]
pub(crate) fn can_start_expr(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Identifier
            | String
            | Integer
            | Float
            | Boolean
            | Duration
            | At
            | LParen
            | Not
            | Minus
            | Increment
            | Decrement
    )
}

/// Binding power for each binary operator, low to high per §4.3:
/// `|| ` < `&&` < `== !=` < `< <= > >=` < `+ -` < `* / %`.
fn infix_binding_power(kind: TokenKind) -> Option<(u8, u8)> {
    Some(match kind {
        OrOr => (1, 2),
        AndAnd => (3, 4),
        EqEq | NotEq => (5, 6),
        Lt | LtEq | Gt | GtEq => (7, 8),
        Plus | Minus => (9, 10),
        Multiply | Divide | Modulo => (11, 12),
        _ => return None,
    })
}

#[instrument(level = "trace", skip(ctx, env))]
pub fn parse_expr(ctx: &mut Context, env: &ParseEnv) {
    parse_expr_bp(ctx, env, 0);
}

fn parse_expr_bp(ctx: &mut Context, env: &ParseEnv, min_bp: u8) {
    let lhs_checkpoint = ctx.checkpoint();
    parse_unary(ctx, env);

    loop {
        let Some((left_bp, right_bp)) = infix_binding_power(ctx.token()) else {
            break;
        };
        if left_bp < min_bp {
            break;
        }
        ctx.eat(); // operator
        ctx.start_node_at(lhs_checkpoint, BinaryExpr);
        parse_expr_bp(ctx, env, right_bp);
        ctx.finish_node(BinaryExpr);
    }
}

/// Prefix `!`/`-` bind tighter than every binary level; postfix
/// `++`/`--` bind to a single primary.
fn parse_unary(ctx: &mut Context, env: &ParseEnv) {
    if matches!(ctx.token(), Not | Minus | Increment | Decrement) {
        let checkpoint = ctx.checkpoint();
        ctx.eat();
        ctx.start_node_at(checkpoint, PrefixExpr);
        parse_unary(ctx, env);
        ctx.finish_node(PrefixExpr);
        return;
    }

    let checkpoint = ctx.checkpoint();
    parse_primary(ctx, env);

    if matches!(ctx.token(), Increment | Decrement) {
        ctx.start_node_at(checkpoint, PostfixExpr);
        ctx.eat();
        ctx.finish_node(PostfixExpr);
    }
}

fn parse_primary(ctx: &mut Context, env: &ParseEnv) {
    match ctx.token() {
        Integer | Float | Boolean | Duration => {
            ctx.start_node(Literal);
            ctx.eat();
            ctx.finish_node(Literal);
        }
        TokenKind::String => parse_string_literal(ctx),
        At => {
            if !decorator::parse_decorator(ctx, env) {
                ctx.eat_error(ParseErrorKind::UnexpectedToken, "expression");
            }
        }
        LParen => {
            ctx.eat();
            parse_expr(ctx, env);
            if ctx.token() == RParen {
                ctx.eat();
            } else {
                ctx.add_error(ParseErrorKind::ExpectedToken(RParen), "parenthesised expression");
            }
        }
        TokenKind::Identifier => parse_identifier_primary(ctx, env),
        _ => {
            ctx.eat_error(ParseErrorKind::UnexpectedToken, "expression");
        }
    }
}

/// An identifier primary: a plain `Identifier`, a `Type.Member`
/// qualified reference (§4.2.6), or a `FunctionCall` when the
/// identifier is a known function immediately followed by `(` with
/// no preceding space (§4.2.7).
pub(crate) fn parse_identifier_primary(ctx: &mut Context, env: &ParseEnv) {
    let name = ctx.current_text().to_string();

    if ctx.nth(1) == Dot {
        parse_qualified_ref(ctx);
        return;
    }

    if ctx.nth(1) == LParen {
        ctx.start_node(NodeKind::Identifier);
        ctx.eat(); // identifier
        ctx.finish_node(NodeKind::Identifier);

        let lparen_has_space = ctx.current_has_space_before();
        if env.known_functions.contains(name.as_str()) && !lparen_has_space {
            parse_call_arguments(ctx, env);
        } else if !lparen_has_space {
            ctx.eat_error_unknown_function(&name);
        }
        // A space before '(' (e.g. `echo ("x")`) is never a call:
        // the identifier alone was already emitted above and the
        // surrounding shell-command parser continues from here.
        return;
    }

    ctx.start_node(NodeKind::Identifier);
    ctx.eat();
    ctx.finish_node(NodeKind::Identifier);
}

trait EatUnknownFunction {
    fn eat_error_unknown_function(&mut self, name: &str);
}

impl EatUnknownFunction for Context<'_> {
    fn eat_error_unknown_function(&mut self, name: &str) {
        self.add_error(ParseErrorKind::UnknownFunction(name.to_string()), "function call");
        self.last_error_mut().suggestion = Some(format!(
            "define \"fun {name}(...)\" or add a space before '(' to run it as a shell command"
        ));
        // Still materialize a FunctionCall node for recovery (§8
        // scenario 7): the caller wraps what follows as a call even
        // though the name is unknown.
        parse_call_arguments_as(self, NodeKind::FunctionCall);
    }
}

/// Wraps the most recently emitted `Identifier` and the argument list
/// that follows into a `FunctionCall` node.
fn parse_call_arguments(ctx: &mut Context, env: &ParseEnv) {
    let checkpoint = retro_checkpoint_before_last_node(ctx);
    ctx.start_node_at(checkpoint, FunctionCall);
    parse_arg_list(ctx, env);
    ctx.finish_node(FunctionCall);
}

fn parse_call_arguments_as(ctx: &mut Context, kind: NodeKind) {
    let checkpoint = retro_checkpoint_before_last_node(ctx);
    ctx.start_node_at(checkpoint, kind);
    ctx.eat(); // '('
    let mut depth = 1usize;
    while depth > 0 && ctx.token() != Eof {
        match ctx.token() {
            LParen => depth += 1,
            RParen => depth -= 1,
            _ => {}
        }
        ctx.eat();
    }
    ctx.finish_node(kind);
}

/// A checkpoint can only be taken looking *forward*; to retroactively
/// wrap the `Identifier` node just closed (rather than re-parsing it)
/// this crate's checkpoints are always taken *before* parsing the
/// node they might need to wrap, per the standard Pratt-expression
/// technique. `parse_identifier_primary` does not take one up front
/// because the common case (plain identifier, no call) never needs
/// it; call sites that do need to wrap afterwards ask the context for
/// one positioned just before the last top-level Open/Close pair.
fn retro_checkpoint_before_last_node(ctx: &mut Context) -> crate::event::Checkpoint {
    ctx.checkpoint_before_last_node()
}

/// Comma-separated argument list: `(` `NAME=VALUE | VALUE`, ... `)`.
/// Used both by function calls and, via [`decorator`], by decorator
/// invocations.
pub(crate) fn parse_arg_list(ctx: &mut Context, env: &ParseEnv) {
    ctx.start_node(NodeKind::ParamList);
    ctx.eat(); // '('
    while !matches!(ctx.token(), RParen | Eof) {
        if ctx.token() == TokenKind::Identifier && ctx.nth(1) == Equals {
            ctx.eat(); // name
            ctx.eat(); // '='
            parse_expr(ctx, env);
        } else {
            parse_expr(ctx, env);
        }
        if ctx.token() == Comma {
            ctx.eat();
        } else {
            break;
        }
    }
    if ctx.token() == RParen {
        ctx.eat();
    } else {
        ctx.add_error(ParseErrorKind::ExpectedToken(RParen), "argument list");
    }
    ctx.finish_node(NodeKind::ParamList);
}

/// `Type.Member`; three or more segments is a dedicated error but the
/// node is still emitted for recovery. `pub(crate)` so `when` pattern
/// parsing (`QualifiedRef` matches an enum member) can reuse it.
pub(crate) fn parse_qualified_ref(ctx: &mut Context) {
    let checkpoint = ctx.checkpoint();
    ctx.eat(); // first segment
    let mut segments = 1usize;
    while ctx.token() == Dot && ctx.nth(1) == TokenKind::Identifier {
        ctx.eat(); // '.'
        ctx.eat(); // segment
        segments += 1;
    }
    ctx.start_node_at(checkpoint, QualifiedRef);
    if segments > 2 {
        ctx.add_error(ParseErrorKind::QualifiedRefTooLong, "qualified reference");
    }
    ctx.finish_node(QualifiedRef);
}

/// `pub(crate)` so shell-argument parsing ([`super::shell`]) can reuse
/// the same interpolation/degrade-to-`Literal` handling for quoted
/// shell arguments.
pub(crate) fn parse_string_literal(ctx: &mut Context) {
    let text = ctx.current_text();
    let body = strip_quotes(text);
    let is_double_quoted = text.starts_with('"');

    if is_double_quoted && interpolation::needs_interpolation(body) {
        ctx.start_node(InterpolatedString);
        let segments = interpolation::split_segments(body);
        let token_index = ctx.eat();
        for segment in segments {
            match segment {
                Segment::Literal { .. } => {
                    ctx.start_node(StringPart);
                    ctx.emit_synthetic_token_ref(token_index);
                    ctx.finish_node(StringPart);
                }
                Segment::Decorator { name, primary_param, .. } => {
                    ctx.start_node(Decorator);
                    ctx.emit_synthetic_decorator_ref(token_index, name, primary_param);
                    ctx.finish_node(Decorator);
                }
            }
        }
        ctx.finish_node(InterpolatedString);
    } else {
        ctx.start_node(Literal);
        ctx.eat();
        ctx.finish_node(Literal);
    }
}

fn strip_quotes(text: &str) -> &str {
    if text.len() >= 2 {
        &text[1..text.len() - 1]
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorator::DecoratorRegistry;
    use crate::token::tokenize;
    use std::collections::HashSet;

    #[test]
    fn precedence_groups_multiply_tighter_than_add() {
        let tokens = tokenize("1 + 2 * 3");
        let reg = DecoratorRegistry::new();
        let known = HashSet::new();
        let env = ParseEnv { known_functions: &known, registry: &reg };
        let mut ctx = Context::new(&tokens);
        parse_expr(&mut ctx, &env);
        let out = ctx.finish();
        // Exactly one BinaryExpr should wrap the `2 * 3` before the
        // outer `+` wraps everything.
        let opens = out
            .events
            .iter()
            .filter(|e| matches!(e, crate::event::Event::Open(NodeKind::BinaryExpr)))
            .count();
        assert_eq!(opens, 2);
    }
}
