//! `if`/`else`, `for…in`, `try`/`catch`/`finally`, and `when` (§4.2.4).

use tracing::instrument;

use crate::event::NodeKind::{self, *};
use crate::token::TokenKind::{self, *};

use super::context::Context;
use super::{decorator, expr, parse_block, skip_newlines, ParseEnv, ParseErrorKind};

#[instrument(level = "trace", skip(ctx, env))]
pub fn parse_if(ctx: &mut Context, env: &ParseEnv) {
    ctx.start_node(NodeKind::If);
    ctx.eat(); // 'if'

    if ctx.token() == LBrace {
        ctx.add_error(ParseErrorKind::MissingIfCondition, "if condition");
    } else {
        parse_condition(ctx, env);
    }

    parse_block(ctx, env, ParseErrorKind::ExpectedToken(LBrace), "if body");

    skip_newlines(ctx);
    if ctx.token() == TokenKind::Else {
        parse_else(ctx, env);
    }

    ctx.finish_node(NodeKind::If);
}

fn parse_else(ctx: &mut Context, env: &ParseEnv) {
    ctx.start_node(NodeKind::Else);
    ctx.eat(); // 'else'
    if ctx.token() == TokenKind::If {
        parse_if(ctx, env);
    } else {
        parse_block(ctx, env, ParseErrorKind::ExpectedToken(LBrace), "else body");
    }
    ctx.finish_node(NodeKind::Else);
}

/// Any token set that can validly continue an expression past a
/// leading literal. A bare literal with no continuation is what
/// triggers `IfConditionNotBoolean`; `"x" == y` is a boolean
/// expression and must not be flagged.
fn continues_expression(kind: TokenKind) -> bool {
    matches!(
        kind,
        OrOr | AndAnd | EqEq | NotEq | Lt | LtEq | Gt | GtEq | Plus | Minus | Multiply | Divide | Modulo | Increment | Decrement
    )
}

fn parse_condition(ctx: &mut Context, env: &ParseEnv) {
    let bare_literal = matches!(ctx.token(), Integer | TokenKind::String) && !continues_expression(ctx.nth(1));
    expr::parse_expr(ctx, env);
    if bare_literal {
        ctx.add_error(ParseErrorKind::IfConditionNotBoolean, "if condition");
    }
}

#[instrument(level = "trace", skip(ctx, env))]
pub fn parse_for(ctx: &mut Context, env: &ParseEnv) {
    ctx.start_node(NodeKind::For);
    ctx.eat(); // 'for'

    if ctx.token() == TokenKind::Identifier {
        ctx.start_node(NodeKind::Identifier);
        ctx.eat();
        ctx.finish_node(NodeKind::Identifier);
    } else {
        ctx.add_error(ParseErrorKind::MissingForVariable, "for loop");
    }

    if ctx.token() == In {
        ctx.eat();
    } else {
        ctx.add_error(ParseErrorKind::MissingForIn, "for loop");
    }

    if expr::can_start_expr(ctx.token()) {
        parse_for_collection(ctx, env);
    } else {
        ctx.add_error(ParseErrorKind::MissingForCollection, "for loop");
    }

    parse_block(ctx, env, ParseErrorKind::MissingForBody, "for loop body");
    ctx.finish_node(NodeKind::For);
}

/// `COLLECTION` is an identifier, a decorator reference, or a range
/// `START...END`; range recognition is bounded lookahead — if the
/// token after an integer or a completed decorator is `...`, the
/// whole thing becomes a `Range` node.
fn parse_for_collection(ctx: &mut Context, env: &ParseEnv) {
    match ctx.token() {
        Integer | Float => {
            let checkpoint = ctx.checkpoint();
            parse_range_bound(ctx);
            if ctx.token() == DotDotDot {
                ctx.eat();
                parse_range_bound(ctx);
                ctx.start_node_at(checkpoint, Range);
                ctx.finish_node(Range);
            }
        }
        At => {
            let checkpoint = ctx.checkpoint();
            if !decorator::parse_decorator(ctx, env) {
                ctx.eat_error(ParseErrorKind::UnexpectedToken, "for loop collection");
                return;
            }
            if ctx.token() == DotDotDot {
                ctx.eat();
                parse_range_bound(ctx);
                ctx.start_node_at(checkpoint, Range);
                ctx.finish_node(Range);
            }
        }
        _ => expr::parse_expr(ctx, env),
    }
}

fn parse_range_bound(ctx: &mut Context) {
    match ctx.token() {
        Integer => {
            ctx.start_node(Literal);
            ctx.eat();
            ctx.finish_node(Literal);
        }
        Float => {
            ctx.start_node(Literal);
            ctx.eat();
            ctx.finish_node(Literal);
            ctx.add_error(ParseErrorKind::RangeBoundsNotInteger, "range expression");
        }
        _ => {
            ctx.eat_error(ParseErrorKind::RangeBoundsNotInteger, "range expression");
        }
    }
}

#[instrument(level = "trace", skip(ctx, env))]
pub fn parse_try(ctx: &mut Context, env: &ParseEnv) {
    ctx.start_node(NodeKind::Try);
    ctx.eat(); // 'try'
    parse_block(ctx, env, ParseErrorKind::MissingTryBlock, "try block");

    skip_newlines(ctx);
    if ctx.token() == TokenKind::Catch {
        ctx.start_node(NodeKind::Catch);
        ctx.eat();
        parse_block(ctx, env, ParseErrorKind::MissingTryBlock, "catch block");
        ctx.finish_node(NodeKind::Catch);
        skip_newlines(ctx);
    }

    if ctx.token() == TokenKind::Finally {
        ctx.start_node(NodeKind::Finally);
        ctx.eat();
        parse_block(ctx, env, ParseErrorKind::MissingTryBlock, "finally block");
        ctx.finish_node(NodeKind::Finally);
    }

    ctx.finish_node(NodeKind::Try);
}

#[instrument(level = "trace", skip(ctx, env))]
pub fn parse_when(ctx: &mut Context, env: &ParseEnv) {
    ctx.start_node(NodeKind::When);
    ctx.eat(); // 'when'

    if expr::can_start_expr(ctx.token()) {
        expr::parse_expr(ctx, env);
    } else {
        ctx.add_error(ParseErrorKind::MissingWhenExpr, "when expression");
    }

    if ctx.token() == LBrace {
        ctx.eat();
        skip_newlines(ctx);
        while !matches!(ctx.token(), RBrace | Eof) {
            let start = ctx.current_index();
            parse_when_arm(ctx, env);
            ctx.ensure_progress(start);
            skip_newlines(ctx);
        }
        if ctx.token() == RBrace {
            ctx.eat();
        } else {
            ctx.add_error(ParseErrorKind::UnexpectedEof, "when expression");
        }
    } else {
        ctx.add_error(ParseErrorKind::MissingWhenBrace, "when expression");
    }

    ctx.finish_node(NodeKind::When);
}

fn parse_when_arm(ctx: &mut Context, env: &ParseEnv) {
    ctx.start_node(WhenArm);
    parse_pattern(ctx, env);

    if ctx.token() == Arrow {
        ctx.eat();
    } else {
        ctx.add_error(ParseErrorKind::MissingArmArrow, "when arm");
    }

    if ctx.token() == LBrace {
        parse_block(ctx, env, ParseErrorKind::UnexpectedEof, "when arm body");
    } else {
        super::parse_stmt(ctx, env, false);
    }

    ctx.finish_node(WhenArm);
}

/// Left-associative `a | b | c` groups as `((a | b) | c)`, the lowest
/// precedence level among pattern forms; built with the same
/// fixed-checkpoint retroactive-wrap technique as binary expressions.
fn parse_pattern(ctx: &mut Context, env: &ParseEnv) {
    let checkpoint = ctx.checkpoint();
    parse_pattern_atom(ctx, env);
    while ctx.token() == Pipe {
        ctx.eat();
        ctx.start_node_at(checkpoint, PatternOr);
        parse_pattern_atom(ctx, env);
        ctx.finish_node(PatternOr);
    }
}

fn parse_pattern_atom(ctx: &mut Context, env: &ParseEnv) {
    match ctx.token() {
        TokenKind::String => {
            ctx.start_node(PatternLiteral);
            ctx.eat();
            ctx.finish_node(PatternLiteral);
        }
        TokenKind::Else => {
            ctx.start_node(PatternElse);
            ctx.eat();
            ctx.finish_node(PatternElse);
        }
        Integer if ctx.nth(1) == DotDotDot => {
            ctx.start_node(PatternRange);
            ctx.start_node(Literal);
            ctx.eat();
            ctx.finish_node(Literal);
            ctx.eat(); // '...'
            parse_range_bound(ctx);
            ctx.finish_node(PatternRange);
        }
        TokenKind::Identifier
            if ctx.current_text() == "r" && ctx.nth(1) == TokenKind::String && !ctx.nth_has_space_before(1) =>
        {
            ctx.start_node(PatternRegex);
            ctx.eat(); // 'r'
            ctx.eat(); // string
            ctx.finish_node(PatternRegex);
        }
        TokenKind::Identifier if ctx.nth(1) == Dot => expr::parse_qualified_ref(ctx),
        At => {
            if !decorator::parse_decorator(ctx, env) {
                ctx.eat_error(ParseErrorKind::UnexpectedToken, "when pattern");
            }
        }
        _ => {
            ctx.eat_error(ParseErrorKind::UnexpectedToken, "when pattern");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorator::DecoratorRegistry;
    use crate::event::Event;
    use crate::token::tokenize;
    use std::collections::HashSet;

    fn env(registry: &DecoratorRegistry, known: &HashSet<&str>) -> ParseEnv<'_> {
        ParseEnv { known_functions: known, registry }
    }

    #[test]
    fn else_if_chain_nests_correctly() {
        let tokens = tokenize(r#"if true { echo "yes" } else if false { echo "b" } else { echo "c" }"#);
        let reg = DecoratorRegistry::new();
        let known = HashSet::new();
        let mut ctx = Context::new(&tokens);
        parse_if(&mut ctx, &env(&reg, &known));
        let out = ctx.finish();
        assert!(out.errors.is_empty());
        let if_opens = out.events.iter().filter(|e| matches!(e, Event::Open(NodeKind::If))).count();
        assert_eq!(if_opens, 2);
        let else_opens = out.events.iter().filter(|e| matches!(e, Event::Open(NodeKind::Else))).count();
        assert_eq!(else_opens, 2);
    }

    #[test]
    fn range_wraps_two_integer_literals() {
        let tokens = tokenize("for i in 1...10 { }");
        let reg = DecoratorRegistry::new();
        let known = HashSet::new();
        let mut ctx = Context::new(&tokens);
        parse_for(&mut ctx, &env(&reg, &known));
        let out = ctx.finish();
        assert!(out.errors.is_empty());
        assert!(out.events.contains(&Event::Open(Range)));
    }

    #[test]
    fn when_arms_cover_all_pattern_kinds() {
        let src = r#"when x { "prod" | "production" -> echo "p" r"^staging-" -> echo "s" 200...299 -> ok else -> echo "x" }"#;
        let tokens = tokenize(src);
        let reg = DecoratorRegistry::new();
        let known = HashSet::new();
        let mut ctx = Context::new(&tokens);
        parse_when(&mut ctx, &env(&reg, &known));
        let out = ctx.finish();
        assert!(out.errors.is_empty());
        let arms = out.events.iter().filter(|e| matches!(e, Event::Open(WhenArm))).count();
        assert_eq!(arms, 4);
        assert!(out.events.contains(&Event::Open(PatternOr)));
        assert!(out.events.contains(&Event::Open(PatternRegex)));
        assert!(out.events.contains(&Event::Open(PatternRange)));
        assert!(out.events.contains(&Event::Open(PatternElse)));
    }
}
