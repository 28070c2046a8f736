//! Function declarations (§4.2.1), variable declarations and
//! compound-assign statements (§4.2.5), and enum declarations (§4.2.6).

use tracing::instrument;

use crate::event::NodeKind;
use crate::token::TokenKind::{self, *};

use super::context::Context;
use super::{expr, parse_block, skip_newlines, ParseEnv, ParseErrorKind};

/// `fun NAME ParamList? Body`, where `Body` is `= Expression` or
/// `{ Statements }`. Legal only where the caller (`parse_top_level_item`,
/// or `parse_stmt` with `at_top_level`) has already checked placement.
#[instrument(level = "trace", skip(ctx, env))]
pub fn parse_function(ctx: &mut Context, env: &ParseEnv) {
    ctx.start_node(NodeKind::Function);
    ctx.eat(); // 'fun'

    if ctx.token() == TokenKind::Identifier {
        ctx.eat(); // name
    } else {
        ctx.add_error(ParseErrorKind::ExpectedToken(TokenKind::Identifier), "function name");
    }

    if ctx.token() == LParen {
        parse_param_list(ctx, env);
    }

    parse_function_body(ctx, env);
    ctx.finish_node(NodeKind::Function);
}

fn parse_function_body(ctx: &mut Context, env: &ParseEnv) {
    if ctx.token() == Equals {
        ctx.eat();
        let step_opened = ctx.maybe_step_enter();
        if expr::can_start_expr(ctx.token()) {
            expr::parse_expr(ctx, env);
        } else {
            ctx.add_error(ParseErrorKind::UnexpectedToken, "function body");
        }
        ctx.maybe_step_exit(step_opened);
    } else if ctx.token() == LBrace {
        parse_block(ctx, env, ParseErrorKind::ExpectedToken(LBrace), "function body");
    } else {
        ctx.add_error(ParseErrorKind::ExpectedToken(LBrace), "function body");
    }
}

fn parse_param_list(ctx: &mut Context, env: &ParseEnv) {
    ctx.start_node(NodeKind::ParamList);
    ctx.eat(); // '('
    while !matches!(ctx.token(), RParen | Eof) {
        let start = ctx.current_index();
        parse_param(ctx, env);
        if ctx.token() == Comma {
            ctx.eat();
        } else {
            break;
        }
        ctx.ensure_progress(start);
    }
    if ctx.token() == RParen {
        ctx.eat();
    } else {
        ctx.add_error(ParseErrorKind::ExpectedToken(RParen), "parameter list");
    }
    ctx.finish_node(NodeKind::ParamList);
}

/// `NAME (TypeAnnotation)? (= DefaultValue)?`. The parameter name
/// itself is a bare token (never wrapped), matching the observable
/// event sequence: `Open(Param)` is immediately followed by the name's
/// `Token`, then the optional `TypeAnnotation`/`DefaultValue` children.
fn parse_param(ctx: &mut Context, env: &ParseEnv) {
    ctx.start_node(NodeKind::Param);
    if ctx.token() == TokenKind::Identifier {
        ctx.eat();
    } else {
        ctx.add_error(ParseErrorKind::ExpectedToken(TokenKind::Identifier), "function parameter");
    }

    if ctx.token() == TokenKind::Identifier {
        ctx.start_node(NodeKind::TypeAnnotation);
        ctx.eat();
        if ctx.token() == Question {
            ctx.eat();
        }
        ctx.finish_node(NodeKind::TypeAnnotation);
    }

    if ctx.token() == Equals {
        ctx.eat();
        ctx.start_node(NodeKind::DefaultValue);
        if expr::can_start_expr(ctx.token()) {
            expr::parse_expr(ctx, env);
        } else {
            ctx.add_error(ParseErrorKind::MissingDefaultParameterValue, "function parameter default value");
        }
        ctx.finish_node(NodeKind::DefaultValue);
    }

    ctx.finish_node(NodeKind::Param);
}

/// `var NAME = EXPR`, or the grouped form `var ( NAME=EXPR ; … )`,
/// which desugars to the same sequence of atomic `VarDecl` nodes — the
/// parentheses are pure syntax, not a node of their own.
#[instrument(level = "trace", skip(ctx, env))]
pub fn parse_var_decl(ctx: &mut Context, env: &ParseEnv) {
    ctx.eat(); // 'var'

    if ctx.token() == LParen {
        ctx.eat();
        skip_newlines(ctx);
        while !matches!(ctx.token(), RParen | Eof) {
            let start = ctx.current_index();
            parse_var_binding(ctx, env);
            if ctx.token() == Semicolon {
                ctx.eat();
            }
            ctx.ensure_progress(start);
            skip_newlines(ctx);
        }
        if ctx.token() == RParen {
            ctx.eat();
        } else {
            ctx.add_error(ParseErrorKind::ExpectedToken(RParen), "grouped variable declaration");
        }
    } else {
        parse_var_binding(ctx, env);
    }
}

fn parse_var_binding(ctx: &mut Context, env: &ParseEnv) {
    let step_opened = ctx.maybe_step_enter();
    ctx.start_node(NodeKind::VarDecl);
    if ctx.token() == TokenKind::Identifier {
        ctx.eat();
    } else {
        ctx.add_error(ParseErrorKind::ExpectedToken(TokenKind::Identifier), "variable declaration");
    }
    if ctx.token() == Equals {
        ctx.eat();
        if expr::can_start_expr(ctx.token()) {
            expr::parse_expr(ctx, env);
        } else {
            ctx.add_error(ParseErrorKind::UnexpectedToken, "variable declaration");
        }
    } else {
        ctx.add_error(ParseErrorKind::ExpectedToken(Equals), "variable declaration");
    }
    ctx.finish_node(NodeKind::VarDecl);
    ctx.maybe_step_exit(step_opened);
}

/// Compound-assign only (`+=` `-=` `*=` `/=` `%=`); the dispatcher in
/// [`super::parse_stmt`] has already confirmed `ctx.nth(1)` is one of
/// these before calling here.
#[instrument(level = "trace", skip(ctx, env))]
pub fn parse_assignment(ctx: &mut Context, env: &ParseEnv) {
    ctx.start_node(NodeKind::Assignment);
    ctx.eat(); // target identifier
    ctx.eat(); // compound-assign operator
    if expr::can_start_expr(ctx.token()) {
        expr::parse_expr(ctx, env);
    } else {
        ctx.add_error(ParseErrorKind::UnexpectedToken, "assignment");
    }
    ctx.finish_node(NodeKind::Assignment);
}

/// `enum NAME TYPE? { MEMBER (= VALUE)? … }`, legal only at the top
/// level — the caller rejects it otherwise (`EnumNotTopLevel`).
#[instrument(level = "trace", skip(ctx))]
pub fn parse_enum(ctx: &mut Context) {
    ctx.start_node(NodeKind::EnumDecl);
    ctx.eat(); // 'enum'

    if ctx.token() == TokenKind::Identifier {
        ctx.eat(); // name
    } else {
        ctx.add_error(ParseErrorKind::ExpectedToken(TokenKind::Identifier), "enum declaration");
    }

    if ctx.token() == TokenKind::Identifier {
        ctx.start_node(NodeKind::TypeAnnotation);
        ctx.eat();
        ctx.finish_node(NodeKind::TypeAnnotation);
    }

    if ctx.token() == LBrace {
        ctx.eat();
        skip_newlines(ctx);
        while !matches!(ctx.token(), RBrace | Eof) {
            let start = ctx.current_index();
            parse_enum_member(ctx);
            if ctx.token() == Comma {
                ctx.eat();
            }
            ctx.ensure_progress(start);
            skip_newlines(ctx);
        }
        if ctx.token() == RBrace {
            ctx.eat();
        } else {
            ctx.add_error(ParseErrorKind::UnexpectedEof, "enum declaration");
        }
    } else {
        ctx.add_error(ParseErrorKind::ExpectedToken(LBrace), "enum declaration");
    }

    ctx.finish_node(NodeKind::EnumDecl);
}

fn parse_enum_member(ctx: &mut Context) {
    ctx.start_node(NodeKind::EnumMember);
    if ctx.token() == TokenKind::Identifier {
        ctx.eat();
    } else {
        ctx.add_error(ParseErrorKind::ExpectedToken(TokenKind::Identifier), "enum member");
    }
    if ctx.token() == Equals {
        ctx.eat();
        if matches!(ctx.token(), Integer | Float | TokenKind::String | Boolean) {
            ctx.start_node(NodeKind::Literal);
            ctx.eat();
            ctx.finish_node(NodeKind::Literal);
        } else {
            ctx.add_error(ParseErrorKind::UnexpectedToken, "enum member value");
        }
    }
    ctx.finish_node(NodeKind::EnumMember);
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
    fn function_with_typed_default_param_matches_expected_event_sequence() {
        let tokens = tokenize(r#"fun greet(name String = "World") {}"#);
        let reg = DecoratorRegistry::new();
        let known = HashSet::new();
        let mut ctx = Context::new(&tokens);
        parse_function(&mut ctx, &env(&reg, &known));
        let out = ctx.finish();
        assert!(out.errors.is_empty());

        let expected = [
            Event::Open(NodeKind::Function),
            Event::Open(NodeKind::ParamList),
            Event::Open(NodeKind::Param),
            Event::Open(NodeKind::TypeAnnotation),
            Event::Close(NodeKind::TypeAnnotation),
            Event::Open(NodeKind::DefaultValue),
            Event::Close(NodeKind::DefaultValue),
            Event::Close(NodeKind::Param),
            Event::Close(NodeKind::ParamList),
            Event::Open(NodeKind::Block),
            Event::Close(NodeKind::Block),
            Event::Close(NodeKind::Function),
        ];
        let opens_and_closes: Vec<Event> = out
            .events
            .iter()
            .copied()
            .filter(|e| matches!(e, Event::Open(_) | Event::Close(_)))
            .collect();
        assert_eq!(opens_and_closes, expected);
    }

    #[test]
    fn grouped_var_decl_produces_one_var_decl_per_binding() {
        let tokens = tokenize("var (a = 1; b = 2)");
        let reg = DecoratorRegistry::new();
        let known = HashSet::new();
        let mut ctx = Context::new(&tokens);
        parse_var_decl(&mut ctx, &env(&reg, &known));
        let out = ctx.finish();
        assert!(out.errors.is_empty());
        let decls = out.events.iter().filter(|e| matches!(e, Event::Open(NodeKind::VarDecl))).count();
        assert_eq!(decls, 2);
    }

    #[test]
    fn enum_with_explicit_values_parses_cleanly() {
        let tokens = tokenize(r#"enum Status { Active = 1, Inactive = 2 }"#);
        let mut ctx = Context::new(&tokens);
        parse_enum(&mut ctx);
        let out = ctx.finish();
        assert!(out.errors.is_empty());
        let members = out.events.iter().filter(|e| matches!(e, Event::Open(NodeKind::EnumMember))).count();
        assert_eq!(members, 2);
    }
}
