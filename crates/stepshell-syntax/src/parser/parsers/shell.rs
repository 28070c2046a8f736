//! Shell commands and their boundaries (§4.2.3), reached from
//! statement position either directly (a bare identifier head) or as
//! the continuation after a statement-level decorator invocation
//! (§4.2.2).

use tracing::instrument;

use crate::event::NodeKind;
use crate::token::TokenKind::{self, *};

use super::context::Context;
use super::{decorator, expr, ParseEnv, ParseErrorKind};

/// Tokens that end a shell command (a chaining operator, a redirect,
/// or a statement boundary) rather than continuing it as another
/// `ShellArg`.
fn is_boundary(kind: TokenKind) -> bool {
    matches!(
        kind,
        Newline | RBrace | Eof | TokenKind::Else | AndAnd | OrOr | Pipe | Semicolon | Gt | Append
    )
}

/// An identifier-headed statement: parse one shell command, then keep
/// consuming `&&`/`||`/`|` chains into further shell commands for as
/// long as they appear.
#[instrument(level = "trace", skip(ctx, env))]
pub fn parse_shell_command(ctx: &mut Context, env: &ParseEnv) {
    parse_one_shell_command(ctx, env);
    while matches!(ctx.token(), AndAnd | OrOr | Pipe) {
        ctx.eat();
        parse_one_shell_command(ctx, env);
    }
}

/// A statement-position decorator invocation that may itself chain
/// into a shell command (`@retry(3) && echo done`). The decorator
/// invocation is emitted directly, with no enclosing `ShellCommand` —
/// only the continuation (if any) gets the usual shell-command
/// treatment.
#[instrument(level = "trace", skip(ctx, env))]
pub fn parse_decorator_statement(ctx: &mut Context, env: &ParseEnv) {
    if !decorator::parse_decorator_at_statement(ctx, env) {
        ctx.eat_error(ParseErrorKind::UnexpectedToken, "statement");
        return;
    }
    if matches!(ctx.token(), AndAnd | OrOr | Pipe) {
        ctx.eat();
        parse_shell_command(ctx, env);
    }
}

fn parse_one_shell_command(ctx: &mut Context, env: &ParseEnv) {
    let step_opened = ctx.maybe_step_enter();
    ctx.start_node(NodeKind::ShellCommand);
    while !is_boundary(ctx.token()) {
        let start = ctx.current_index();
        parse_shell_arg(ctx, env);
        ctx.ensure_progress(start);
    }
    while matches!(ctx.token(), Gt | Append) {
        parse_redirect(ctx, env);
    }
    ctx.finish_node(NodeKind::ShellCommand);
    ctx.maybe_step_exit(step_opened);
}

/// One `ShellArg`: a quoted string (which may degrade to
/// `InterpolatedString`, per §4.4), an embedded decorator reference,
/// or a run of tokens glued together by the absence of whitespace
/// between them (`has_space_before=false`) — e.g. the single argument
/// `out.log` is `Identifier` `Dot` `Identifier` with no space anywhere,
/// so it is one `ShellArg`, not three.
fn parse_shell_arg(ctx: &mut Context, env: &ParseEnv) {
    ctx.start_node(NodeKind::ShellArg);
    match ctx.token() {
        TokenKind::String => expr::parse_string_literal(ctx),
        At => {
            if !decorator::parse_decorator(ctx, env) {
                ctx.eat_error(ParseErrorKind::UnexpectedToken, "shell argument");
            }
        }
        _ => {
            ctx.eat();
            while !ctx.current_has_space_before() && can_glue(ctx.token()) {
                ctx.eat();
            }
        }
    }
    ctx.finish_node(NodeKind::ShellArg);
}

/// Whether `kind`, immediately adjacent (no preceding space) to the
/// token before it, continues the same glued `ShellArg` rather than
/// starting a new one. Quoted strings and decorators always start
/// their own `ShellArg` even when glued with no space, since both
/// produce their own child node rather than a bare token.
fn can_glue(kind: TokenKind) -> bool {
    !is_boundary(kind) && !matches!(kind, TokenKind::String | At)
}

/// `>`/`>>` followed by exactly one shell argument as its
/// `RedirectTarget`; scanning for further chain operators resumes in
/// the caller's loop once this returns, so `echo a > out && echo b`
/// still sees the trailing `&&`.
fn parse_redirect(ctx: &mut Context, env: &ParseEnv) {
    ctx.start_node(NodeKind::Redirect);
    ctx.eat(); // '>' or '>>'
    ctx.start_node(NodeKind::RedirectTarget);
    if is_boundary(ctx.token()) {
        ctx.add_error(ParseErrorKind::UnexpectedEof, "redirect target");
    } else {
        parse_shell_arg(ctx, env);
    }
    ctx.finish_node(NodeKind::RedirectTarget);
    ctx.finish_node(NodeKind::Redirect);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorator::{BlockRequirement, DecoratorKind, DecoratorRegistry, DecoratorSchema, ParamSchema, ParamType, PipeCapability, RedirectCapability, TransportScope};
    use crate::event::Event;
    use crate::token::tokenize;
    use std::collections::{HashMap, HashSet};

    fn env(registry: &DecoratorRegistry, known: &HashSet<&str>) -> ParseEnv<'_> {
        ParseEnv { known_functions: known, registry }
    }

    fn registry_with_timeout() -> DecoratorRegistry {
        let mut reg = DecoratorRegistry::new();
        reg.register(DecoratorSchema {
            name: "timeout".to_string(),
            parameters: vec![ParamSchema {
                name: "duration".to_string(),
                ty: ParamType::Duration,
                required: true,
                deprecated_aliases: HashMap::new(),
                deprecated_names: Vec::new(),
            }],
            primary_parameter: Some("duration".to_string()),
            block: BlockRequirement::Required,
            redirect: RedirectCapability::None,
            pipe: PipeCapability::Neither,
            transport: TransportScope::Agnostic,
            switches_transport: false,
            kind: DecoratorKind::Wrapper,
        });
        reg
    }

    #[test]
    fn glued_tokens_form_a_single_shell_arg() {
        let tokens = tokenize("echo out.log");
        let reg = DecoratorRegistry::new();
        let known = HashSet::new();
        let mut ctx = Context::new(&tokens);
        parse_shell_command(&mut ctx, &env(&reg, &known));
        let out = ctx.finish();
        assert!(out.errors.is_empty());
        let args = out.events.iter().filter(|e| matches!(e, Event::Open(NodeKind::ShellArg))).count();
        assert_eq!(args, 2);
    }

    #[test]
    fn redirect_then_chain_both_parse() {
        let tokens = tokenize("echo a > out && echo b");
        let reg = DecoratorRegistry::new();
        let known = HashSet::new();
        let mut ctx = Context::new(&tokens);
        parse_shell_command(&mut ctx, &env(&reg, &known));
        let out = ctx.finish();
        assert!(out.errors.is_empty());
        assert!(out.events.contains(&Event::Open(NodeKind::Redirect)));
        let commands = out.events.iter().filter(|e| matches!(e, Event::Open(NodeKind::ShellCommand))).count();
        assert_eq!(commands, 2);
    }

    #[test]
    fn redirect_target_may_be_a_decorator_with_a_block() {
        let tokens = tokenize(r#"echo "hello" > @timeout(5s) { echo "inner" }"#);
        let reg = registry_with_timeout();
        let known = HashSet::new();
        let mut ctx = Context::new(&tokens);
        parse_shell_command(&mut ctx, &env(&reg, &known));
        let out = ctx.finish();
        assert!(out.errors.is_empty());
        assert!(out.events.contains(&Event::Open(NodeKind::RedirectTarget)));
        assert!(out.events.contains(&Event::Open(NodeKind::Decorator)));
        // The inner `echo "inner"` is lexically nested inside the
        // outer command's own step (via a non-statement decorator
        // reference); `ctx.finish()` above already panics (debug-only)
        // on a depth mismatch if the two were to nest, and there
        // should be exactly one step covering the whole thing.
        assert_eq!(out.events.iter().filter(|e| matches!(e, Event::StepEnter)).count(), 1);
        assert_eq!(out.events.iter().filter(|e| matches!(e, Event::StepExit)).count(), 1);
    }

    #[test]
    fn decorator_statement_chains_into_shell_command() {
        let tokens = tokenize("@timeout.5s { echo hi } && echo done");
        let reg = registry_with_timeout();
        let known = HashSet::new();
        let mut ctx = Context::new(&tokens);
        parse_decorator_statement(&mut ctx, &env(&reg, &known));
        let out = ctx.finish();
        assert!(out.errors.is_empty());
        assert!(out.events.contains(&Event::Open(NodeKind::ShellCommand)));
    }
}
