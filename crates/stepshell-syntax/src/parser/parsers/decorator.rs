//! Decorator invocations (§4.5): greedy-longest-registered-prefix path
//! resolution, the primary-parameter dot shortcut, argument lists with
//! schema type-checking, and schema-driven block handling.

use tracing::instrument;

use crate::decorator::{BlockRequirement, DecoratorSchema, ParamSchema, ParamType, MAX_PATH_SEGMENTS};
use crate::diagnostic::ErrorCode;
use crate::event::NodeKind::{self, *};
use crate::token::TokenKind::{self, *};

use super::context::Context;
use super::{parse_block, ParseEnv, ParseErrorKind};

/// Attempt to parse a decorator reference/invocation starting at the
/// current `@` token. Returns `false` without consuming anything if
/// the path that follows does not resolve to any registered decorator
/// (or a proper prefix of one) — per §4.5, "if no prefix is
/// registered, the `@` is left unconsumed", leaving the surrounding
/// context (an expression primary, or the statement dispatcher) to
/// decide what to do with the bare `@`.
#[instrument(level = "trace", skip(ctx, env))]
pub fn parse_decorator(ctx: &mut Context, env: &ParseEnv) -> bool {
    parse_decorator_impl(ctx, env, false)
}

/// Like [`parse_decorator`] but for a statement-position invocation
/// (`@retry(3) { ... }` on its own line, not embedded in an expression
/// or shell argument): the decorator's header and argument list are
/// one executable step (§3's `StepEnter`/`StepExit`), closed before any
/// trailing block is parsed so the block's own statements get their
/// own, non-nested steps.
#[instrument(level = "trace", skip(ctx, env))]
pub fn parse_decorator_at_statement(ctx: &mut Context, env: &ParseEnv) -> bool {
    parse_decorator_impl(ctx, env, true)
}

fn parse_decorator_impl(ctx: &mut Context, env: &ParseEnv, is_statement: bool) -> bool {
    let segments = peek_path_segments(ctx);
    if segments.is_empty() {
        return false;
    }
    let refs: Vec<&str> = segments.iter().map(String::as_str).collect();
    let Some(consumed) = env.registry.resolve_longest_prefix(&refs) else {
        return false;
    };

    let step_opened = is_statement && ctx.maybe_step_enter();
    ctx.start_node(Decorator);
    ctx.eat(); // '@'
    let mut name_parts = Vec::with_capacity(consumed);
    for i in 0..consumed {
        if i > 0 {
            ctx.eat(); // '.'
        }
        name_parts.push(ctx.current_text().to_string());
        ctx.eat();
    }
    let name = name_parts.join(".");

    // `resolve_longest_prefix` only ever returns a count of segments
    // whose joined-by-'.' name is itself registered, so this lookup
    // cannot miss.
    let schema = env
        .registry
        .get(&name)
        .cloned()
        .expect("resolve_longest_prefix only returns registered names");

    let mut filled: Vec<String> = Vec::new();

    if ctx.token() == Dot && ctx.nth(1) != LParen {
        parse_primary_param_shortcut(ctx, &name, &schema, &mut filled);
    } else if ctx.token() == LParen {
        parse_decorator_args(ctx, env, &name, &schema, &mut filled);
    }

    for param in &schema.parameters {
        if param.required && !filled.contains(&param.name) {
            ctx.add_error(ParseErrorKind::MissingRequiredParameter(param.name.clone()), "decorator arguments");
            let suggestion = if schema.primary_parameter.as_deref() == Some(param.name.as_str()) {
                format!("pass it by name ({}=...), positionally, or as '@{}.<value>'", param.name, name)
            } else {
                format!("pass it by name ({}=...) or positionally", param.name)
            };
            ctx.last_error_mut().suggestion = Some(suggestion);
        }
    }

    let has_block = ctx.token() == LBrace;
    ctx.maybe_step_exit(step_opened);
    match (schema.block, has_block) {
        (BlockRequirement::Required, false) => {
            ctx.add_error(ParseErrorKind::DecoratorRequiresBlock(name.clone()), "decorator block");
        }
        (BlockRequirement::Forbidden, true) => {
            ctx.add_error(ParseErrorKind::DecoratorForbidsBlock(name.clone()), "decorator block");
            parse_block(ctx, env, ParseErrorKind::UnexpectedEof, "decorator block");
        }
        (_, true) => {
            parse_block(ctx, env, ParseErrorKind::UnexpectedEof, "decorator block");
        }
        (_, false) => {}
    }

    ctx.finish_node(Decorator);
    true
}

/// Bounded (`<= MAX_PATH_SEGMENTS`) lookahead over every syntactic
/// `.IDENT` continuation, regardless of whether it is actually
/// registered; [`crate::decorator::DecoratorRegistry::resolve_longest_prefix`]
/// then picks the longest *valid* prefix out of what was peeked.
fn peek_path_segments(ctx: &mut Context) -> Vec<String> {
    let mut segments = Vec::new();
    if ctx.nth(1) != TokenKind::Identifier {
        return segments;
    }
    segments.push(ctx.nth_text(1).to_string());
    let mut n = 1usize;
    while segments.len() < MAX_PATH_SEGMENTS && ctx.nth(n + 1) == Dot && ctx.nth(n + 2) == TokenKind::Identifier {
        segments.push(ctx.nth_text(n + 2).to_string());
        n += 2;
    }
    segments
}

/// `@name.PROP` === `@name(PROP)`: the dot-segment becomes the value
/// assigned to the schema's primary parameter.
fn parse_primary_param_shortcut(ctx: &mut Context, decorator_name: &str, schema: &DecoratorSchema, filled: &mut Vec<String>) {
    ctx.eat(); // '.'
    let value_kind = ctx.token();
    let value_text = ctx.current_text().to_string();
    ctx.start_node(NodeKind::Identifier);
    ctx.eat();
    ctx.finish_node(NodeKind::Identifier);

    match schema.primary_parameter.clone() {
        Some(param_name) => {
            if let Some(param) = schema.param(&param_name).cloned() {
                check_value_against_schema(ctx, decorator_name, &param, value_kind, &value_text);
            }
            filled.push(param_name);
        }
        None => {
            ctx.add_error(
                ParseErrorKind::UnknownParameter(value_text, decorator_name.to_string()),
                "decorator parameter",
            );
            let mut names = schema.parameters.iter().map(|p| p.name.clone()).collect::<Vec<_>>();
            names.sort();
            ctx.last_error_mut().suggestion = Some(if names.is_empty() {
                format!("@{decorator_name} has no primary parameter")
            } else {
                format!("valid parameters: {}", names.join(", "))
            });
        }
    }
}

/// Comma-separated `(NAME=VALUE | VALUE, ...)`. Positional arguments
/// fill parameter slots in declaration order, skipping slots already
/// filled by a named argument that appeared earlier in the list.
fn parse_decorator_args(ctx: &mut Context, env: &ParseEnv, decorator_name: &str, schema: &DecoratorSchema, filled: &mut Vec<String>) {
    ctx.start_node(NodeKind::ParamList);
    ctx.eat(); // '('
    let mut positional_cursor = 0usize;

    while !matches!(ctx.token(), RParen | Eof) {
        if ctx.token() == TokenKind::Identifier && ctx.nth(1) == Equals {
            let param_name = ctx.current_text().to_string();
            ctx.start_node(NodeKind::Param);
            ctx.eat(); // name
            ctx.eat(); // '='
            let value_kind = ctx.token();
            let value_text = ctx.current_text().to_string();
            super::expr::parse_expr(ctx, env);
            ctx.finish_node(NodeKind::Param);
            assign_named(ctx, decorator_name, schema, filled, &param_name, value_kind, &value_text);
        } else {
            let value_kind = ctx.token();
            let value_text = ctx.current_text().to_string();
            ctx.start_node(NodeKind::Param);
            super::expr::parse_expr(ctx, env);
            ctx.finish_node(NodeKind::Param);

            while positional_cursor < schema.parameters.len() && filled.contains(&schema.parameters[positional_cursor].name) {
                positional_cursor += 1;
            }
            if let Some(param) = schema.parameters.get(positional_cursor).cloned() {
                check_value_against_schema(ctx, decorator_name, &param, value_kind, &value_text);
                filled.push(param.name);
                positional_cursor += 1;
            }
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
        ctx.add_error(ParseErrorKind::ExpectedToken(RParen), "decorator arguments");
    }
    ctx.finish_node(NodeKind::ParamList);
}

fn assign_named(
    ctx: &mut Context,
    decorator_name: &str,
    schema: &DecoratorSchema,
    filled: &mut Vec<String>,
    param_name: &str,
    value_kind: TokenKind,
    value_text: &str,
) {
    let Some((param, is_deprecated_alias)) = schema.resolve_param(param_name) else {
        ctx.add_error(
            ParseErrorKind::UnknownParameter(param_name.to_string(), decorator_name.to_string()),
            "decorator parameter",
        );
        let mut names = schema.parameters.iter().map(|p| p.name.clone()).collect::<Vec<_>>();
        names.sort();
        ctx.last_error_mut().suggestion = Some(format!("valid parameters: {}", names.join(", ")));
        return;
    };
    let param = param.clone();

    if is_deprecated_alias {
        ctx.warn(
            format!("'{param_name}' is a deprecated name for parameter '{}' of @{decorator_name}", param.name),
            Some(format!("use {}={value_text} instead", param.name)),
        );
    }

    if filled.contains(&param.name) {
        ctx.add_error(ParseErrorKind::DuplicateParameter(param.name.clone()), "decorator parameter");
        return;
    }

    check_value_against_schema(ctx, decorator_name, &param, value_kind, value_text);
    filled.push(param.name);
}

fn type_name(ty: &ParamType) -> &'static str {
    match ty {
        ParamType::String => "string",
        ParamType::Integer => "integer",
        ParamType::Float => "float",
        ParamType::Boolean => "boolean",
        ParamType::Duration => "duration",
        ParamType::Enum(_) => "enum",
    }
}

fn strip_quotes(text: &str) -> &str {
    if text.len() >= 2 {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

/// Type-checks one argument value against its declared parameter
/// schema, recording a `SchemaTypeMismatch`/`SchemaEnumInvalid` error
/// (with `code`/`path`/`expected_type`/`got_value` populated, per §7)
/// or a deprecated-value warning as appropriate. `Identifier` values
/// are accepted for every type without a literal match: they cover
/// both plain variable references and `EnumType.Member` qualified
/// refs, neither of which this syntactic pass can resolve.
fn check_value_against_schema(ctx: &mut Context, decorator_name: &str, param: &ParamSchema, value_kind: TokenKind, value_text: &str) {
    if value_kind == TokenKind::Identifier {
        return;
    }

    let matches_type = match &param.ty {
        ParamType::String => value_kind == TokenKind::String,
        ParamType::Integer => value_kind == TokenKind::Integer,
        ParamType::Float => matches!(value_kind, TokenKind::Float | TokenKind::Integer),
        ParamType::Boolean => value_kind == TokenKind::Boolean,
        ParamType::Duration => value_kind == TokenKind::Duration,
        ParamType::Enum(_) => matches!(value_kind, TokenKind::String),
    };

    if let ParamType::Enum(values) = &param.ty {
        if matches_type {
            let candidate = strip_quotes(value_text);
            if !values.iter().any(|v| v == candidate) {
                if let Some(canonical) = param.deprecated_aliases.get(candidate) {
                    ctx.warn(
                        format!("'{candidate}' is a deprecated value for parameter '{}', use '{canonical}'", param.name),
                        Some(format!("@{decorator_name}({}={candidate})", param.name)),
                    );
                } else {
                    ctx.add_error(
                        ParseErrorKind::SchemaEnumInvalid(candidate.to_string(), param.name.clone()),
                        "decorator parameter",
                    );
                    let err = ctx.last_error_mut();
                    err.code = ErrorCode::SchemaEnumInvalid;
                    err.path = Some(format!("{decorator_name}.{}", param.name));
                    err.got_value = Some(candidate.to_string());
                }
            }
            return;
        }
    }

    if !matches_type {
        ctx.add_error(
            ParseErrorKind::SchemaTypeMismatch(param.name.clone(), type_name(&param.ty).to_string(), value_text.to_string()),
            "decorator parameter",
        );
        let err = ctx.last_error_mut();
        err.code = ErrorCode::SchemaTypeMismatch;
        err.path = Some(format!("{decorator_name}.{}", param.name));
        err.expected_type = Some(type_name(&param.ty).to_string());
        err.got_value = Some(value_text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorator::{BlockRequirement, DecoratorKind, DecoratorRegistry, PipeCapability, RedirectCapability, TransportScope};
    use crate::event::Event;
    use crate::token::tokenize;
    use std::collections::{HashMap, HashSet};

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
    fn unregistered_decorator_leaves_at_unconsumed() {
        let tokens = tokenize("@nope");
        let reg = DecoratorRegistry::new();
        let known = HashSet::new();
        let env = ParseEnv { known_functions: &known, registry: &reg };
        let mut ctx = Context::new(&tokens);
        assert!(!parse_decorator(&mut ctx, &env));
        assert_eq!(ctx.current_index(), 0);
    }

    #[test]
    fn primary_param_shortcut_fills_required_parameter() {
        let tokens = tokenize("@timeout.5s { echo hi }");
        let reg = registry_with_timeout();
        let known = HashSet::new();
        let env = ParseEnv { known_functions: &known, registry: &reg };
        let mut ctx = Context::new(&tokens);
        assert!(parse_decorator(&mut ctx, &env));
        let out = ctx.finish();
        assert!(out.errors.is_empty());
        assert!(out.events.contains(&Event::Open(NodeKind::Block)));
    }

    #[test]
    fn statement_decorator_with_block_keeps_steps_non_nested() {
        // `parse_decorator_at_statement`'s own step must close before
        // the block is entered, so `echo hi` inside gets its own step
        // rather than nesting inside the decorator's. `ctx.finish()`
        // would panic (debug-only) on a depth mismatch if it didn't.
        let tokens = tokenize("@timeout.5s { echo hi }");
        let reg = registry_with_timeout();
        let known = HashSet::new();
        let env = ParseEnv { known_functions: &known, registry: &reg };
        let mut ctx = Context::new(&tokens);
        assert!(parse_decorator_at_statement(&mut ctx, &env));
        let out = ctx.finish();
        assert!(out.errors.is_empty());
        let enters = out.events.iter().filter(|e| matches!(e, Event::StepEnter)).count();
        let exits = out.events.iter().filter(|e| matches!(e, Event::StepExit)).count();
        assert_eq!(enters, exits);
        assert_eq!(enters, 2); // the decorator header, then `echo hi`
    }

    #[test]
    fn missing_required_parameter_is_reported() {
        let tokens = tokenize("@timeout {}");
        let reg = registry_with_timeout();
        let known = HashSet::new();
        let env = ParseEnv { known_functions: &known, registry: &reg };
        let mut ctx = Context::new(&tokens);
        assert!(parse_decorator(&mut ctx, &env));
        let out = ctx.finish();
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].kind, ParseErrorKind::MissingRequiredParameter("duration".to_string()));
    }

    fn registry_with_deprecated_param_name() -> DecoratorRegistry {
        let mut reg = DecoratorRegistry::new();
        reg.register(DecoratorSchema {
            name: "timeout".to_string(),
            parameters: vec![ParamSchema {
                name: "duration".to_string(),
                ty: ParamType::Duration,
                required: true,
                deprecated_aliases: HashMap::new(),
                deprecated_names: vec!["length".to_string()],
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
    fn deprecated_parameter_name_resolves_and_warns() {
        let tokens = tokenize("@timeout(length=5s) { echo hi }");
        let reg = registry_with_deprecated_param_name();
        let known = HashSet::new();
        let env = ParseEnv { known_functions: &known, registry: &reg };
        let mut ctx = Context::new(&tokens);
        assert!(parse_decorator(&mut ctx, &env));
        let out = ctx.finish();
        assert!(out.errors.is_empty(), "deprecated alias must not be an unknown-parameter error: {:?}", out.errors);
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].message.contains("'length' is a deprecated name"));
        assert!(out.warnings[0].message.contains("duration"));
    }

    #[test]
    fn unknown_parameter_name_is_still_reported() {
        let tokens = tokenize("@timeout(bogus=5s) { echo hi }");
        let reg = registry_with_deprecated_param_name();
        let known = HashSet::new();
        let env = ParseEnv { known_functions: &known, registry: &reg };
        let mut ctx = Context::new(&tokens);
        assert!(parse_decorator(&mut ctx, &env));
        let out = ctx.finish();
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].kind, ParseErrorKind::UnknownParameter("bogus".to_string(), "timeout".to_string()));
    }
}
