//! Semantic validator (§4.7): a second pass over an already-finished
//! event stream that checks things the grammar alone cannot reject —
//! pipe/redirect capability, transport-scope nesting, execution-mode
//! restrictions, and `@cmd` recursion.
//!
//! The flat event stream is awkward to scan directly for these checks
//! (they all need "what is my parent, what is my next sibling"
//! questions answered), so [`validate`] first rebuilds a small
//! in-memory tree from it and walks that instead. The tree never
//! leaves this module.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::decorator::{DecoratorRegistry, TransportScope};
use crate::event::{Event, NodeKind};
use crate::token::{Position, Token, TokenKind};

/// Whether a tree is being validated as a standalone shell command or
/// a full script. Only `Command` mode restricts top-level shell
/// commands (§4.7 execution-mode validation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExecutionMode {
    Command,
    Script,
}

/// Semantic diagnostics raised by [`validate`]. Kept separate from
/// [`crate::diagnostic::ParseErrorKind`]: these come from a distinct
/// post-parse pass over a complete tree, not from parsing itself, and
/// none of the syntax-error-only fields on `ParseError` (`expected`,
/// `got`, the schema-mismatch fields) ever apply here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationErrorKind {
    #[error("@{0} does not produce stdout")]
    PipeSourceNotStdout(String),
    #[error("@{0} does not support redirection")]
    RedirectNotSupported(String),
    #[error("@{0} does not support append (>>)")]
    AppendNotSupported(String),
    #[error("@{0} is root-only and cannot be used inside @{1}")]
    RootOnlyInsideTransport(String, String),
    #[error("shell commands are not allowed in command mode")]
    ShellCommandNotAllowed,
    #[error("recursive @cmd reference: {0}")]
    RecursiveCommandReference(String),
}

/// One semantic diagnostic: position, stable kind, and the context a
/// renderer would want, mirroring [`crate::diagnostic::ParseError`]'s
/// shape without the fields that only a syntax error ever populates.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValidationError {
    pub position: Position,
    pub kind: ValidationErrorKind,
    pub context: &'static str,
}

impl ValidationError {
    #[must_use]
    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {} in {}", self.position.line, self.position.column, self.kind, self.context)
    }
}

/// Run every §4.7 check over `events`/`tokens` and return whatever
/// diagnostics they raise, in check order (pipe, redirect, transport,
/// execution-mode, recursion). An empty event stream (the degenerate
/// "nothing to validate" case) yields no diagnostics rather than
/// panicking on the tree rebuild.
#[must_use]
pub fn validate<'a>(events: &[Event], tokens: &'a [Token<'a>], registry: &DecoratorRegistry, mode: ExecutionMode) -> Vec<ValidationError> {
    if events.is_empty() {
        return Vec::new();
    }

    let root = build_tree(events, tokens);
    let mut errors = Vec::new();

    check_pipes(&root, registry, &mut errors);
    check_redirects(&root, registry, &mut errors);
    check_transport(&root, registry, &mut Vec::new(), &mut errors);
    check_execution_mode(&root, mode, &mut errors);
    check_recursion(&root, &mut errors);

    errors
}

/// A materialized node, one per `Open`/`Close` pair in the event
/// stream. Borrows tokens straight out of the original slice; never
/// allocates text of its own.
struct Node<'a> {
    kind: NodeKind,
    children: Vec<Child<'a>>,
}

enum Child<'a> {
    Node(Node<'a>),
    Token(&'a Token<'a>),
}

fn build_tree<'a>(events: &[Event], tokens: &'a [Token<'a>]) -> Node<'a> {
    let mut pos = 0;
    build_node(events, tokens, &mut pos)
}

/// `events[*pos]` must be an `Open`; consumes through the matching
/// `Close` (events are a well-formed LIFO tree by construction — see
/// the event-balance property — so no explicit kind check is needed
/// against the corresponding `Close`). `StepEnter`/`StepExit` carry no
/// tree information relevant to these checks and are skipped.
fn build_node<'a>(events: &[Event], tokens: &'a [Token<'a>], pos: &mut usize) -> Node<'a> {
    let kind = match events[*pos] {
        Event::Open(kind) => kind,
        _ => unreachable!("build_node called off a non-Open event"),
    };
    *pos += 1;

    let mut children = Vec::new();
    loop {
        match events[*pos] {
            Event::Close(_) => {
                *pos += 1;
                break;
            }
            Event::Open(_) => children.push(Child::Node(build_node(events, tokens, pos))),
            Event::Token(index) => {
                children.push(Child::Token(&tokens[index as usize]));
                *pos += 1;
            }
            Event::StepEnter | Event::StepExit => *pos += 1,
        }
    }
    Node { kind, children }
}

impl<'a> Node<'a> {
    /// First direct child node of the given kind.
    fn find(&self, kind: NodeKind) -> Option<&Node<'a>> {
        self.children.iter().find_map(|c| match c {
            Child::Node(n) if n.kind == kind => Some(n),
            _ => None,
        })
    }

    /// Text of the leading run of bare `Token` children, stopping at
    /// the first nested node. A decorator's dotted name is always
    /// emitted this way (`@`, then one bare token per path segment,
    /// each preceded by a `.` for segments after the first) before any
    /// `ParamList`/primary-parameter-shortcut/`Block` child appears, so
    /// this reconstructs it without needing a second name-resolution
    /// pass.
    fn leading_token_texts(&self) -> Vec<&'a str> {
        let mut out = Vec::new();
        for child in &self.children {
            match child {
                Child::Token(tok) => out.push(tok.text),
                Child::Node(_) => break,
            }
        }
        out
    }

    /// First token found anywhere under this node, depth-first,
    /// pre-order. Used both to get a representative position for a
    /// node and to pull a literal value out of a decorator argument
    /// without caring exactly how the parser wrapped it (`Literal`,
    /// the primary-parameter-shortcut `Identifier`, etc).
    fn first_token(&self) -> Option<&'a Token<'a>> {
        for child in &self.children {
            match child {
                Child::Token(tok) => return Some(tok),
                Child::Node(n) => {
                    if let Some(tok) = n.first_token() {
                        return Some(tok);
                    }
                }
            }
        }
        None
    }

    fn position(&self) -> Position {
        self.first_token().map_or_else(Position::start, |t| t.position)
    }

    /// Visit this node and every descendant node, pre-order.
    fn walk<'s>(&'s self, f: &mut impl FnMut(&'s Node<'a>)) {
        f(self);
        for child in &self.children {
            if let Child::Node(n) = child {
                n.walk(f);
            }
        }
    }
}

/// Reconstructs a `Decorator` node's dotted name from its leading bare
/// tokens, discarding the `@` marker and every `.` separator (a
/// primary-parameter shortcut also leaves a bare `.` among the leading
/// tokens, immediately before the `Identifier` node it introduces —
/// discarding every `.` rather than just the name-internal ones still
/// yields the right name, since `leading_token_texts` already stops
/// before that `Identifier` node).
fn decorator_name(node: &Node) -> String {
    node.leading_token_texts()
        .into_iter()
        .filter(|t| *t != "@" && *t != ".")
        .collect::<Vec<_>>()
        .join(".")
}

/// The first value a decorator was invoked with, quote-stripped: from
/// its `ParamList`'s first `Param` if called with arguments, or from
/// the primary-parameter-shortcut `Identifier` otherwise. `None` if
/// the decorator was invoked bare.
fn decorator_arg_text(node: &Node) -> Option<String> {
    if let Some(params) = node.find(NodeKind::ParamList) {
        return params.find(NodeKind::Param).and_then(Node::first_token).map(|t| strip_quotes(t.text).to_string());
    }
    node.find(NodeKind::Identifier).and_then(Node::first_token).map(|t| strip_quotes(t.text).to_string())
}

fn strip_quotes(text: &str) -> &str {
    if text.len() >= 2 && (text.starts_with('"') || text.starts_with('\'')) {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

/// For each `|` that immediately follows a completed `Decorator`
/// sibling, the decorator's schema must advertise `ProducesStdout`.
/// Interpolated decorators embedded in a string argument are nested
/// under `InterpolatedString`/`StringPart`, never directly adjacent to
/// a pipe token at the same sibling level, so they are exempt without
/// any special-casing here.
fn check_pipes(node: &Node, registry: &DecoratorRegistry, errors: &mut Vec<ValidationError>) {
    for pair in node.children.windows(2) {
        if let [Child::Node(dec), Child::Token(pipe)] = pair {
            if dec.kind == NodeKind::Decorator && pipe.kind == TokenKind::Pipe {
                let name = decorator_name(dec);
                if let Some(schema) = registry.get(&name) {
                    if !schema.pipe.produces_stdout() {
                        errors.push(ValidationError {
                            position: pipe.position,
                            kind: ValidationErrorKind::PipeSourceNotStdout(name),
                            context: "pipe",
                        });
                    }
                }
            }
        }
    }
    for child in &node.children {
        if let Child::Node(n) = child {
            check_pipes(n, registry, errors);
        }
    }
}

/// For each `Redirect` whose target is itself a decorator invocation,
/// the target's schema must advertise the matching capability for the
/// operator used. Bare-path/variable targets (the common case) carry
/// no `Decorator` child and are always accepted.
fn check_redirects(node: &Node, registry: &DecoratorRegistry, errors: &mut Vec<ValidationError>) {
    if node.kind == NodeKind::Redirect {
        let operator = node.first_token().map_or("", |t| t.text);
        if let Some(decorator) = node
            .find(NodeKind::RedirectTarget)
            .and_then(|target| target.find(NodeKind::ShellArg))
            .and_then(|arg| arg.find(NodeKind::Decorator))
        {
            let name = decorator_name(decorator);
            if let Some(schema) = registry.get(&name) {
                let position = decorator.position();
                let kind = if operator == ">>" {
                    if schema.redirect.supports_append() {
                        None
                    } else if schema.redirect.supports_overwrite() {
                        Some(ValidationErrorKind::AppendNotSupported(name))
                    } else {
                        Some(ValidationErrorKind::RedirectNotSupported(name))
                    }
                } else if schema.redirect.supports_overwrite() {
                    None
                } else {
                    Some(ValidationErrorKind::RedirectNotSupported(name))
                };
                if let Some(kind) = kind {
                    errors.push(ValidationError { position, kind, context: "redirect operator" });
                }
            }
        }
    }
    for child in &node.children {
        if let Child::Node(n) = child {
            check_redirects(n, registry, errors);
        }
    }
}

/// Tracks a `transport_depth` stack of enclosing decorator names whose
/// schema has `switches_transport=true`. Any `RootOnly`-scoped
/// decorator encountered while that stack is non-empty is reported
/// against its nearest enclosing transport-switching ancestor.
fn check_transport<'a>(node: &Node<'a>, registry: &DecoratorRegistry, stack: &mut Vec<String>, errors: &mut Vec<ValidationError>) {
    for child in &node.children {
        let Child::Node(n) = child else { continue };

        if n.kind == NodeKind::Decorator {
            let name = decorator_name(n);
            if let Some(schema) = registry.get(&name) {
                if schema.transport == TransportScope::RootOnly {
                    if let Some(enclosing) = stack.last() {
                        errors.push(ValidationError {
                            position: n.position(),
                            kind: ValidationErrorKind::RootOnlyInsideTransport(name.clone(), enclosing.clone()),
                            context: "decorator transport scope",
                        });
                    }
                }
                if schema.switches_transport {
                    stack.push(name);
                    check_transport(n, registry, stack, errors);
                    stack.pop();
                    continue;
                }
            }
        }
        check_transport(n, registry, stack, errors);
    }
}

/// In `Command` mode, a top-level `ShellCommand` is rejected; var-decls
/// and functions are accepted. `Script` mode accepts everything, so
/// this is a no-op there.
fn check_execution_mode(root: &Node, mode: ExecutionMode, errors: &mut Vec<ValidationError>) {
    if mode == ExecutionMode::Script {
        return;
    }
    for child in &root.children {
        if let Child::Node(n) = child {
            if n.kind == NodeKind::ShellCommand {
                errors.push(ValidationError {
                    position: n.position(),
                    kind: ValidationErrorKind::ShellCommandNotAllowed,
                    context: "top level",
                });
            }
        }
    }
}

/// Builds the command -> `@cmd(NAME)` reference graph by walking every
/// top-level function's body for `Decorator` nodes named `cmd`, then
/// runs DFS per function with a `visiting` stack so a back-edge (a
/// target already on the current path) is reported as a cycle rather
/// than as unbounded recursion.
fn check_recursion(root: &Node, errors: &mut Vec<ValidationError>) {
    let mut functions: Vec<(String, &Node)> = Vec::new();
    for child in &root.children {
        if let Child::Node(n) = child {
            if n.kind == NodeKind::Function {
                if let Some(name) = n.leading_token_texts().get(1) {
                    functions.push(((*name).to_string(), n));
                }
            }
        }
    }

    let mut graph: HashMap<String, Vec<(String, Position)>> = HashMap::new();
    for (name, node) in &functions {
        let mut targets = Vec::new();
        node.walk(&mut |n| {
            if n.kind == NodeKind::Decorator && decorator_name(n) == "cmd" {
                if let Some(target) = decorator_arg_text(n) {
                    targets.push((target, n.position()));
                }
            }
        });
        graph.insert(name.clone(), targets);
    }

    let mut visited: HashSet<String> = HashSet::new();
    for (name, _) in &functions {
        if !visited.contains(name) {
            let mut visiting = Vec::new();
            dfs_cycle(name, &graph, &mut visiting, &mut visited, errors);
        }
    }
}

fn dfs_cycle(name: &str, graph: &HashMap<String, Vec<(String, Position)>>, visiting: &mut Vec<String>, visited: &mut HashSet<String>, errors: &mut Vec<ValidationError>) {
    if visited.contains(name) {
        return;
    }

    if let Some(start) = visiting.iter().position(|n| n == name) {
        let mut cycle = visiting[start..].to_vec();
        cycle.push(name.to_string());
        let position = visiting
            .last()
            .and_then(|caller| graph.get(caller))
            .and_then(|edges| edges.iter().find(|(target, _)| target == name))
            .map_or_else(Position::start, |(_, pos)| *pos);
        errors.push(ValidationError {
            position,
            kind: ValidationErrorKind::RecursiveCommandReference(cycle.join(" -> ")),
            context: "command recursion",
        });
        return;
    }

    visiting.push(name.to_string());
    if let Some(targets) = graph.get(name) {
        for (target, _) in targets {
            dfs_cycle(target, graph, visiting, visited, errors);
        }
    }
    visiting.pop();
    visited.insert(name.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorator::{BlockRequirement, DecoratorKind, DecoratorSchema, ParamSchema, ParamType, PipeCapability, RedirectCapability};
    use crate::token::tokenize;
    use std::collections::HashMap as StdHashMap;

    fn registry_with(schemas: Vec<DecoratorSchema>) -> DecoratorRegistry {
        let mut reg = DecoratorRegistry::new();
        for schema in schemas {
            reg.register(schema);
        }
        reg
    }

    fn timeout_schema(redirect: RedirectCapability) -> DecoratorSchema {
        DecoratorSchema {
            name: "timeout".to_string(),
            parameters: vec![ParamSchema {
                name: "duration".to_string(),
                ty: ParamType::Duration,
                required: true,
                deprecated_aliases: StdHashMap::new(),
                deprecated_names: Vec::new(),
            }],
            primary_parameter: Some("duration".to_string()),
            block: BlockRequirement::Required,
            redirect,
            pipe: PipeCapability::Neither,
            transport: TransportScope::Agnostic,
            switches_transport: false,
            kind: DecoratorKind::Wrapper,
        }
    }

    fn parse(source: &str, registry: &DecoratorRegistry) -> (Vec<Event>, Vec<Token<'_>>) {
        let tokens = tokenize(source);
        let out = crate::parser::run(&tokens, registry);
        assert!(out.errors.is_empty(), "unexpected parse errors: {:?}", out.errors);
        (out.events, tokens)
    }

    #[test]
    fn redirect_to_decorator_without_capability_is_reported() {
        let reg = registry_with(vec![timeout_schema(RedirectCapability::None)]);
        let (events, tokens) = parse(r#"echo "hello" > @timeout(5s) { echo "inner" }"#, &reg);
        let errors = validate(&events, &tokens, &reg, ExecutionMode::Script);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationErrorKind::RedirectNotSupported("timeout".to_string()));
        assert_eq!(errors[0].context, "redirect operator");
    }

    #[test]
    fn append_to_overwrite_only_decorator_is_reported() {
        let reg = registry_with(vec![timeout_schema(RedirectCapability::OverwriteOnly)]);
        let (events, tokens) = parse(r#"echo "hello" >> @timeout(5s) { echo "inner" }"#, &reg);
        let errors = validate(&events, &tokens, &reg, ExecutionMode::Script);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationErrorKind::AppendNotSupported("timeout".to_string()));
    }

    #[test]
    fn redirect_with_matching_capability_is_clean() {
        let reg = registry_with(vec![timeout_schema(RedirectCapability::Both)]);
        let (events, tokens) = parse(r#"echo "hello" > @timeout(5s) { echo "inner" }"#, &reg);
        let errors = validate(&events, &tokens, &reg, ExecutionMode::Script);
        assert!(errors.is_empty());
    }

    #[test]
    fn pipe_from_decorator_without_stdout_is_reported() {
        let mut schema = timeout_schema(RedirectCapability::None);
        schema.block = BlockRequirement::Optional;
        let reg = registry_with(vec![schema]);
        let (events, tokens) = parse("@timeout.5s | echo done", &reg);
        let errors = validate(&events, &tokens, &reg, ExecutionMode::Script);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationErrorKind::PipeSourceNotStdout("timeout".to_string()));
    }

    #[test]
    fn root_only_decorator_inside_transport_switch_is_reported() {
        let remote = DecoratorSchema {
            name: "remote".to_string(),
            parameters: vec![],
            primary_parameter: None,
            block: BlockRequirement::Required,
            redirect: RedirectCapability::None,
            pipe: PipeCapability::Neither,
            transport: TransportScope::Agnostic,
            switches_transport: true,
            kind: DecoratorKind::Wrapper,
        };
        let local_only = DecoratorSchema {
            name: "local_secret".to_string(),
            parameters: vec![],
            primary_parameter: None,
            block: BlockRequirement::Forbidden,
            redirect: RedirectCapability::None,
            pipe: PipeCapability::ProducesStdout,
            transport: TransportScope::RootOnly,
            switches_transport: false,
            kind: DecoratorKind::Value,
        };
        let reg = registry_with(vec![remote, local_only]);
        let (events, tokens) = parse("@remote { echo @local_secret }", &reg);
        let errors = validate(&events, &tokens, &reg, ExecutionMode::Script);
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].kind,
            ValidationErrorKind::RootOnlyInsideTransport("local_secret".to_string(), "remote".to_string())
        );
    }

    #[test]
    fn top_level_shell_command_rejected_in_command_mode_only() {
        let reg = DecoratorRegistry::new();
        let (events, tokens) = parse("echo hi", &reg);
        let command_errors = validate(&events, &tokens, &reg, ExecutionMode::Command);
        assert_eq!(command_errors.len(), 1);
        assert_eq!(command_errors[0].kind, ValidationErrorKind::ShellCommandNotAllowed);

        let script_errors = validate(&events, &tokens, &reg, ExecutionMode::Script);
        assert!(script_errors.is_empty());
    }

    #[test]
    fn mutually_recursive_cmd_references_are_reported() {
        let cmd = DecoratorSchema {
            name: "cmd".to_string(),
            parameters: vec![ParamSchema {
                name: "name".to_string(),
                ty: ParamType::String,
                required: true,
                deprecated_aliases: StdHashMap::new(),
                deprecated_names: Vec::new(),
            }],
            primary_parameter: Some("name".to_string()),
            block: BlockRequirement::Forbidden,
            redirect: RedirectCapability::None,
            pipe: PipeCapability::ProducesStdout,
            transport: TransportScope::Agnostic,
            switches_transport: false,
            kind: DecoratorKind::Execution,
        };
        let reg = registry_with(vec![cmd]);
        let (events, tokens) = parse(r#"fun a { @cmd("b") } fun b { @cmd("a") }"#, &reg);
        let errors = validate(&events, &tokens, &reg, ExecutionMode::Script);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0].kind, ValidationErrorKind::RecursiveCommandReference(_)));
    }

    #[test]
    fn non_recursive_cmd_reference_is_clean() {
        let cmd = DecoratorSchema {
            name: "cmd".to_string(),
            parameters: vec![ParamSchema {
                name: "name".to_string(),
                ty: ParamType::String,
                required: true,
                deprecated_aliases: StdHashMap::new(),
                deprecated_names: Vec::new(),
            }],
            primary_parameter: Some("name".to_string()),
            block: BlockRequirement::Forbidden,
            redirect: RedirectCapability::None,
            pipe: PipeCapability::ProducesStdout,
            transport: TransportScope::Agnostic,
            switches_transport: false,
            kind: DecoratorKind::Execution,
        };
        let reg = registry_with(vec![cmd]);
        let (events, tokens) = parse(r#"fun a { @cmd("b") } fun b { echo hi }"#, &reg);
        let errors = validate(&events, &tokens, &reg, ExecutionMode::Script);
        assert!(errors.is_empty());
    }
}
