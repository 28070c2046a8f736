//! The public entry points: `parse`/`parse_string`, the `ParseTree`
//! they return, and the `ParserConfig` that controls optional
//! telemetry/debug tracing.
//!
//! `parse(bytes)` is a pure function of its input (§5): given a fixed
//! decorator registry snapshot, the same bytes always produce a
//! field-by-field identical tree. Source bytes must outlive the
//! returned `ParseTree`, since every `Token`'s `text` borrows straight
//! out of them — there is no copying lexer pass.

use std::time::{Duration, Instant};

use tracing::instrument;

use crate::decorator::DecoratorRegistry;
use crate::diagnostic::{ParseError, ParseErrorKind, ParseWarning};
use crate::event::{Event, NodeKind};
use crate::token::{tokenize, Position, Token, TokenKind};
use crate::validator::{self, ExecutionMode, ValidationError};

/// How much telemetry a parse records about itself, per §5/§6.4. `Off`
/// is the default and costs nothing beyond the four counters every
/// parse already has on hand; `Timing` additionally wraps the lex and
/// parse phases in [`Instant::now`] calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TelemetryLevel {
    #[default]
    Off,
    Basic,
    Timing,
}

/// How much of the parse's internal decision-making is recorded into
/// [`ParseTree::debug_events`]. `Paths` records the tree shape as it
/// is built (every `Open`/`Close`); `Detailed` additionally records
/// every consumed token. Both are reconstructed from the finished
/// event stream rather than threaded through the parser itself, so
/// turning this on never changes parse behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DebugLevel {
    #[default]
    Off,
    Paths,
    Detailed,
}

/// One entry in [`ParseTree::debug_events`]. `position` is the source
/// position the parser had most recently reached when the event was
/// recorded, i.e. the position of the last token consumed before it —
/// not necessarily the position of the event's own payload, which may
/// be a node that opens before any of its children are consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DebugEvent {
    NodeOpened { kind: NodeKind, position: Position },
    NodeClosed { kind: NodeKind, position: Position },
    TokenConsumed { kind: TokenKind, position: Position },
}

/// Counters and (optionally) timings for one parse, per §5/§6.4's
/// "levels: Off, Basic counters, Timing with wall-clock deltas".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TelemetryRecord {
    pub token_count: usize,
    pub event_count: usize,
    pub error_count: usize,
    pub warning_count: usize,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub lex_duration: Option<Duration>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub parse_duration: Option<Duration>,
}

/// Runtime knobs for [`parse`]/[`parse_string`]. The core spec names
/// exactly two: telemetry level and debug level (§6.4: "No other
/// runtime knobs"). `Default` matches "no telemetry, no debug".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParserConfig {
    telemetry: TelemetryLevel,
    debug: DebugLevel,
}

impl ParserConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_telemetry(mut self, level: TelemetryLevel) -> Self {
        self.telemetry = level;
        self
    }

    #[must_use]
    pub fn with_debug(mut self, level: DebugLevel) -> Self {
        self.debug = level;
        self
    }

    #[must_use]
    pub fn telemetry(&self) -> TelemetryLevel {
        self.telemetry
    }

    #[must_use]
    pub fn debug(&self) -> DebugLevel {
        self.debug
    }
}

/// The immutable result of one parse: source bytes, the flat token
/// vector, the flat event stream, and whatever diagnostics the parser
/// recorded. Constructed once by [`parse`]/[`parse_string`] and never
/// mutated afterward; [`Self::validate_semantics`] returns further
/// diagnostics rather than appending them in place, so every prior
/// field stays exactly as the parser left it.
#[derive(Debug, Clone)]
pub struct ParseTree<'src> {
    pub source: &'src str,
    pub tokens: Vec<Token<'src>>,
    pub events: Vec<Event>,
    pub errors: Vec<ParseError>,
    pub warnings: Vec<ParseWarning>,
    pub telemetry: Option<TelemetryRecord>,
    pub debug_events: Option<Vec<DebugEvent>>,
}

impl<'src> ParseTree<'src> {
    /// True iff no parse-time errors were recorded. The core spec's
    /// sole "parsed cleanly" contract (§7); warnings never affect it.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Run the §4.7 semantic validator over this tree's already-built
    /// event stream and return whatever diagnostics it raises. Does
    /// not touch `self`: callers that want augmented diagnostics merge
    /// the result themselves, keeping `ParseTree` immutable after
    /// construction per its lifecycle contract.
    #[must_use]
    pub fn validate_semantics(&self, registry: &DecoratorRegistry, mode: ExecutionMode) -> Vec<ValidationError> {
        validator::validate(&self.events, &self.tokens, registry, mode)
    }
}

/// Parse UTF-8 source bytes into a [`ParseTree`]. Fails soft on
/// invalid UTF-8 rather than panicking: the returned tree has an empty
/// source, a single `EOF` token, and one [`ParseErrorKind::InvalidInput`]
/// diagnostic, consistent with "the parser never panics" (§4.6) and
/// "returns a complete `ParseTree` for any input" (§7).
#[must_use]
pub fn parse<'src>(bytes: &'src [u8], registry: &DecoratorRegistry, config: &ParserConfig) -> ParseTree<'src> {
    match std::str::from_utf8(bytes) {
        Ok(source) => parse_string(source, registry, config),
        Err(_) => invalid_utf8_tree(),
    }
}

fn invalid_utf8_tree<'src>() -> ParseTree<'src> {
    let tokens = vec![Token {
        kind: TokenKind::Eof,
        text: "",
        position: Position::start(),
        has_space_before: false,
    }];
    let error = ParseError::new(Position::start(), ParseErrorKind::InvalidInput, "source")
        .with_note("source bytes are not valid UTF-8".to_string());
    ParseTree {
        source: "",
        tokens,
        events: vec![Event::Open(NodeKind::Source), Event::Close(NodeKind::Source)],
        errors: vec![error],
        warnings: Vec::new(),
        telemetry: None,
        debug_events: None,
    }
}

/// Parse a source string into a [`ParseTree`]. This is where lexing
/// and the two-phase recursive-descent parse actually happen;
/// [`parse`] is a thin UTF-8-validating wrapper around it.
#[must_use]
#[instrument(level = "debug", skip(source, registry, config), fields(len = source.len()))]
pub fn parse_string<'src>(source: &'src str, registry: &DecoratorRegistry, config: &ParserConfig) -> ParseTree<'src> {
    let timing_enabled = config.telemetry() == TelemetryLevel::Timing;

    let lex_start = timing_enabled.then(Instant::now);
    let tokens = tokenize(source);
    let lex_duration = lex_start.map(|start| start.elapsed());

    tracing::trace!(token_count = tokens.len(), "lexed source");

    let parse_start = timing_enabled.then(Instant::now);
    let out = crate::parser::run(&tokens, registry);
    let parse_duration = parse_start.map(|start| start.elapsed());

    tracing::trace!(
        event_count = out.events.len(),
        error_count = out.errors.len(),
        warning_count = out.warnings.len(),
        "parsed token stream"
    );

    let telemetry = match config.telemetry() {
        TelemetryLevel::Off => None,
        TelemetryLevel::Basic => Some(TelemetryRecord {
            token_count: tokens.len(),
            event_count: out.events.len(),
            error_count: out.errors.len(),
            warning_count: out.warnings.len(),
            lex_duration: None,
            parse_duration: None,
        }),
        TelemetryLevel::Timing => Some(TelemetryRecord {
            token_count: tokens.len(),
            event_count: out.events.len(),
            error_count: out.errors.len(),
            warning_count: out.warnings.len(),
            lex_duration,
            parse_duration,
        }),
    };

    let debug_events = match config.debug() {
        DebugLevel::Off => None,
        DebugLevel::Paths => Some(build_debug_events(&out.events, &tokens, false)),
        DebugLevel::Detailed => Some(build_debug_events(&out.events, &tokens, true)),
    };

    ParseTree {
        source,
        tokens,
        events: out.events,
        errors: out.errors,
        warnings: out.warnings,
        telemetry,
        debug_events,
    }
}

/// Reconstruct a debug trace from an already-finished event stream: a
/// single forward pass tracking the position of the most recently
/// consumed token, so `Open`/`Close` events (which carry no position
/// of their own in the flat stream) can still be timestamped
/// meaningfully relative to the tokens around them.
fn build_debug_events(events: &[Event], tokens: &[Token], include_tokens: bool) -> Vec<DebugEvent> {
    let mut out = Vec::with_capacity(events.len());
    let mut last_pos = Position::start();
    for event in events {
        match *event {
            Event::Open(kind) => out.push(DebugEvent::NodeOpened { kind, position: last_pos }),
            Event::Close(kind) => out.push(DebugEvent::NodeClosed { kind, position: last_pos }),
            Event::Token(index) => {
                let token = &tokens[index as usize];
                last_pos = token.position;
                if include_tokens {
                    out.push(DebugEvent::TokenConsumed { kind: token.kind, position: last_pos });
                }
            }
            Event::StepEnter | Event::StepExit => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_clean_tree_with_source_brackets() {
        let registry = DecoratorRegistry::new();
        let tree = parse_string("", &registry, &ParserConfig::new());
        assert!(tree.is_clean());
        assert_eq!(tree.events.first(), Some(&Event::Open(NodeKind::Source)));
        assert_eq!(tree.events.last(), Some(&Event::Close(NodeKind::Source)));
    }

    #[test]
    fn invalid_utf8_bytes_fail_soft() {
        let registry = DecoratorRegistry::new();
        let bytes: &[u8] = &[0x66, 0x75, 0x6e, 0xff, 0xfe];
        let tree = parse(bytes, &registry, &ParserConfig::new());
        assert!(!tree.is_clean());
        assert_eq!(tree.errors[0].kind, ParseErrorKind::InvalidInput);
    }

    #[test]
    fn basic_telemetry_records_counts_without_durations() {
        let registry = DecoratorRegistry::new();
        let config = ParserConfig::new().with_telemetry(TelemetryLevel::Basic);
        let tree = parse_string("var x = 1", &registry, &config);
        let telemetry = tree.telemetry.expect("telemetry should be recorded");
        assert_eq!(telemetry.token_count, tree.tokens.len());
        assert!(telemetry.lex_duration.is_none());
    }

    #[test]
    fn timing_telemetry_records_durations() {
        let registry = DecoratorRegistry::new();
        let config = ParserConfig::new().with_telemetry(TelemetryLevel::Timing);
        let tree = parse_string("var x = 1", &registry, &config);
        let telemetry = tree.telemetry.expect("telemetry should be recorded");
        assert!(telemetry.lex_duration.is_some());
        assert!(telemetry.parse_duration.is_some());
    }

    #[test]
    fn debug_paths_records_opens_and_closes_but_no_tokens() {
        let registry = DecoratorRegistry::new();
        let config = ParserConfig::new().with_debug(DebugLevel::Paths);
        let tree = parse_string("var x = 1", &registry, &config);
        let events = tree.debug_events.expect("debug events should be recorded");
        assert!(events.iter().any(|e| matches!(e, DebugEvent::NodeOpened { kind: NodeKind::VarDecl, .. })));
        assert!(!events.iter().any(|e| matches!(e, DebugEvent::TokenConsumed { .. })));
    }

    #[test]
    fn debug_detailed_also_records_tokens() {
        let registry = DecoratorRegistry::new();
        let config = ParserConfig::new().with_debug(DebugLevel::Detailed);
        let tree = parse_string("var x = 1", &registry, &config);
        let events = tree.debug_events.expect("debug events should be recorded");
        assert!(events.iter().any(|e| matches!(e, DebugEvent::TokenConsumed { .. })));
    }

    #[test]
    fn validate_semantics_does_not_mutate_tree() {
        let registry = DecoratorRegistry::new();
        let tree = parse_string("echo hi", &registry, &ParserConfig::new());
        let before = tree.errors.len();
        let _ = tree.validate_semantics(&registry, ExecutionMode::Command);
        assert_eq!(tree.errors.len(), before);
    }
}
