//! The parser context: owns the token cursor and the event sink.
//!
//! Kept as a separate module to limit the API surface the actual
//! parsing functions see, the same split the retrieved teacher crate
//! uses for its own `Context`. Where the teacher's context pushes
//! into a `rowan::GreenNodeBuilder`, this one pushes into a flat
//! `Vec<Event>` directly, since the data model here has no
//! pointer-based tree at all.

use crate::event::{Checkpoint, Event, NodeKind};
use crate::token::{Position, Token, TokenKind};

use super::{ParseError, ParseErrorKind, ParseWarning};

/// After this many diagnostics recorded at the same source position,
/// the next one force-eats a token regardless of its own eat flag.
/// The single escape hatch against infinite loops or unbounded
/// recursion in error recovery.
const MAX_SIMILAR_ERROR_COUNT: usize = 10;

/// A parser context for parser functions. Cannot be constructed
/// directly; obtained only via [`super::Parser`].
pub struct Context<'src> {
    tokens: &'src [Token<'src>],
    pos: usize,
    events: Vec<Event>,
    open_stack: Vec<NodeKind>,
    errors: Vec<ParseError>,
    warnings: Vec<ParseWarning>,
    step_depth: u32,
}

/// The result of running a context to completion.
pub struct ContextOutput {
    pub events: Vec<Event>,
    pub errors: Vec<ParseError>,
    pub warnings: Vec<ParseWarning>,
}

impl<'src> Context<'src> {
    pub(crate) fn new(tokens: &'src [Token<'src>]) -> Self {
        Self {
            tokens,
            pos: 0,
            events: Vec::with_capacity(tokens.len() * 2 + 4),
            open_stack: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            step_depth: 0,
        }
    }

    pub(crate) fn finish(self) -> ContextOutput {
        debug_assert!(self.open_stack.is_empty(), "unbalanced Open/Close at end of parse");
        debug_assert_eq!(self.step_depth, 0, "unbalanced StepEnter/StepExit at end of parse");
        ContextOutput {
            events: self.events,
            errors: self.errors,
            warnings: self.warnings,
        }
    }

    /// The kind of the current significant token. `COMMENT` is
    /// transparently skipped; it is never surfaced here and never
    /// referenced by an `Event::Token`. Always returns `Some` except
    /// past the trailing `EOF` sentinel, which callers treat as the
    /// natural end of input (`token() == TokenKind::Eof`).
    pub fn token(&mut self) -> TokenKind {
        self.skip_comments();
        self.tokens[self.pos].kind
    }

    /// Lookahead `n` significant tokens ahead of the current one
    /// (`nth(0)` is the same as `token()`). Bounded lookahead: callers
    /// should never need more than ~10.
    pub fn nth(&mut self, n: usize) -> TokenKind {
        self.skip_comments();
        let mut idx = self.pos;
        let mut remaining = n;
        loop {
            if self.tokens[idx].kind == TokenKind::Eof {
                return TokenKind::Eof;
            }
            if remaining == 0 {
                return self.tokens[idx].kind;
            }
            idx += 1;
            while self.tokens[idx].kind == TokenKind::Comment {
                idx += 1;
            }
            remaining -= 1;
        }
    }

    /// Like [`Self::nth`] but returns the token's `has_space_before`
    /// flag, used by the `when` pattern grammar to disambiguate a bare
    /// `r` identifier from the `r"regex"` pattern form: the latter
    /// requires the string to immediately follow `r` with no space.
    pub fn nth_has_space_before(&mut self, n: usize) -> bool {
        self.skip_comments();
        let mut idx = self.pos;
        let mut remaining = n;
        loop {
            if self.tokens[idx].kind == TokenKind::Eof {
                return self.tokens[idx].has_space_before;
            }
            if remaining == 0 {
                return self.tokens[idx].has_space_before;
            }
            idx += 1;
            while self.tokens[idx].kind == TokenKind::Comment {
                idx += 1;
            }
            remaining -= 1;
        }
    }

    /// Whether the current significant token has a preceding space,
    /// the sole signal used to delimit shell arguments.
    pub fn current_has_space_before(&mut self) -> bool {
        self.skip_comments();
        self.tokens[self.pos].has_space_before
    }

    pub fn current_text(&mut self) -> &'src str {
        self.skip_comments();
        self.tokens[self.pos].text
    }

    /// Like [`Self::nth`] but returns the token's text instead of its
    /// kind, used by decorator path resolution to peek identifier
    /// segments before committing to consuming them.
    pub fn nth_text(&mut self, n: usize) -> &'src str {
        self.skip_comments();
        let mut idx = self.pos;
        let mut remaining = n;
        loop {
            if self.tokens[idx].kind == TokenKind::Eof {
                return self.tokens[idx].text;
            }
            if remaining == 0 {
                return self.tokens[idx].text;
            }
            idx += 1;
            while self.tokens[idx].kind == TokenKind::Comment {
                idx += 1;
            }
            remaining -= 1;
        }
    }

    pub fn current_position(&mut self) -> Position {
        self.skip_comments();
        self.tokens[self.pos].position
    }

    /// The index of the current significant token into the full
    /// token slice the whole parse was built from.
    pub fn current_index(&mut self) -> u32 {
        self.skip_comments();
        self.pos as u32
    }

    fn skip_comments(&mut self) {
        while self.tokens[self.pos].kind == TokenKind::Comment {
            self.pos += 1;
        }
    }

    /// Consume the current token, emitting `Event::Token(index)`.
    /// Returns the consumed index.
    pub fn eat(&mut self) -> u32 {
        self.skip_comments();
        let idx = self.pos as u32;
        self.events.push(Event::Token(idx));
        if self.tokens[self.pos].kind != TokenKind::Eof {
            self.pos += 1;
        }
        idx
    }

    /// Start a new tree node.
    pub fn start_node(&mut self, kind: NodeKind) {
        self.events.push(Event::Open(kind));
        self.open_stack.push(kind);
    }

    /// Finish the most recently opened node. Panics (debug-only) on
    /// a mismatched kind: a bug in the parser, not a recoverable
    /// input error.
    pub fn finish_node(&mut self, kind: NodeKind) {
        let opened = self.open_stack.pop();
        debug_assert_eq!(opened, Some(kind), "Open/Close kind mismatch");
        self.events.push(Event::Close(kind));
    }

    /// Snapshot the current end of the event stream, to later retcon a
    /// node around everything emitted since via [`Self::start_node_at`].
    pub fn checkpoint(&mut self) -> Checkpoint {
        Checkpoint(self.events.len())
    }

    /// Open a node at a previously taken checkpoint, wrapping
    /// everything emitted since. Used to build left-associative
    /// binary/postfix/call/index expressions without left recursion.
    pub fn start_node_at(&mut self, checkpoint: Checkpoint, kind: NodeKind) {
        self.events.insert(checkpoint.0, Event::Open(kind));
        // The corresponding Close is pushed normally via finish_node;
        // track it on the open stack at the position it will be
        // popped (LIFO), which holds because nothing already open at
        // the checkpoint can close before this new wrapper does.
        self.open_stack.push(kind);
    }

    /// A checkpoint positioned just before the most recently completed
    /// node (an `Open..Close` pair, or a lone `Token`) at the current
    /// nesting depth. Used to retroactively wrap an already-emitted
    /// `Identifier` into a `FunctionCall`/similar without re-parsing it;
    /// the counterpart to [`Self::start_node_at`] for call sites that
    /// only decide they need a wrapper *after* seeing what follows.
    pub fn checkpoint_before_last_node(&mut self) -> Checkpoint {
        let mut idx = self.events.len();
        match self.events.last() {
            Some(Event::Close(_)) => {
                let mut depth = 0i32;
                loop {
                    idx -= 1;
                    match self.events[idx] {
                        Event::Close(_) => depth += 1,
                        Event::Open(_) => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                }
            }
            Some(Event::Token(_)) => idx -= 1,
            _ => {}
        }
        Checkpoint(idx)
    }

    /// Re-emit a reference to an already-consumed token, for the
    /// literal segments of an interpolated string: the segment
    /// boundaries live in the token's own text (recovered by
    /// re-running [`crate::interpolation::split_segments`] on it), not
    /// in the event payload, so every `StringPart` just points back at
    /// the one real `String` token that was eaten for the whole
    /// literal.
    pub fn emit_synthetic_token_ref(&mut self, token_index: u32) {
        self.events.push(Event::Token(token_index));
    }

    /// Re-emit a reference to the same already-consumed string token
    /// for an embedded decorator segment. `name`/`primary_param` are
    /// not stored in the event payload (the flat stream carries no
    /// string data); a consumer recovers them the same way this
    /// function's caller did, by re-running [`crate::interpolation::
    /// split_segments`] on the token's text.
    pub fn emit_synthetic_decorator_ref(&mut self, token_index: u32, _name: &str, _primary_param: Option<&str>) {
        self.events.push(Event::Token(token_index));
    }

    /// Raw step-boundary primitive. Grammar routines should prefer
    /// [`Self::maybe_step_enter`]/[`Self::maybe_step_exit`], which stay
    /// safe when the routine might run lexically nested inside another
    /// step; call this directly only where the caller already knows no
    /// step can possibly be open.
    pub fn step_enter(&mut self) {
        debug_assert_eq!(self.step_depth, 0, "StepEnter/StepExit do not nest");
        self.step_depth += 1;
        self.events.push(Event::StepEnter);
    }

    pub fn step_exit(&mut self) {
        debug_assert_eq!(self.step_depth, 1, "StepExit without matching StepEnter");
        self.step_depth -= 1;
        self.events.push(Event::StepExit);
    }

    /// Open a step boundary unless one is already open, e.g. because
    /// this executable unit is lexically nested inside another one (a
    /// decorator's block embedded as a plain shell argument, rather
    /// than parsed at statement position, can contain further
    /// statements of its own). Per §3/I5, steps never nest: whichever
    /// call is outermost claims the boundary, and everything nested
    /// inside it — however deep — is just part of that same step.
    /// Returns whether this call is the one that opened it; pair with
    /// [`Self::maybe_step_exit`].
    pub fn maybe_step_enter(&mut self) -> bool {
        if self.step_depth == 0 {
            self.step_enter();
            true
        } else {
            false
        }
    }

    /// Close the step opened by the matching [`Self::maybe_step_enter`]
    /// call, if `opened` (the value it returned) is true.
    pub fn maybe_step_exit(&mut self, opened: bool) {
        if opened {
            self.step_exit();
        }
    }

    /// Record a diagnostic without touching the token cursor.
    pub fn add_error(&mut self, kind: ParseErrorKind, context: &'static str) {
        self.record_error(kind, context, false);
    }

    /// Record a diagnostic and eat the current token, guaranteeing
    /// progress. This is the routine recovery routines should prefer.
    pub fn eat_error(&mut self, kind: ParseErrorKind, context: &'static str) {
        self.record_error(kind, context, true);
    }

    fn record_error(&mut self, kind: ParseErrorKind, context: &'static str, eat: bool) {
        let position = self.current_position();

        let same_position_count = self
            .errors
            .iter()
            .rev()
            .take_while(|e| e.position == position)
            .count();

        self.errors.push(ParseError::new(position, kind, context));

        let force_eat = eat || (same_position_count + 1) >= MAX_SIMILAR_ERROR_COUNT;
        if force_eat && self.tokens[self.pos].kind != TokenKind::Eof {
            self.eat();
        }
    }

    /// Mutable access to the most recently recorded error, for
    /// attaching `expected`/`got`/`suggestion`/`example`/`note` before
    /// the caller moves on. Panics if called with no prior error;
    /// only ever used immediately after `add_error`/`eat_error`.
    pub fn last_error_mut(&mut self) -> &mut ParseError {
        self.errors.last_mut().expect("no error recorded yet")
    }

    pub fn warn(&mut self, message: impl Into<String>, note: Option<String>) {
        let position = self.current_position();
        self.warnings.push(ParseWarning {
            position,
            message: message.into(),
            note,
        });
    }

    /// Advance to the nearest sync token (`}`, `;`, `fun`, `EOF`),
    /// then consume a single trailing separator (`;` or `}`) if
    /// present. The belt-and-braces companion to per-routine mandatory
    /// progress: callers use this after a subparser reports failure.
    pub fn recover_to_sync_token(&mut self) {
        loop {
            match self.token() {
                TokenKind::RBrace | TokenKind::Semicolon | TokenKind::Fun | TokenKind::Eof => break,
                _ => {
                    self.eat();
                }
            }
        }
        if matches!(self.token(), TokenKind::Semicolon) {
            self.eat();
        }
    }

    /// If the cursor has not advanced past `start`, force-consume one
    /// token. The statement-loop-level belt-and-braces progress
    /// guarantee: every loop iteration must advance, full stop.
    pub fn ensure_progress(&mut self, start: u32) {
        if self.current_index() <= start && self.token() != TokenKind::Eof {
            self.eat();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tokenize;

    #[test]
    fn checkpoint_wraps_retroactively() {
        let owned = tokenize("1 + 2");
        let mut ctx = Context::new(&owned);
        let cp = ctx.checkpoint();
        ctx.eat(); // 1
        ctx.eat(); // +
        ctx.eat(); // 2
        ctx.start_node_at(cp, NodeKind::BinaryExpr);
        ctx.finish_node(NodeKind::BinaryExpr);
        let out = ctx.finish();
        assert_eq!(out.events[0], Event::Open(NodeKind::BinaryExpr));
        assert_eq!(out.events.last(), Some(&Event::Close(NodeKind::BinaryExpr)));
    }

    #[test]
    fn escape_hatch_force_eats_after_repeated_errors_at_same_position() {
        let owned = tokenize("@@@@@@@@@@@@ var");
        let mut ctx = Context::new(&owned);
        for _ in 0..MAX_SIMILAR_ERROR_COUNT + 2 {
            if ctx.token() == TokenKind::Eof {
                break;
            }
            ctx.add_error(ParseErrorKind::InvalidInput, "test");
        }
        // Must have made progress rather than looping forever.
        assert!(ctx.current_index() > 0);
    }
}
