#![no_main]

use stepshell_syntax::{DecoratorRegistry, Event, NodeKind, ParserConfig, Token};

#[macro_use]
extern crate libfuzzer_sys;

fuzz_target!(|data: &[u8]| {
    let registry = DecoratorRegistry::new();
    let config = ParserConfig::new();

    // Determinism (§8): the same bytes against the same registry
    // snapshot must produce a field-by-field identical tree.
    let tree_a = stepshell_syntax::parse(data, &registry, &config);
    let tree_b = stepshell_syntax::parse(data, &registry, &config);
    assert_eq!(tree_a.tokens, tree_b.tokens);
    assert_eq!(tree_a.events, tree_b.events);
    assert_eq!(tree_a.errors, tree_b.errors);

    check_event_balance(&tree_a.events);
    check_memory_safety(&tree_a.events, &tree_a.tokens, data.len());
    check_bounded_growth(&tree_a.events, &tree_a.tokens, data.len());
});

/// I1, I4, I5: LIFO `Open`/`Close` nesting with no cross-close, the
/// outermost pair always `Source`, and `StepEnter`/`StepExit` forming
/// a balanced, non-nested sequence.
fn check_event_balance(events: &[Event]) {
    let mut stack: Vec<NodeKind> = Vec::new();
    let mut step_open = false;

    for event in events {
        match *event {
            Event::Open(kind) => stack.push(kind),
            Event::Close(kind) => {
                let opened = stack.pop().expect("Close without a matching Open");
                assert_eq!(opened, kind, "Open/Close kind mismatch");
            }
            Event::StepEnter => {
                assert!(!step_open, "StepEnter/StepExit must not nest");
                step_open = true;
            }
            Event::StepExit => {
                assert!(step_open, "StepExit without a matching StepEnter");
                step_open = false;
            }
            Event::Token(_) => {}
        }
    }

    assert!(stack.is_empty(), "unbalanced Open/Close at end of stream");
    assert!(!step_open, "unbalanced StepEnter/StepExit at end of stream");
    assert_eq!(events.first(), Some(&Event::Open(NodeKind::Source)), "outermost pair must open Source");
    assert_eq!(events.last(), Some(&Event::Close(NodeKind::Source)), "outermost pair must close Source");
}

/// I2, I3: every `Token` payload is a valid, non-decreasing index into
/// `tokens`; every position has `line >= 1`, `column >= 1`, `offset <=
/// source length`; offsets/lines/columns are monotonically
/// non-decreasing across the stream.
fn check_memory_safety(events: &[Event], tokens: &[Token], source_len: usize) {
    let mut last_index = 0u32;
    let mut last_offset = 0u32;
    let mut last_line = 1u32;
    let mut last_column = 1u32;

    for event in events {
        let Event::Token(index) = *event else { continue };
        assert!((index as usize) < tokens.len(), "token index out of bounds");
        assert!(index >= last_index, "token indices must be non-decreasing");
        last_index = index;

        let position = tokens[index as usize].position;
        assert!(position.line >= 1);
        assert!(position.column >= 1);
        assert!(position.offset as usize <= source_len);
        assert!(position.offset >= last_offset, "offsets must be non-decreasing");
        assert!(position.line >= last_line, "lines must never decrease");
        if position.line == last_line {
            assert!(position.column >= last_column, "columns must not decrease within a line");
        }
        last_offset = position.offset;
        last_line = position.line;
        last_column = position.column;
    }
}

/// `|events| + |tokens| <= 10*|source| + 1024`.
fn check_bounded_growth(events: &[Event], tokens: &[Token], source_len: usize) {
    assert!(
        events.len() + tokens.len() <= 10 * source_len + 1024,
        "event/token growth exceeded the O(N) bound"
    );
}
