//! The flat event stream: the parser's only tree representation.
//!
//! A typed AST would pull ownership and lifetimes into the public
//! surface. Keeping the tree as a contiguous `Vec<Event>` means
//! consumers can skip whole subtrees by counting `Open`/`Close`,
//! compute stable plan hashes by streaming events, and tolerate
//! errors trivially by simply emitting fewer events — there is no
//! pointer structure to repair.

/// A closed enumeration of tree-node kinds. Each has a stable
/// discriminant: tests and downstream plan-hashing key off the
/// numeric code, not the variant name's position in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum NodeKind {
    Source = 0,
    Function = 1,
    ParamList = 2,
    Block = 3,
    Param = 4,
    TypeAnnotation = 5,
    DefaultValue = 6,
    ShellCommand = 7,
    ShellArg = 8,
    If = 9,
    Else = 10,
    For = 11,
    Range = 12,
    Decorator = 13,
    VarDecl = 14,
    Assignment = 15,
    Literal = 16,
    Identifier = 17,
    BinaryExpr = 18,
    UnaryExpr = 19,
    PrefixExpr = 20,
    PostfixExpr = 21,
    InterpolatedString = 22,
    StringPart = 23,
    Try = 24,
    Catch = 25,
    Finally = 26,
    When = 27,
    WhenArm = 28,
    PatternLiteral = 29,
    PatternElse = 30,
    PatternRegex = 31,
    PatternRange = 32,
    PatternOr = 33,
    Redirect = 34,
    RedirectTarget = 35,
    EnumDecl = 36,
    EnumMember = 37,
    QualifiedRef = 38,
    FunctionCall = 39,
}

/// One entry in the flat event stream. `Open`/`Close`/`Token` carry a
/// single 32-bit payload (a [`NodeKind`] or a token index); `StepEnter`/
/// `StepExit` carry none and never nest with each other, though they
/// may bracket nested `Open`/`Close` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Event {
    Open(NodeKind),
    Close(NodeKind),
    Token(u32),
    StepEnter,
    StepExit,
}

/// An opaque marker for retroactive node wrapping (see
/// [`crate::parser::context::Context::checkpoint`]). Just an index
/// into the event stream at the moment it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(pub(crate) usize);
