//! The decorator schema registry: a read-only, process-wide mapping
//! from dotted decorator name to its schema, consulted by the parser
//! (path resolution, argument/type checking) and the semantic
//! validator (pipe/redirect/transport-scope checks).

use std::collections::HashMap;

/// Whether a decorator requires, forbids, or allows a trailing
/// `{ block }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BlockRequirement {
    Required,
    Optional,
    Forbidden,
}

/// What a decorator can appear on the left-hand side of in a `>`/`>>`
/// redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RedirectCapability {
    None,
    OverwriteOnly,
    AppendOnly,
    Both,
}

impl RedirectCapability {
    #[must_use]
    pub fn supports_overwrite(self) -> bool {
        matches!(self, Self::OverwriteOnly | Self::Both)
    }

    #[must_use]
    pub fn supports_append(self) -> bool {
        matches!(self, Self::AppendOnly | Self::Both)
    }
}

/// What a decorator can appear on either side of a `|` pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PipeCapability {
    ProducesStdout,
    ConsumesStdin,
    Neither,
    Both,
}

impl PipeCapability {
    #[must_use]
    pub fn produces_stdout(self) -> bool {
        matches!(self, Self::ProducesStdout | Self::Both)
    }
}

/// Where a decorator is allowed to run relative to a transport switch
/// (e.g. a remote-execution wrapper).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransportScope {
    RootOnly,
    Agnostic,
    RemoteAware,
}

/// The broad category a decorator falls into; mirrors the three
/// shapes value/execution/wrapper decorators take in the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DecoratorKind {
    Value,
    Execution,
    Wrapper,
}

/// A parameter's declared type, used for schema validation of
/// argument values.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParamType {
    String,
    Integer,
    Float,
    Boolean,
    Duration,
    Enum(Vec<String>),
}

/// One declared parameter of a decorator.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParamSchema {
    pub name: String,
    pub ty: ParamType,
    pub required: bool,
    /// Deprecated alias -> canonical value, for enum-typed parameters
    /// whose allowed values have been renamed.
    pub deprecated_aliases: HashMap<String, String>,
    /// Old parameter *names* this parameter used to be known as.
    /// Passing one of these by name resolves to this parameter with a
    /// deprecation warning rather than an "unknown parameter" error.
    pub deprecated_names: Vec<String>,
}

/// The read-only schema for one registered decorator name.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecoratorSchema {
    pub name: String,
    /// Ordered: positional arguments fill these slots in order,
    /// skipping any already filled by a named argument.
    pub parameters: Vec<ParamSchema>,
    /// The parameter reachable via dot syntax, `@name.PROP` == `@name(PROP)`.
    pub primary_parameter: Option<String>,
    pub block: BlockRequirement,
    pub redirect: RedirectCapability,
    pub pipe: PipeCapability,
    pub transport: TransportScope,
    pub switches_transport: bool,
    pub kind: DecoratorKind,
}

impl DecoratorSchema {
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParamSchema> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Resolve `name` to a parameter, accepting a deprecated alias
    /// name in addition to the canonical one. Returns the matched
    /// parameter plus whether `name` was a deprecated alias (the
    /// caller should warn and translate in that case).
    #[must_use]
    pub fn resolve_param(&self, name: &str) -> Option<(&ParamSchema, bool)> {
        if let Some(param) = self.param(name) {
            return Some((param, false));
        }
        self.parameters
            .iter()
            .find(|p| p.deprecated_names.iter().any(|alias| alias == name))
            .map(|p| (p, true))
    }
}

/// The maximum number of dot-separated identifier segments the parser
/// will scan while resolving a decorator path, per the design note
/// capping pathological lookahead.
pub const MAX_PATH_SEGMENTS: usize = 10;

/// A process-wide, read-only snapshot of registered decorator
/// schemas. Lookups are O(1) on the full dotted name; prefix
/// resolution during parsing is O(depth), bounded by
/// [`MAX_PATH_SEGMENTS`].
#[derive(Debug, Clone, Default)]
pub struct DecoratorRegistry {
    schemas: HashMap<String, DecoratorSchema>,
    /// Sorted registered names, used both for the greedy-longest-prefix
    /// walk and for alphabetically sorted suggestion lists.
    sorted_names: Vec<String>,
}

impl DecoratorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: DecoratorSchema) {
        let name = schema.name.clone();
        self.schemas.insert(name.clone(), schema);
        if let Err(idx) = self.sorted_names.binary_search(&name) {
            self.sorted_names.insert(idx, name);
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DecoratorSchema> {
        self.schemas.get(name)
    }

    /// True if `prefix` is a registered name or a proper prefix
    /// (dot-bounded) of one, used to decide whether the greedy walk
    /// should keep consuming another `.IDENT` segment.
    #[must_use]
    pub fn is_registered_or_prefix(&self, prefix: &str) -> bool {
        if self.schemas.contains_key(prefix) {
            return true;
        }
        let with_dot = format!("{prefix}.");
        self.sorted_names
            .binary_search(&with_dot)
            .is_ok_or_next_starts_with(&self.sorted_names, &with_dot)
    }

    /// Greedy-longest-match resolution over `segments` (already split
    /// on `.`). Returns the number of segments consumed as the
    /// decorator name, so the caller can treat any immediately
    /// following single segment as the primary-parameter dot-shortcut.
    #[must_use]
    pub fn resolve_longest_prefix(&self, segments: &[&str]) -> Option<usize> {
        let limit = segments.len().min(MAX_PATH_SEGMENTS);
        let mut best = None;
        let mut acc = String::new();
        for (i, seg) in segments.iter().take(limit).enumerate() {
            if i > 0 {
                acc.push('.');
            }
            acc.push_str(seg);
            if self.schemas.contains_key(&acc) {
                best = Some(i + 1);
            }
        }
        best
    }

    /// Alphabetically sorted suggestion list of all registered
    /// parameter names for `decorator`, used in "unknown parameter"
    /// diagnostics.
    #[must_use]
    pub fn valid_parameter_names(&self, decorator: &str) -> Vec<String> {
        let Some(schema) = self.get(decorator) else {
            return Vec::new();
        };
        let mut names: Vec<String> = schema.parameters.iter().map(|p| p.name.clone()).collect();
        names.sort();
        names
    }
}

/// Tiny helper trait used only to make [`DecoratorRegistry::is_registered_or_prefix`]
/// read linearly; not part of the public surface.
trait PrefixSearch {
    fn is_ok_or_next_starts_with(self, names: &[String], with_dot: &str) -> bool;
}

impl PrefixSearch for Result<usize, usize> {
    fn is_ok_or_next_starts_with(self, names: &[String], with_dot: &str) -> bool {
        match self {
            Ok(_) => true,
            Err(idx) => names.get(idx).is_some_and(|n| n.starts_with(with_dot)),
        }
    }
}
