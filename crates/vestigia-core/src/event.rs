use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// The type of an observed event.
///
/// Two event types are equal iff their kind and label agree. The two
/// sentinel kinds are synthetic: they never come from parsed input and
/// anchor every trace at its start and end. The derived `Ord` places
/// sentinels before domain labels, which keeps candidate-pair iteration
/// in the miners deterministic.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum EventType {
    /// Synthetic source shared by every trace.
    Initial,
    /// Synthetic sink shared by every trace.
    Terminal,
    /// A domain event, tagged by its label.
    Label(Arc<str>),
}

impl EventType {
    /// A domain event type with the given label.
    ///
    /// Callers parsing large logs should go through a [`LabelInterner`]
    /// instead so repeated labels share one allocation.
    pub fn label(label: impl AsRef<str>) -> Self {
        EventType::Label(Arc::from(label.as_ref()))
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, EventType::Initial | EventType::Terminal)
    }

    pub fn is_initial(&self) -> bool {
        matches!(self, EventType::Initial)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EventType::Terminal)
    }

    /// The label text for domain events, `None` for sentinels.
    pub fn as_label(&self) -> Option<&str> {
        match self {
            EventType::Label(label) => Some(label),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Initial => f.write_str("INITIAL"),
            EventType::Terminal => f.write_str("TERMINAL"),
            EventType::Label(label) => f.write_str(label),
        }
    }
}

/// Where an event occurrence came from.
///
/// Opaque to the engine; carried along so counter-examples and partition
/// membership dumps can point back at the input.
#[derive(Clone, Default, PartialEq, Eq, Hash, Debug)]
pub struct EventMeta {
    /// Source file the line was read from, if any.
    pub file: Option<Arc<str>>,
    /// 1-based line number within the source.
    pub line: Option<u32>,
    /// Raw timestamp text captured by the parser, if any.
    pub timestamp: Option<Arc<str>>,
}

/// A single occurrence of an [`EventType`] within one trace.
///
/// Identity is positional: the same type may occur many times and each
/// occurrence is a distinct event.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Event {
    ty: EventType,
    meta: EventMeta,
}

impl Event {
    pub fn new(ty: EventType) -> Self {
        Self {
            ty,
            meta: EventMeta::default(),
        }
    }

    pub fn with_meta(ty: EventType, meta: EventMeta) -> Self {
        Self { ty, meta }
    }

    pub fn ty(&self) -> &EventType {
        &self.ty
    }

    pub fn meta(&self) -> &EventMeta {
        &self.meta
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.meta.file, self.meta.line) {
            (Some(file), Some(line)) => write!(f, "{} ({file}:{line})", self.ty),
            (None, Some(line)) => write!(f, "{} (line {line})", self.ty),
            _ => self.ty.fmt(f),
        }
    }
}

/// An ordering relation label on transitions.
///
/// The distinguished *time* relation (`"t"`) orders events within a
/// totally-ordered trace; auxiliary relations are allowed by the data
/// model and kept apart by label.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Relation(Arc<str>);

const TIME_RELATION: &str = "t";

impl Relation {
    pub fn new(label: impl AsRef<str>) -> Self {
        Relation(Arc::from(label.as_ref()))
    }

    /// The default total-order time relation.
    pub fn time() -> Self {
        Relation::new(TIME_RELATION)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Relation {
    fn default() -> Self {
        Relation::time()
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deduplicates label allocations across a whole log.
///
/// Parsing a million lines over a dozen event types should allocate a
/// dozen labels.
#[derive(Default, Debug)]
pub struct LabelInterner {
    labels: HashSet<Arc<str>>,
}

impl LabelInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared allocation for `label`, creating it on first use.
    pub fn intern(&mut self, label: &str) -> Arc<str> {
        if let Some(existing) = self.labels.get(label) {
            return existing.clone();
        }
        let label: Arc<str> = Arc::from(label);
        self.labels.insert(label.clone());
        label
    }

    /// An interned domain [`EventType`] for `label`.
    pub fn event_type(&mut self, label: &str) -> EventType {
        EventType::Label(self.intern(label))
    }

    /// Number of distinct labels seen so far.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
