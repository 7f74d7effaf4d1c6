//! Line-oriented regex trace parser.
//!
//! Turns raw log text into the traces the engine consumes. Each event
//! pattern is a regex with a mandatory `(?P<TYPE>...)` capture naming the
//! event type and an optional `(?P<TIME>...)` capture whose raw text is
//! kept as event metadata. Traces are separated by a separator regex, or
//! by blank lines when none is given.

use std::sync::Arc;

use regex::Regex;
use snafu::{ResultExt as _, Snafu, ensure};
use tracing::debug;
use vestigia_core::{Event, EventMeta, EventType, LabelInterner};

const LOG_TARGET: &str = "vestigia::parse";

/// Capture group naming the event type; every pattern must define it.
pub const TYPE_GROUP: &str = "TYPE";
/// Optional capture group holding raw timestamp text.
pub const TIME_GROUP: &str = "TIME";

/// Matches a whole line as the event type; the default when the caller
/// supplies no pattern.
pub const WHOLE_LINE_PATTERN: &str = r"^(?P<TYPE>.+)$";

#[derive(Debug, Snafu)]
pub enum ParseError {
    #[snafu(display("invalid pattern `{pattern}`: {source}"))]
    BadPattern {
        pattern: String,
        source: regex::Error,
    },
    #[snafu(display("pattern `{pattern}` lacks the (?P<{TYPE_GROUP}>...) capture group"))]
    MissingTypeGroup { pattern: String },
    #[snafu(display("{source_name}:{line}: line matches no event pattern"))]
    UnmatchedLine { source_name: String, line: u32 },
}

pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// A compiled parser configuration, reusable across input files.
#[derive(Debug)]
pub struct LineParser {
    event_patterns: Vec<Regex>,
    trace_separator: Option<Regex>,
    ignore_unmatched: bool,
}

impl LineParser {
    /// Compiles the event patterns (falling back to
    /// [`WHOLE_LINE_PATTERN`] when none are given) and the optional trace
    /// separator.
    pub fn new(
        patterns: &[String],
        separator: Option<&str>,
        ignore_unmatched: bool,
    ) -> ParseResult<Self> {
        let patterns: Vec<&str> = if patterns.is_empty() {
            vec![WHOLE_LINE_PATTERN]
        } else {
            patterns.iter().map(String::as_str).collect()
        };

        let mut event_patterns = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let compiled = Regex::new(pattern).context(BadPatternSnafu { pattern })?;
            ensure!(
                compiled
                    .capture_names()
                    .any(|name| name == Some(TYPE_GROUP)),
                MissingTypeGroupSnafu { pattern }
            );
            event_patterns.push(compiled);
        }

        let trace_separator = separator
            .map(|pattern| Regex::new(pattern).context(BadPatternSnafu { pattern }))
            .transpose()?;

        Ok(Self {
            event_patterns,
            trace_separator,
            ignore_unmatched,
        })
    }

    /// Parses one input into traces, interning labels through `interner`
    /// so multiple inputs share event types.
    ///
    /// `source_name` is carried into event metadata and error messages.
    pub fn parse_str(
        &self,
        text: &str,
        source_name: Option<&str>,
        interner: &mut LabelInterner,
    ) -> ParseResult<Vec<Vec<Event>>> {
        let source: Option<Arc<str>> = source_name.map(Arc::from);
        let mut traces: Vec<Vec<Event>> = Vec::new();
        let mut current: Vec<Event> = Vec::new();

        for (index, line) in text.lines().enumerate() {
            let line_no = u32::try_from(index + 1).expect("line count exceeds u32 range");

            let boundary = match &self.trace_separator {
                Some(separator) => separator.is_match(line),
                None => line.trim().is_empty(),
            };
            if boundary {
                if !current.is_empty() {
                    traces.push(std::mem::take(&mut current));
                }
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }

            let captures = self
                .event_patterns
                .iter()
                .find_map(|pattern| pattern.captures(line));
            let Some(captures) = captures else {
                if self.ignore_unmatched {
                    continue;
                }
                return UnmatchedLineSnafu {
                    source_name: source_name.unwrap_or("<input>"),
                    line: line_no,
                }
                .fail();
            };

            let Some(label) = captures.name(TYPE_GROUP) else {
                // The group exists but did not participate in this match;
                // treat like an unmatched line.
                if self.ignore_unmatched {
                    continue;
                }
                return UnmatchedLineSnafu {
                    source_name: source_name.unwrap_or("<input>"),
                    line: line_no,
                }
                .fail();
            };

            let ty: EventType = interner.event_type(label.as_str());
            let meta = EventMeta {
                file: source.clone(),
                line: Some(line_no),
                timestamp: captures.name(TIME_GROUP).map(|m| Arc::from(m.as_str())),
            };
            current.push(Event::with_meta(ty, meta));
        }
        if !current.is_empty() {
            traces.push(current);
        }

        debug!(
            target: LOG_TARGET,
            source = source_name.unwrap_or("<input>"),
            traces = traces.len(),
            types = interner.len(),
            "parsed input"
        );
        Ok(traces)
    }
}
