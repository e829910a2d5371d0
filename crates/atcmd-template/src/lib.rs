//! Command formatting and response templates for AT command engines.
//!
//! Outgoing commands are rendered printf style from a template and a slice
//! of typed [`Value`]s. Incoming responses are described scanf style:
//! - [`Template`] parses a scan template into literals, whitespace and
//!   capture directives
//! - [`MatchTemplate`] is the match-only form, used to decide whether a line
//!   fits a template before any value is extracted
//! - [`ResponseTemplate`] splits a multi-line response at the delimiter
//!
//! Captured values come back as [`Captures`] and convert into tuples via
//! [`FromCaptures`].

pub mod compile;
pub mod error;
pub mod format;
pub mod lines;
pub mod template;
pub mod value;

pub use compile::MatchTemplate;
pub use error::{Result, TemplateError};
pub use format::{format_bytes, format_into, FormatSink};
pub use lines::{LineTemplate, ResponseTemplate};
pub use template::{ByteSet, Conversion, Directive, Segment, Template};
pub use value::{Captures, FromCaptures, FromValue, Value};
