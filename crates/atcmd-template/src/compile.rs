use crate::error::Result;
use crate::template::{Directive, Segment, Template};
use crate::value::Value;

/// Match-only form of a template.
///
/// Every directive discards its value and a consumed-count marker is
/// appended, so running it answers one question: did the template shape
/// account for every input byte? Values are only extracted from the
/// original template once this says yes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchTemplate {
    template: Template,
}

impl MatchTemplate {
    pub fn compile(template: &Template) -> Self {
        let mut segments = template.discarding().segments().to_vec();
        segments.push(Segment::Directive(Directive::consumed_marker()));
        Self {
            template: Template::from_segments(segments),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(Self::compile(&Template::parse(text)?))
    }

    /// Bytes consumed before the marker, or `None` if the template stopped
    /// short of it.
    pub fn consumed(&self, input: &[u8]) -> Option<usize> {
        match self.template.scan(input).pop() {
            Some(Value::Uint(n)) => usize::try_from(n).ok(),
            _ => None,
        }
    }

    /// True when the template consumes `input` exactly.
    pub fn matches_fully(&self, input: &[u8]) -> bool {
        self.consumed(input) == Some(input.len())
    }

    /// The compiled segments, ending in the consumed-count marker.
    pub fn template(&self) -> &Template {
        &self.template
    }
}
