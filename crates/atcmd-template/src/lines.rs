use crate::compile::MatchTemplate;
use crate::error::Result;
use crate::template::Template;
use crate::value::Value;

/// One line of an expected response: the value-extracting template and its
/// match-only probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTemplate {
    source: Vec<u8>,
    template: Template,
    probe: MatchTemplate,
}

impl LineTemplate {
    pub fn parse(line: &[u8]) -> Result<Self> {
        let template = Template::parse_bytes(line)?;
        let probe = MatchTemplate::compile(&template);
        Ok(Self {
            source: line.to_vec(),
            template,
            probe,
        })
    }

    /// True when the probe consumes `body` exactly.
    pub fn matches(&self, body: &[u8]) -> bool {
        self.probe.matches_fully(body)
    }

    /// Second pass: extract the stored values from a body that matched.
    pub fn extract(&self, body: &[u8]) -> Vec<Value> {
        self.template.scan(body)
    }

    /// The template text of this line, without its delimiter.
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    pub fn template(&self) -> &Template {
        &self.template
    }
}

/// A multi-line expected response, split at delimiter occurrences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseTemplate {
    lines: Vec<LineTemplate>,
}

impl ResponseTemplate {
    /// Split `text` into lines at every `delimiter` and compile each.
    ///
    /// A trailing delimiter does not produce an extra empty line, and an
    /// empty text produces no lines at all.
    pub fn parse(text: &str, delimiter: &[u8]) -> Result<Self> {
        let lines = split_lines(text.as_bytes(), delimiter)
            .into_iter()
            .map(LineTemplate::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { lines })
    }

    pub fn lines(&self) -> &[LineTemplate] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

fn split_lines<'a>(text: &'a [u8], delimiter: &[u8]) -> Vec<&'a [u8]> {
    let mut lines = Vec::new();
    if delimiter.is_empty() {
        if !text.is_empty() {
            lines.push(text);
        }
        return lines;
    }

    let mut start = 0;
    let mut i = 0;
    while i + delimiter.len() <= text.len() {
        if &text[i..i + delimiter.len()] == delimiter {
            lines.push(&text[start..i]);
            i += delimiter.len();
            start = i;
        } else {
            i += 1;
        }
    }
    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}
