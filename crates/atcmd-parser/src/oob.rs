use tracing::debug;

use crate::parser::AtParser;

/// Callback run when an unsolicited line starts with a registered prefix.
///
/// The handler gets the parser itself and may send commands or receive
/// the rest of the notification. Out-of-band dispatch is suppressed while
/// it runs.
pub type OobHandler<C, K> = Box<dyn FnMut(&mut AtParser<C, K>)>;

struct OobEntry<C, K> {
    prefix: Vec<u8>,
    handler: OobHandler<C, K>,
}

/// Prefix-to-handler registrations, scanned in insertion order.
///
/// Entries are never removed or de-duplicated. A prefix fires only when the
/// accumulated line equals it exactly, so the empty prefix never fires.
pub struct OobRegistry<C, K> {
    entries: Vec<OobEntry<C, K>>,
}

impl<C, K> OobRegistry<C, K> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn register(&mut self, prefix: Vec<u8>, handler: OobHandler<C, K>) {
        self.entries.push(OobEntry { prefix, handler });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered prefixes in insertion order.
    pub fn prefixes(&self) -> impl Iterator<Item = &[u8]> {
        self.entries.iter().map(|e| e.prefix.as_slice())
    }

    /// Whether any entry's prefix equals `line` exactly.
    pub fn fires_on(&self, line: &[u8]) -> bool {
        !line.is_empty() && self.entries.iter().any(|e| e.prefix == line)
    }

    /// Run every handler whose prefix equals `line`, in insertion order.
    /// Returns how many ran.
    pub(crate) fn dispatch(&mut self, line: &[u8], parser: &mut AtParser<C, K>) -> usize {
        let mut fired = 0;
        for entry in self.entries.iter_mut().filter(|e| e.prefix == line) {
            debug!(prefix = %line.escape_ascii(), "OOB dispatch");
            (entry.handler)(parser);
            fired += 1;
        }
        fired
    }

    /// Append entries registered elsewhere, keeping their order after ours.
    pub(crate) fn append(&mut self, mut other: OobRegistry<C, K>) {
        self.entries.append(&mut other.entries);
    }
}

impl<C, K> Default for OobRegistry<C, K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, K> std::fmt::Debug for OobRegistry<C, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.prefixes().map(|p| p.escape_ascii().to_string()))
            .finish()
    }
}
