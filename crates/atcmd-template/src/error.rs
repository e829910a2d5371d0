/// Errors that can occur while parsing templates, formatting commands, or
/// reading captured values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// A `%` at the end of the template with no conversion after it.
    #[error("unterminated directive at byte {position}")]
    UnterminatedDirective { position: usize },

    /// A conversion character this engine does not understand.
    #[error("unknown conversion '%{conversion}' at byte {position}")]
    UnknownConversion { conversion: char, position: usize },

    /// A `%[` scanset without its closing `]`.
    #[error("unterminated scanset at byte {position}")]
    UnterminatedScanset { position: usize },

    /// The template has more directives than arguments were supplied.
    #[error("missing argument for directive {index}")]
    MissingArgument { index: usize },

    /// More arguments were supplied than the template consumes.
    #[error("template uses {used} arguments but {provided} were supplied")]
    ExtraArguments { used: usize, provided: usize },

    /// An argument's kind does not fit its directive.
    #[error("argument {index}: expected {expected}, found {found}")]
    ArgumentType {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    /// The formatted output does not fit the destination buffer.
    #[error("formatted output exceeds buffer capacity of {capacity} bytes")]
    Overflow { capacity: usize },

    /// A capture index past the end of the captured values.
    #[error("capture {index} requested but only {len} values were captured")]
    MissingCapture { index: usize, len: usize },

    /// A captured value cannot be converted to the requested type.
    #[error("capture {index}: expected {expected}, found {found}")]
    Capture {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    /// The number of captures does not match the requested tuple arity.
    #[error("expected {expected} captured values, found {found}")]
    CaptureCount { expected: usize, found: usize },
}

pub type Result<T> = std::result::Result<T, TemplateError>;
