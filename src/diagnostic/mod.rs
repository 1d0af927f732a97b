pub mod json;
pub mod text;

use crate::ast::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Label {
    pub span: Span,
    pub message: String,
}

/// A user-facing error report. `source` is the text spans point into.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<&'static str>,
    pub message: String,
    pub label: Option<Label>,
    pub notes: Vec<String>,
    pub suggestion: Option<String>,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            code: None,
            message: message.into(),
            label: None,
            notes: Vec::new(),
            suggestion: None,
            source: None,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_span(mut self, span: Span, label: impl Into<String>) -> Self {
        self.label = Some(Label { span, message: label.into() });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

// ---- Conversions from the error types ----

impl From<&crate::lexer::LexError> for Diagnostic {
    fn from(e: &crate::lexer::LexError) -> Self {
        let span = Span { start: e.position, end: e.position + e.snippet.len().max(1) };
        Diagnostic::error(format!("unexpected input '{}'", e.snippet))
            .with_code("L001")
            .with_span(span, "here")
            .with_suggestion(e.suggestion.clone())
    }
}

impl From<&crate::parser::ParseError> for Diagnostic {
    fn from(e: &crate::parser::ParseError) -> Self {
        Diagnostic::error(&e.message).with_code(e.code).with_span(e.span, "here")
    }
}

impl From<&crate::compiler::CompileError> for Diagnostic {
    fn from(e: &crate::compiler::CompileError) -> Self {
        use crate::compiler::CompileError;
        let (code, note) = match e {
            CompileError::Unsupported { .. } => ("C001", Some("arrow functions are only valid as call arguments to the host")),
            CompileError::Malformed { .. } => ("C002", None),
            CompileError::PoolOverflow { .. } => ("C003", Some("split the expression into smaller pieces")),
            CompileError::InvalidBytecode(_) => ("C004", None),
        };
        let d = Diagnostic::error(e.to_string()).with_code(code);
        match note {
            Some(n) => d.with_note(n),
            None => d,
        }
    }
}

impl From<&crate::vm::VmError> for Diagnostic {
    fn from(e: &crate::vm::VmError) -> Self {
        use crate::vm::VmError;
        let d = Diagnostic::error(e.to_string()).with_code("R001");
        match e {
            VmError::UndefinedVariable { name } => d.with_suggestion(format!("bind it with --var {name}=<json>")),
            VmError::DivisionByZero { .. } => d.with_note("integer and float division by zero are both errors"),
            _ => d,
        }
    }
}

impl From<&crate::Error> for Diagnostic {
    fn from(e: &crate::Error) -> Self {
        match e {
            crate::Error::Lex(e) => e.into(),
            crate::Error::Parse(e) => e.into(),
            crate::Error::Compile(e) => e.into(),
            crate::Error::Vm(e) => e.into(),
            crate::Error::Json(e) => Diagnostic::error(format!("invalid JSON: {e}")).with_code("J001"),
        }
    }
}
