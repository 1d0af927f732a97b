use std::fmt::Write;

use super::Diagnostic;
use crate::ast::SourceMap;

/// Human-readable rendering with a source excerpt and caret underline.
/// `color` adds ANSI styling for terminals.
pub fn render(d: &Diagnostic, color: bool) -> String {
    let paint = |code: &str, s: &str| if color { format!("\x1b[{code}m{s}\x1b[0m") } else { s.to_string() };

    let mut out = String::new();
    let severity = d.severity.as_str();
    let head = match d.code {
        Some(code) => paint("1;31", &format!("{severity}[{code}]")),
        None => paint("1;31", severity),
    };
    let _ = writeln!(out, "{head}: {}", paint("1", &d.message));

    if let (Some(label), Some(source)) = (&d.label, &d.source) {
        let map = SourceMap::new(source);
        let (line, col) = map.lookup(label.span.start);
        let text = map.line_text(source, line);
        let gutter = " ".repeat(line.to_string().len());
        let bar = paint("36", "|");

        let _ = writeln!(out, "{gutter}{} {line}:{col}", paint("36", "-->"));
        let _ = writeln!(out, "{gutter} {bar}");
        let _ = writeln!(out, "{} {bar} {text}", paint("36", &line.to_string()));
        // Underline stays on the first line of a multi-line span.
        let width = (label.span.end.saturating_sub(label.span.start))
            .min(text.len().saturating_sub(col - 1))
            .max(1);
        let carets = paint("1;31", &"^".repeat(width));
        let _ = writeln!(out, "{gutter} {bar} {}{carets} {}", " ".repeat(col - 1), label.message);
    }

    for note in &d.notes {
        let _ = writeln!(out, "  = note: {note}");
    }
    if let Some(s) = &d.suggestion {
        let _ = writeln!(out, "  = help: {s}");
    }
    out
}
