use super::Diagnostic;
use crate::ast::SourceMap;

/// One-line JSON form of a diagnostic, for `--json-errors`.
pub fn render(d: &Diagnostic) -> String {
    let mut obj = serde_json::json!({
        "severity": d.severity.as_str(),
        "message": d.message,
        "notes": d.notes,
    });

    if let Some(code) = d.code {
        obj["code"] = serde_json::Value::from(code);
    }
    if let Some(label) = &d.label {
        let mut span = serde_json::json!({
            "start": label.span.start,
            "end": label.span.end,
            "label": label.message,
        });
        if let Some(source) = &d.source {
            let (line, col) = SourceMap::new(source).lookup(label.span.start);
            span["line"] = serde_json::Value::from(line);
            span["col"] = serde_json::Value::from(col);
        }
        obj["span"] = span;
    }
    if let Some(s) = &d.suggestion {
        obj["suggestion"] = serde_json::Value::from(s.as_str());
    }

    serde_json::to_string(&obj)
        .unwrap_or_else(|_| r#"{"severity":"error","message":"internal error serializing diagnostic"}"#.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    fn parse(s: &str) -> serde_json::Value {
        serde_json::from_str(s).expect("valid JSON")
    }

    #[test]
    fn minimal() {
        let v = parse(&render(&Diagnostic::error("division by zero in div")));
        assert_eq!(v["severity"], "error");
        assert_eq!(v["message"], "division by zero in div");
        assert!(v.get("span").is_none());
        assert!(v.get("suggestion").is_none());
        assert!(v.get("code").is_none());
    }

    #[test]
    fn span_gets_line_and_col_from_source() {
        let d = Diagnostic::error("unexpected token")
            .with_code("P001")
            .with_span(Span { start: 8, end: 9 }, "here")
            .with_source("x = 1\ny = ]");
        let v = parse(&render(&d));
        assert_eq!(v["code"], "P001");
        assert_eq!(v["span"]["start"], 8);
        assert_eq!(v["span"]["line"], 2);
        assert_eq!(v["span"]["col"], 3);
    }

    #[test]
    fn span_without_source_has_no_position() {
        let d = Diagnostic::error("bad").with_span(Span { start: 1, end: 2 }, "");
        let v = parse(&render(&d));
        assert!(v["span"].get("line").is_none());
    }

    #[test]
    fn notes_and_suggestion() {
        let d = Diagnostic::error("bad").with_note("first").with_note("second").with_suggestion("fix");
        let v = parse(&render(&d));
        assert_eq!(v["notes"].as_array().map(Vec::len), Some(2));
        assert_eq!(v["suggestion"], "fix");
    }
}
