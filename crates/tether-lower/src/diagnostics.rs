//! Ariadne-based rendering of lowering errors, plus the JSON form used by
//! `tetherc --json`.

use ariadne::{Color, Config, Label, Report, ReportKind, Source};
use tether_common::LineIndex;

use crate::error::LowerError;

/// Diagnostic output options.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosticOptions {
    /// Colorize rendered output.
    pub color: bool,
    /// Emit one JSON object per diagnostic instead of a rendered report.
    pub json: bool,
}

impl DiagnosticOptions {
    /// Plain rendered text, as used in tests and piped output.
    pub fn colorless() -> Self {
        DiagnosticOptions {
            color: false,
            json: false,
        }
    }
}

/// Render a lowering error against the bound program's source text.
///
/// Without source text there is nothing to underline, so the report is a
/// single `error[CODE]: message` line.
pub fn render_diagnostic(
    error: &LowerError,
    source: Option<&str>,
    filename: &str,
    options: &DiagnosticOptions,
) -> String {
    let Some(source) = source else {
        return plain(error, filename);
    };

    let config = Config::default().with_color(options.color);
    let span = error.span().clamped(source.len());

    let mut builder = Report::build(ReportKind::Error, (filename, span.clone()))
        .with_code(error.code())
        .with_message(error.to_string())
        .with_config(config)
        .with_label(
            Label::new((filename, span))
                .with_message(error.label())
                .with_color(Color::Red),
        );
    if let Some(help) = error.help() {
        builder = builder.with_help(help);
    }

    let mut buf = Vec::new();
    if builder.finish().write((filename, Source::from(source)), &mut buf).is_err() {
        let location = format!("{}:{}", filename, LineIndex::new(source).describe(error.span()));
        return plain(error, &location);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn plain(error: &LowerError, location: &str) -> String {
    let mut text = format!("error[{}]: {}\n  --> {}\n", error.code(), error, location);
    if let Some(help) = error.help() {
        text.push_str(&format!("  help: {}\n", help));
    }
    text
}

/// One-line JSON diagnostic: `{code, severity, message, file, spans, fix}`.
///
/// With source text available each span also carries its `line` and
/// `column`.
pub fn diagnostic_json(
    error: &LowerError,
    source: Option<&str>,
    filename: &str,
) -> serde_json::Value {
    let span = error.span();
    let mut entry = serde_json::json!({
        "start": span.start,
        "end": span.end,
        "label": error.label(),
    });
    if let Some(source) = source {
        let offset = span.start.min(source.len() as u32);
        let (line, column) = LineIndex::new(source).line_col(offset);
        entry["line"] = line.into();
        entry["column"] = column.into();
    }
    serde_json::json!({
        "code": error.code(),
        "severity": "error",
        "message": error.to_string(),
        "file": filename,
        "spans": [entry],
        "fix": error.help(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_bound::{Protocol, TypeRef};
    use tether_common::Span;

    fn sample() -> LowerError {
        LowerError::NoDisposalProtocol {
            ty: TypeRef::named("Plain"),
            protocol: Protocol::Disposable,
            operation: "Dispose",
            span: Span::new(7, 12),
        }
    }

    #[test]
    fn renders_code_message_and_label() {
        let source = "using (Plain p = new Plain()) { }";
        let out =
            render_diagnostic(&sample(), Some(source), "demo.tt", &DiagnosticOptions::colorless());
        assert!(out.contains("L0001"), "{}", out);
        assert!(out.contains("'Plain' has no usable Dispose operation"), "{}", out);
        assert!(out.contains("resource declared here"), "{}", out);
        assert!(out.contains("demo.tt"), "{}", out);
    }

    #[test]
    fn renders_without_source() {
        let out = render_diagnostic(&sample(), None, "demo.json", &DiagnosticOptions::colorless());
        assert!(out.starts_with("error[L0001]: 'Plain' has no usable Dispose operation"));
        assert!(out.contains("--> demo.json"));
    }

    #[test]
    fn json_shape() {
        let v = diagnostic_json(&sample(), None, "demo.tt");
        assert_eq!(v["code"], "L0001");
        assert_eq!(v["severity"], "error");
        assert_eq!(v["spans"][0]["start"], 7);
        assert_eq!(v["spans"][0]["end"], 12);
        assert!(v["spans"][0].get("line").is_none());
        assert!(v["fix"].is_null());
    }

    #[test]
    fn json_spans_carry_line_and_column_with_source() {
        let source = "// setup\nusing (Plain p = new Plain()) { }";
        let error = LowerError::NoDisposalProtocol {
            ty: TypeRef::named("Plain"),
            protocol: Protocol::Disposable,
            operation: "Dispose",
            span: Span::new(16, 21),
        };
        let v = diagnostic_json(&error, Some(source), "demo.tt");
        assert_eq!(v["spans"][0]["line"], 2);
        assert_eq!(v["spans"][0]["column"], 8);
    }

    #[test]
    fn span_past_the_end_is_placed_on_the_last_line() {
        let error = LowerError::NoDisposalProtocol {
            ty: TypeRef::named("Plain"),
            protocol: Protocol::Disposable,
            operation: "Dispose",
            span: Span::new(90, 95),
        };
        let v = diagnostic_json(&error, Some("a\nbc"), "demo.tt");
        assert_eq!(v["spans"][0]["line"], 2);
        assert_eq!(v["spans"][0]["column"], 3);
    }
}
