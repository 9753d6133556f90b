use super::{ParseError, Span};
use ariadne::{Config, Label, Report, ReportKind, Source};
use std::fmt;
use std::ops::Range;

/// Owned parse or transform error with the byte range it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub label: String,
    pub span: Range<usize>,
}

impl Diagnostic {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            label: message.clone(),
            message,
            span: span.into_range(),
        }
    }

    pub fn from_parse_error(error: &ParseError<'_>) -> Self {
        Self {
            message: error.to_string(),
            label: error.reason().to_string(),
            span: error.span().into_range(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}..{}", self.message, self.span.start, self.span.end)
    }
}

/// Render diagnostics as a plain-text report against `source`.
pub fn report(diagnostics: &[Diagnostic], filename: &str, source: &str) -> String {
    let mut output = Vec::new();
    for diagnostic in diagnostics {
        let span = clamp(&diagnostic.span, source.len());
        let written = Report::build(ReportKind::Error, (filename, span.clone()))
            .with_config(Config::default().with_color(false))
            .with_message(&diagnostic.message)
            .with_label(Label::new((filename, span)).with_message(&diagnostic.label))
            .finish()
            .write((filename, Source::from(source)), &mut output);
        if let Err(error) = written {
            log::error!("Failed to render diagnostic report: {error}");
            output.extend_from_slice(diagnostic.to_string().as_bytes());
            output.push(b'\n');
        }
    }
    String::from_utf8_lossy(&output).into_owned()
}

fn clamp(span: &Range<usize>, length: usize) -> Range<usize> {
    let start = span.start.min(length);
    start..span.end.clamp(start, length)
}

#[cfg(test)]
mod tests {
    use super::super::parse_module;
    use super::*;

    #[test]
    fn test_report_names_file_and_message() {
        let source = "const a = ;";
        let diagnostics = parse_module(source).unwrap_err();
        let rendered = report(&diagnostics, "component.jsx", source);
        assert!(rendered.contains("component.jsx"));
        assert!(rendered.contains("Error"));
    }

    #[test]
    fn test_out_of_range_span_is_clamped() {
        let diagnostic = Diagnostic::new(Span::from(40..50), "Unexpected end of input");
        let rendered = report(&[diagnostic], "component.jsx", "short");
        assert!(rendered.contains("Unexpected end of input"));
    }
}
