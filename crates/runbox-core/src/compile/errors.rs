//! Compiler diagnostics.

use serde::{Deserialize, Serialize};

/// A compiler diagnostic with source location information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Diagnostic message
    pub message: String,

    /// Diagnostic code (e.g., "E0308")
    pub code: Option<String>,

    /// Severity level
    pub severity: Severity,

    /// Primary source span
    pub span: Option<SourceSpan>,

    /// Rendered message as printed by rustc
    #[serde(skip)]
    pub rendered: Option<String>,
}

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Note,
    Help,
}

/// A span in a submitted source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSpan {
    /// File name as submitted
    pub file: String,

    /// Start line (1-indexed)
    pub line_start: usize,

    /// Start column (1-indexed)
    pub column_start: usize,

    /// End line (1-indexed)
    pub line_end: usize,

    /// End column (1-indexed)
    pub column_end: usize,
}

/// Rustc JSON diagnostic format.
#[derive(Debug, Deserialize)]
struct RustcDiagnostic {
    message: String,
    code: Option<RustcCode>,
    level: String,
    spans: Vec<RustcSpan>,
    rendered: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RustcCode {
    code: String,
}

#[derive(Debug, Deserialize)]
struct RustcSpan {
    file_name: String,
    line_start: usize,
    line_end: usize,
    column_start: usize,
    column_end: usize,
    is_primary: bool,
}

/// Summary lines rustc emits as error-level diagnostics.
fn is_summary_message(message: &str) -> bool {
    message.starts_with("aborting due to")
        || message.ends_with("warning emitted")
        || message.ends_with("warnings emitted")
}

/// Parse rustc `--error-format=json` output.
///
/// Non-JSON lines and unknown levels (e.g. `failure-note`) are skipped.
pub fn parse_rustc_output(json_output: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for line in json_output.lines() {
        let line = line.trim();
        if line.is_empty() || !line.starts_with('{') {
            continue;
        }

        match serde_json::from_str::<RustcDiagnostic>(line) {
            Ok(diagnostic) => {
                if let Some(mapped) = map_diagnostic(diagnostic) {
                    diagnostics.push(mapped);
                }
            }
            Err(e) => {
                tracing::debug!(
                    "Failed to parse rustc JSON: {} (line: {})",
                    e,
                    line.chars().take(100).collect::<String>()
                );
            }
        }
    }

    diagnostics
}

fn map_diagnostic(diagnostic: RustcDiagnostic) -> Option<Diagnostic> {
    let severity = match diagnostic.level.as_str() {
        "error" | "error: internal compiler error" => Severity::Error,
        "warning" => Severity::Warning,
        "note" => Severity::Note,
        "help" => Severity::Help,
        _ => return None,
    };

    if is_summary_message(&diagnostic.message) {
        return None;
    }

    let span = diagnostic
        .spans
        .iter()
        .find(|s| s.is_primary)
        .or_else(|| diagnostic.spans.first())
        .map(|s| SourceSpan {
            file: s.file_name.clone(),
            line_start: s.line_start,
            column_start: s.column_start,
            line_end: s.line_end,
            column_end: s.column_end,
        });

    Some(Diagnostic {
        message: diagnostic.message,
        code: diagnostic.code.map(|c| c.code),
        severity,
        span,
        rendered: diagnostic.rendered,
    })
}

impl Diagnostic {
    /// Create an error diagnostic with just a message.
    pub fn simple(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            severity: Severity::Error,
            span: None,
            rendered: None,
        }
    }

    /// Re-attribute a diagnostic located past the submitted entry file's
    /// last line: such spans point into the appended entry shim, which the
    /// user never sees.
    pub fn mark_generated(&mut self, entry_file: &str, entry_lines: usize) {
        let in_shim = self
            .span
            .as_ref()
            .is_some_and(|span| span.file == entry_file && span.line_start > entry_lines);
        if in_shim {
            self.span = None;
            self.message = format!("in generated entry point for `main`: {}", self.message);
            self.rendered = None;
        }
    }

    /// Whether this diagnostic is fatal.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Location-tagged message: `file:line: message`.
    pub fn location_tagged(&self) -> String {
        let message = match &self.code {
            Some(code) => format!("[{}] {}", code, self.message),
            None => self.message.clone(),
        };
        match &self.span {
            Some(span) => format!("{}:{}: {}", span.file, span.line_start, message),
            None => message,
        }
    }

    /// Format the diagnostic for terminal display.
    pub fn format_terminal(&self) -> String {
        let mut output = String::new();

        let level_str = match self.severity {
            Severity::Error => "\x1b[1;31merror\x1b[0m",
            Severity::Warning => "\x1b[1;33mwarning\x1b[0m",
            Severity::Note => "\x1b[1;36mnote\x1b[0m",
            Severity::Help => "\x1b[1;32mhelp\x1b[0m",
        };

        if let Some(code) = &self.code {
            output.push_str(&format!("{level_str}[{code}]: {}\n", self.message));
        } else {
            output.push_str(&format!("{level_str}: {}\n", self.message));
        }

        if let Some(span) = &self.span {
            output.push_str(&format!(
                "  \x1b[1;34m-->\x1b[0m {}:{}:{}\n",
                span.file, span.line_start, span.column_start
            ));
        }

        output
    }
}

/// Whether any diagnostic is fatal.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ERROR_JSON: &str = r#"{"$message_type":"diagnostic","message":"cannot find value `x` in this scope","code":{"code":"E0425","explanation":null},"level":"error","spans":[{"file_name":"main.rs","byte_start":30,"byte_end":31,"line_start":2,"line_end":2,"column_start":20,"column_end":21,"is_primary":true,"text":[],"label":"not found in this scope","suggested_replacement":null,"suggestion_applicability":null,"expansion":null}],"children":[],"rendered":"error[E0425]: cannot find value `x` in this scope\n"}"#;

    const WARNING_JSON: &str = r#"{"message":"unused variable: `y`","code":{"code":"unused_variables"},"level":"warning","spans":[{"file_name":"util.rs","line_start":7,"line_end":7,"column_start":9,"column_end":10,"is_primary":true,"label":null}],"rendered":"warning: unused variable"}"#;

    const SUMMARY_JSON: &str = r#"{"message":"aborting due to 1 previous error","code":null,"level":"error","spans":[],"children":[],"rendered":"error: aborting due to 1 previous error\n\n"}"#;

    const FAILURE_NOTE_JSON: &str = r#"{"message":"For more information about this error, try `rustc --explain E0425`.","code":null,"level":"failure-note","spans":[],"children":[],"rendered":"..."}"#;

    #[test]
    fn test_parse_rustc_json() {
        let output = [ERROR_JSON, WARNING_JSON, SUMMARY_JSON, FAILURE_NOTE_JSON, "not json"].join("\n");
        let diagnostics = parse_rustc_output(&output);

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].code.as_deref(), Some("E0425"));
        assert_eq!(diagnostics[0].severity, Severity::Error);
        assert_eq!(diagnostics[1].severity, Severity::Warning);
        assert!(has_errors(&diagnostics));
    }

    #[test]
    fn test_warnings_are_not_fatal() {
        let diagnostics = parse_rustc_output(WARNING_JSON);
        assert_eq!(diagnostics.len(), 1);
        assert!(!has_errors(&diagnostics));
    }

    #[test]
    fn test_location_tagged() {
        let diagnostics = parse_rustc_output(ERROR_JSON);
        assert_eq!(
            diagnostics[0].location_tagged(),
            "main.rs:2: [E0425] cannot find value `x` in this scope"
        );
        assert_eq!(Diagnostic::simple("boom").location_tagged(), "boom");
    }

    #[test]
    fn test_mark_generated_drops_shim_location() {
        let mut diagnostic = parse_rustc_output(ERROR_JSON).remove(0);
        diagnostic.mark_generated("main.rs", 5);
        assert_eq!(diagnostic.span.as_ref().map(|s| s.line_start), Some(2));

        diagnostic.mark_generated("main.rs", 1);
        assert!(diagnostic.span.is_none());
        assert!(diagnostic.location_tagged().starts_with("[E0425] in generated entry point"));

        let mut other = parse_rustc_output(WARNING_JSON).remove(0);
        other.mark_generated("main.rs", 1);
        assert!(other.span.is_some());
    }

    #[test]
    fn test_format_terminal() {
        let diagnostics = parse_rustc_output(ERROR_JSON);
        let formatted = diagnostics[0].format_terminal();
        assert!(formatted.contains("E0425"));
        assert!(formatted.contains("main.rs:2:20"));
    }
}
