use std::ops::Range;

use thiserror::Error;

/// A lexical or syntax error. Compilation stops at the first one.
///
/// Renders as `chunk:line: message`, followed by ` near token` when the error
/// is attributed to a specific token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct SyntaxError {
    /// The short chunk name.
    pub chunk: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
    pub near: Option<String>,
    /// Byte range of the offending token in the source.
    pub span: Range<usize>,
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.chunk, self.line, self.message)?;
        if let Some(near) = &self.near {
            write!(f, " near {near}")?;
        }
        Ok(())
    }
}

#[cfg(feature = "rendered-errors")]
impl SyntaxError {
    pub fn build_report(&self) -> ariadne::Report<Range<usize>> {
        use ariadne::{
            Label,
            Report,
            ReportKind,
        };

        let label = match &self.near {
            Some(near) => format!("{} near {}", self.message, near),
            None => self.message.clone(),
        };

        Report::build(ReportKind::Error, (), self.span.start)
            .with_message(format!("Failed to compile {}", self.chunk))
            .with_label(Label::new(self.span.clone()).with_message(label))
            .finish()
    }
}
