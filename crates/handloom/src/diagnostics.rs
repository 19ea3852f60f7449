//! Accumulating diagnostics for definition processing.
//!
//! Definition errors do not abort on first sight: the whole definition is
//! examined, everything wrong is collected, and construction fails at the
//! end if anything fatal accumulated. Warnings survive into the success
//! path.

use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub line: Option<u32>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Warning => write!(f, "warning: ")?,
            Severity::Error => write!(f, "error: ")?,
        }
        if let Some(line) = self.line {
            write!(f, "line {}: ", line)?;
        }
        f.write_str(&self.message)
    }
}

/// The collective failure of a definition.
#[derive(Debug, thiserror::Error)]
pub struct DefinitionErrors {
    pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Display for DefinitionErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "the definition has errors:")?;
        for d in &self.diagnostics {
            writeln!(f, "  {}", d)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn error(&mut self, line: Option<u32>, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(%message, "definition error");
        self.items.push(Diagnostic {
            severity: Severity::Error,
            message,
            line,
        });
    }

    pub fn warning(&mut self, line: Option<u32>, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(%message, "definition warning");
        self.items.push(Diagnostic {
            severity: Severity::Warning,
            message,
            line,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    /// Give up: wrap whatever accumulated as the collective failure.
    pub fn into_errors(self) -> DefinitionErrors {
        DefinitionErrors {
            diagnostics: self.items,
        }
    }

    /// Succeed with `value` (and any warnings) or fail with everything.
    pub fn into_result<T>(self, value: T) -> Result<(T, Vec<Diagnostic>), DefinitionErrors> {
        if self.has_errors() {
            Err(DefinitionErrors {
                diagnostics: self.items,
            })
        } else {
            Ok((value, self.items))
        }
    }
}
