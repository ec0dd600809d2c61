use colored::Colorize;
use std::path::Path;

use dtsb_core::{BuildMessage, BundleReport, Compilation};

#[derive(Debug, Clone, Copy)]
pub enum Severity {
    Error,
    Warning,
}

pub struct Reporter {
    color: bool,
}

impl Reporter {
    pub fn new(color: bool) -> Self {
        Reporter { color }
    }

    /// Every warning and error of `compilation`, one per line.
    pub fn render(&self, compilation: &Compilation) -> String {
        let mut out = String::new();
        for warning in &compilation.warnings {
            out.push_str(&self.format_message(Severity::Warning, warning));
            out.push('\n');
        }
        for error in &compilation.errors {
            out.push_str(&self.format_error(error));
            out.push('\n');
        }
        out
    }

    pub fn format_message(&self, severity: Severity, message: &BuildMessage) -> String {
        let mut output = String::new();
        if let Some(location) = self.format_location(message) {
            output.push_str(&location);
            output.push_str(" - ");
        }
        output.push_str(&self.format_severity(severity));
        output.push_str(": ");
        output.push_str(&message.message);
        output
    }

    /// Fatal errors print their whole context chain.
    pub fn format_error(&self, error: &anyhow::Error) -> String {
        format!("{}: {:#}", self.format_severity(Severity::Error), error)
    }

    pub fn format_summary(&self, report: &BundleReport, context: &Path) -> String {
        let out_dir = report
            .out_dir
            .strip_prefix(context)
            .unwrap_or(&report.out_dir);
        let noun = if report.copied.len() == 1 {
            "dependency"
        } else {
            "dependencies"
        };
        let summary = format!(
            "bundled {} {} into {}",
            report.copied.len(),
            noun,
            out_dir.display()
        );
        if self.color {
            summary.green().to_string()
        } else {
            summary
        }
    }

    fn format_location(&self, message: &BuildMessage) -> Option<String> {
        let file = message.file.as_ref()?;
        let location = match message.position {
            Some(position) => format!("{}:{}:{}", file.display(), position.line, position.column),
            None => file.display().to_string(),
        };
        if self.color {
            Some(location.cyan().to_string())
        } else {
            Some(location)
        }
    }

    fn format_severity(&self, severity: Severity) -> String {
        let label = match severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };

        if !self.color {
            return label.to_string();
        }

        match severity {
            Severity::Error => label.red().bold().to_string(),
            Severity::Warning => label.yellow().bold().to_string(),
        }
    }
}
