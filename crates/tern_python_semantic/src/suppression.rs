//! In-comment directives: `# type: ignore` suppressions and `# pyright:`
//! per-file setting overrides, extracted from the comment tokens the
//! lexer produced.

use rustpython_ast::text_size::TextRange;

use crate::diagnostic::DiagnosticSettings;
use crate::line_index::LineIndex;
use crate::parse::Parsed;

/// The suppressions of a single file.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct Suppressions {
    /// A `type: ignore` on the first meaningful line suppresses every
    /// diagnostic in the file.
    pub file_level: bool,
    /// 0-based lines bearing a `type: ignore` marker, sorted.
    lines: Vec<u32>,
}

impl Suppressions {
    /// Whether a diagnostic whose range touches one of the marked lines
    /// is suppressed.
    pub fn suppresses(&self, range: TextRange, index: &LineIndex) -> bool {
        if self.file_level {
            return true;
        }
        self.lines
            .iter()
            .any(|line| index.range_intersects_line(range, *line))
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

/// Parses every directive comment, mutating `settings` with `# pyright:`
/// overrides and collecting `# type: ignore` markers.
pub fn parse_directives(
    source: &str,
    parsed: &Parsed,
    index: &LineIndex,
    settings: &mut DiagnosticSettings,
) -> Suppressions {
    let mut suppressions = Suppressions::default();
    let first_code_line = first_meaningful_line(source);

    for comment in parsed.comments() {
        let text = comment.text.trim_start_matches('#').trim();

        if let Some(rest) = text.strip_prefix("type:") {
            if rest.trim_start().starts_with("ignore") {
                let line = index.line_of(comment.range.start());
                if line == first_code_line {
                    suppressions.file_level = true;
                }
                if !suppressions.lines.contains(&line) {
                    suppressions.lines.push(line);
                }
            }
            continue;
        }

        if let Some(rest) = text.strip_prefix("pyright:") {
            for operand in rest.split(',') {
                let operand = operand.trim();
                if operand == "strict" {
                    *settings = DiagnosticSettings::strict();
                } else if let Some((name, value)) = operand.split_once('=') {
                    // Unknown settings are ignored.
                    settings.apply(name.trim(), value.trim());
                }
            }
        }
    }

    suppressions.lines.sort_unstable();
    suppressions
}

/// The first line that isn't a shebang; a whole-file `type: ignore` must
/// sit there.
fn first_meaningful_line(source: &str) -> u32 {
    match source.lines().next() {
        Some(first) if first.starts_with("#!") => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::parse_directives;
    use crate::diagnostic::{DiagnosticLevel, DiagnosticSettings, Rule};
    use crate::line_index::LineIndex;
    use crate::parse::Parsed;
    use rustpython_ast::text_size::{TextRange, TextSize};

    fn parse(source: &str) -> (Parsed, LineIndex) {
        (
            Parsed::from_text(source, "<test>"),
            LineIndex::from_source(source),
        )
    }

    #[test]
    fn line_suppressions() {
        let source = "x = 1\ny = undefined  # type: ignore\nz = 3\n";
        let (parsed, index) = parse(source);
        let mut settings = DiagnosticSettings::default();
        let suppressions = parse_directives(source, &parsed, &index, &mut settings);

        assert!(!suppressions.file_level);
        let second_line = TextRange::new(TextSize::from(10), TextSize::from(19));
        assert!(suppressions.suppresses(second_line, &index));
        let first_line = TextRange::new(TextSize::from(0), TextSize::from(5));
        assert!(!suppressions.suppresses(first_line, &index));
    }

    #[test]
    fn file_level_suppression() {
        let source = "# type: ignore\nx = undefined\n";
        let (parsed, index) = parse(source);
        let mut settings = DiagnosticSettings::default();
        let suppressions = parse_directives(source, &parsed, &index, &mut settings);
        assert!(suppressions.file_level);
    }

    #[test]
    fn file_level_skips_shebang() {
        let source = "#!/usr/bin/env python\n# type: ignore\nx = 1\n";
        let (parsed, index) = parse(source);
        let mut settings = DiagnosticSettings::default();
        let suppressions = parse_directives(source, &parsed, &index, &mut settings);
        assert!(suppressions.file_level);
    }

    #[test]
    fn setting_overrides() {
        let source = "# pyright: reportMissingImports=warning, reportUndefinedVariable=false\n";
        let (parsed, index) = parse(source);
        let mut settings = DiagnosticSettings::default();
        parse_directives(source, &parsed, &index, &mut settings);
        assert_eq!(
            settings.level_for(Rule::MissingImports),
            DiagnosticLevel::Warning
        );
        assert_eq!(
            settings.level_for(Rule::UndefinedVariable),
            DiagnosticLevel::None
        );
    }

    #[test]
    fn strict_operand() {
        let source = "# pyright: strict\n";
        let (parsed, index) = parse(source);
        let mut settings = DiagnosticSettings::default();
        parse_directives(source, &parsed, &index, &mut settings);
        assert_eq!(settings, DiagnosticSettings::strict());
    }

    #[test]
    fn unknown_settings_are_ignored() {
        let source = "# pyright: reportSomethingNew=error\n";
        let (parsed, index) = parse(source);
        let mut settings = DiagnosticSettings::default();
        parse_directives(source, &parsed, &index, &mut settings);
        assert_eq!(settings, DiagnosticSettings::default());
    }
}
