use std::fmt;

use rustpython_ast::text_size::TextRange;

use crate::line_index::{LineIndex, SourceLocation};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DiagnosticCategory {
    Error,
    Warning,
    Information,
    UnusedCode,
}

/// Severity a configurable rule is reported at.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum DiagnosticLevel {
    None,
    Warning,
    #[default]
    Error,
}

impl DiagnosticLevel {
    /// Parses a directive operand: `false`/`none` disable, `warning`
    /// warns, `true`/`error` error.
    pub fn from_directive_value(value: &str) -> Option<Self> {
        match value {
            "false" | "none" => Some(Self::None),
            "warning" => Some(Self::Warning),
            "true" | "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn category(self) -> Option<DiagnosticCategory> {
        match self {
            Self::None => None,
            Self::Warning => Some(DiagnosticCategory::Warning),
            Self::Error => Some(DiagnosticCategory::Error),
        }
    }
}

/// The configurable rules. Each maps to a `report*` setting name.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Rule {
    MissingImports,
    MissingModuleSource,
    MissingTypeStubs,
    UndefinedVariable,
    GeneralTypeIssues,
    OptionalMemberAccess,
    PrivateUsage,
    InvalidStringEscapeSequence,
}

impl Rule {
    pub fn setting_name(self) -> &'static str {
        match self {
            Rule::MissingImports => "reportMissingImports",
            Rule::MissingModuleSource => "reportMissingModuleSource",
            Rule::MissingTypeStubs => "reportMissingTypeStubs",
            Rule::UndefinedVariable => "reportUndefinedVariable",
            Rule::GeneralTypeIssues => "reportGeneralTypeIssues",
            Rule::OptionalMemberAccess => "reportOptionalMemberAccess",
            Rule::PrivateUsage => "reportPrivateUsage",
            Rule::InvalidStringEscapeSequence => "reportInvalidStringEscapeSequence",
        }
    }
}

/// Per-file effective rule levels plus the directive toggles.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiagnosticSettings {
    pub missing_imports: DiagnosticLevel,
    pub missing_module_source: DiagnosticLevel,
    pub missing_type_stubs: DiagnosticLevel,
    pub undefined_variable: DiagnosticLevel,
    pub general_type_issues: DiagnosticLevel,
    pub optional_member_access: DiagnosticLevel,
    pub private_usage: DiagnosticLevel,
    pub invalid_string_escape: DiagnosticLevel,
    pub enable_type_ignore_comments: bool,
}

impl Default for DiagnosticSettings {
    fn default() -> Self {
        Self {
            missing_imports: DiagnosticLevel::Error,
            missing_module_source: DiagnosticLevel::Warning,
            missing_type_stubs: DiagnosticLevel::None,
            undefined_variable: DiagnosticLevel::Error,
            general_type_issues: DiagnosticLevel::Error,
            optional_member_access: DiagnosticLevel::Error,
            private_usage: DiagnosticLevel::None,
            invalid_string_escape: DiagnosticLevel::Warning,
            enable_type_ignore_comments: true,
        }
    }
}

impl DiagnosticSettings {
    /// The settings selected by a bare `strict` directive.
    pub fn strict() -> Self {
        Self {
            missing_imports: DiagnosticLevel::Error,
            missing_module_source: DiagnosticLevel::Error,
            missing_type_stubs: DiagnosticLevel::Error,
            undefined_variable: DiagnosticLevel::Error,
            general_type_issues: DiagnosticLevel::Error,
            optional_member_access: DiagnosticLevel::Error,
            private_usage: DiagnosticLevel::Error,
            invalid_string_escape: DiagnosticLevel::Error,
            enable_type_ignore_comments: true,
        }
    }

    pub fn level_for(&self, rule: Rule) -> DiagnosticLevel {
        match rule {
            Rule::MissingImports => self.missing_imports,
            Rule::MissingModuleSource => self.missing_module_source,
            Rule::MissingTypeStubs => self.missing_type_stubs,
            Rule::UndefinedVariable => self.undefined_variable,
            Rule::GeneralTypeIssues => self.general_type_issues,
            Rule::OptionalMemberAccess => self.optional_member_access,
            Rule::PrivateUsage => self.private_usage,
            Rule::InvalidStringEscapeSequence => self.invalid_string_escape,
        }
    }

    /// Applies a `name=value` directive pair. Unknown names are ignored;
    /// returns whether the name was recognized.
    pub fn apply(&mut self, name: &str, value: &str) -> bool {
        if name == "enableTypeIgnoreComments" {
            if let Ok(enabled) = value.parse::<bool>() {
                self.enable_type_ignore_comments = enabled;
            }
            return true;
        }
        let Some(level) = DiagnosticLevel::from_directive_value(value) else {
            return false;
        };
        let slot = match name {
            "reportMissingImports" => &mut self.missing_imports,
            "reportMissingModuleSource" => &mut self.missing_module_source,
            "reportMissingTypeStubs" => &mut self.missing_type_stubs,
            "reportUndefinedVariable" => &mut self.undefined_variable,
            "reportGeneralTypeIssues" => &mut self.general_type_issues,
            "reportOptionalMemberAccess" => &mut self.optional_member_access,
            "reportPrivateUsage" => &mut self.private_usage,
            "reportInvalidStringEscapeSequence" => &mut self.invalid_string_escape,
            _ => return false,
        };
        *slot = level;
        true
    }
}

/// A structured follow-up a client can offer for a diagnostic.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiagnosticAction {
    pub action: &'static str,
    pub module_name: String,
}

impl DiagnosticAction {
    pub fn create_type_stub(module_name: String) -> Self {
        Self {
            action: "createtypestub",
            module_name,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Diagnostic {
    pub category: DiagnosticCategory,
    pub message: String,
    pub range: TextRange,
    pub rule: Option<Rule>,
    pub actions: Vec<DiagnosticAction>,
}

impl Diagnostic {
    pub fn error(range: TextRange, message: impl Into<String>) -> Self {
        Self {
            category: DiagnosticCategory::Error,
            message: message.into(),
            range,
            rule: None,
            actions: Vec::new(),
        }
    }

    pub fn warning(range: TextRange, message: impl Into<String>) -> Self {
        Self {
            category: DiagnosticCategory::Warning,
            message: message.into(),
            range,
            rule: None,
            actions: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn with_action(mut self, action: DiagnosticAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn is_error(&self) -> bool {
        self.category == DiagnosticCategory::Error
    }

    /// Start/end as 0-based line/column pairs, inclusive-exclusive.
    pub fn locations(&self, index: &LineIndex) -> (SourceLocation, SourceLocation) {
        (
            index.location(self.range.start()),
            index.location(self.range.end()),
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let category = match self.category {
            DiagnosticCategory::Error => "error",
            DiagnosticCategory::Warning => "warning",
            DiagnosticCategory::Information => "info",
            DiagnosticCategory::UnusedCode => "unused",
        };
        write!(f, "{category}: {}", self.message)
    }
}

/// Report a rule violation at the level the settings select, or not at all.
pub fn rule_diagnostic(
    settings: &DiagnosticSettings,
    rule: Rule,
    range: TextRange,
    message: impl Into<String>,
) -> Option<Diagnostic> {
    let category = settings.level_for(rule).category()?;
    Some(Diagnostic {
        category,
        message: message.into(),
        range,
        rule: Some(rule),
        actions: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::{DiagnosticLevel, DiagnosticSettings, Rule};

    #[test]
    fn directive_values() {
        assert_eq!(
            DiagnosticLevel::from_directive_value("false"),
            Some(DiagnosticLevel::None)
        );
        assert_eq!(
            DiagnosticLevel::from_directive_value("warning"),
            Some(DiagnosticLevel::Warning)
        );
        assert_eq!(
            DiagnosticLevel::from_directive_value("true"),
            Some(DiagnosticLevel::Error)
        );
        assert_eq!(DiagnosticLevel::from_directive_value("loud"), None);
    }

    #[test]
    fn apply_overrides_one_rule() {
        let mut settings = DiagnosticSettings::default();
        assert!(settings.apply("reportMissingImports", "warning"));
        assert_eq!(
            settings.level_for(Rule::MissingImports),
            DiagnosticLevel::Warning
        );
        // Unknown settings are ignored.
        assert!(!settings.apply("reportSomethingElse", "error"));
    }
}
