use std::sync::Arc;

use rustpython_ast as ast;
use rustpython_ast::text_size::{TextRange, TextSize};
use rustpython_parser::{lexer, Mode, Parse, Tok};

/// Parse output for one file: the statement suite, parse errors, and the
/// comment spans the directive parser consumes. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Parsed {
    inner: Arc<ParsedInner>,
}

#[derive(Debug)]
struct ParsedInner {
    suite: Vec<ast::Stmt>,
    errors: Vec<ParseDiagnostic>,
    comments: Vec<Comment>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ParseDiagnostic {
    pub message: String,
    pub offset: TextSize,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Comment {
    pub text: String,
    pub range: TextRange,
}

impl Parsed {
    pub fn from_text(text: &str, path: &str) -> Self {
        let (suite, errors) = match ast::Suite::parse(text, path) {
            Ok(suite) => (suite, Vec::new()),
            Err(error) => (
                Vec::new(),
                vec![ParseDiagnostic {
                    message: error.to_string(),
                    offset: error.offset,
                }],
            ),
        };

        let mut comments = Vec::new();
        for token in lexer::lex(text, Mode::Module).flatten() {
            if let (Tok::Comment(text), range) = token {
                comments.push(Comment { text, range });
            }
        }

        Self {
            inner: Arc::new(ParsedInner {
                suite,
                errors,
                comments,
            }),
        }
    }

    pub fn suite(&self) -> &[ast::Stmt] {
        &self.inner.suite
    }

    pub fn errors(&self) -> &[ParseDiagnostic] {
        &self.inner.errors
    }

    pub fn comments(&self) -> &[Comment] {
        &self.inner.comments
    }

    pub fn is_valid(&self) -> bool {
        self.inner.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::Parsed;

    #[test]
    fn parses_a_suite() {
        let parsed = Parsed::from_text("x = 1\n", "<test>");
        assert!(parsed.is_valid());
        assert_eq!(parsed.suite().len(), 1);
    }

    #[test]
    fn collects_comments() {
        let parsed = Parsed::from_text("x = 1  # trailing\n# own line\n", "<test>");
        assert_eq!(parsed.comments().len(), 2);
        assert!(parsed.comments()[0].text.contains("trailing"));
    }

    #[test]
    fn syntax_errors_are_captured() {
        let parsed = Parsed::from_text("def broken(:\n", "<test>");
        assert!(!parsed.is_valid());
        assert!(parsed.suite().is_empty());
    }
}
