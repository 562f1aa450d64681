use std::fmt;
use std::path::Path;

/// An absolute dotted module name, e.g. `foo.bar`.
///
/// Never relative; relative import directives are resolved against the
/// importing file before a `ModuleName` is formed.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ModuleName(smol_str::SmolStr);

impl ModuleName {
    /// Creates a module name. Returns `None` when `name` is empty, starts
    /// or ends with a dot, or contains consecutive dots.
    pub fn new(name: &str) -> Option<Self> {
        if name.is_empty() || name.split('.').any(str::is_empty) {
            return None;
        }
        Some(Self(smol_str::SmolStr::new(name)))
    }

    pub fn from_parts<'a>(parts: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let mut joined = String::new();
        for part in parts {
            if part.is_empty() {
                return None;
            }
            if !joined.is_empty() {
                joined.push('.');
            }
            joined.push_str(part);
        }
        Self::new(&joined)
    }

    /// Derives the module name for a file relative to a search root:
    /// `foo/bar/baz.py` becomes `foo.bar.baz`, initializer files name
    /// their package.
    pub fn from_relative_path(path: &Path) -> Option<Self> {
        let stem = path.file_stem()?.to_str()?;
        let mut parts = Vec::new();
        if let Some(parent) = path.parent() {
            for component in parent.components() {
                parts.push(component.as_os_str().to_str()?);
            }
        }
        if stem != "__init__" {
            parts.push(stem);
        }
        Self::from_parts(parts)
    }

    pub fn components(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.0.split('.')
    }

    /// The name of this module's immediate parent package, if any.
    pub fn parent(&self) -> Option<ModuleName> {
        let (parent, _) = self.0.rsplit_once('.')?;
        Some(Self(smol_str::SmolStr::new(parent)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::ModuleName;
    use std::path::Path;

    #[test]
    fn validation() {
        assert_eq!(ModuleName::new("foo.bar").unwrap().as_str(), "foo.bar");
        assert_eq!(ModuleName::new(""), None);
        assert_eq!(ModuleName::new(".foo"), None);
        assert_eq!(ModuleName::new("foo."), None);
        assert_eq!(ModuleName::new("foo..bar"), None);
    }

    #[test]
    fn relative_paths() {
        assert_eq!(
            ModuleName::from_relative_path(Path::new("foo/bar/baz.py"))
                .unwrap()
                .as_str(),
            "foo.bar.baz"
        );
        assert_eq!(
            ModuleName::from_relative_path(Path::new("foo/__init__.py"))
                .unwrap()
                .as_str(),
            "foo"
        );
    }

    #[test]
    fn parents() {
        let name = ModuleName::new("foo.bar.baz").unwrap();
        assert_eq!(name.parent().unwrap().as_str(), "foo.bar");
        assert_eq!(ModuleName::new("foo").unwrap().parent(), None);
    }
}
