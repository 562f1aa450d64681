use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;

use rustc_hash::FxHasher;

/// The text of one file, read once per parse and hashed so later disk
/// reads can cheaply detect changes.
#[derive(Debug, Clone)]
pub struct Source {
    text: Arc<str>,
    hash: u64,
}

impl Source {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        let text = text.into();
        let hash = hash_text(&text);
        Self { text, hash }
    }

    pub fn from_disk(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::new(text))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }
}

fn hash_text(text: &str) -> u64 {
    let mut hasher = FxHasher::default();
    text.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::Source;

    #[test]
    fn hash_tracks_content() {
        let one = Source::new("x = 1\n");
        let same = Source::new("x = 1\n");
        let different = Source::new("x = 2\n");
        assert_eq!(one.hash(), same.hash());
        assert_ne!(one.hash(), different.hash());
    }
}
