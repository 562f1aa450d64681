use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::hash::{BuildHasherDefault, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use hashbrown::hash_map::RawEntryMut;
use index_vec::IndexVec;
use rustc_hash::FxHasher;

type Map<K, V> = hashbrown::HashMap<K, V, BuildHasherDefault<FxHasher>>;

index_vec::define_index_type! {
    /// Interned handle for a file path.
    pub struct FileId = u32;
}

/// Path interner. The same path always maps to the same [`FileId`] for the
/// lifetime of the program, regardless of whether the file exists.
///
/// Cloning is cheap; clones share the same table.
#[derive(Default, Clone)]
pub struct Files {
    inner: Rc<RefCell<FilesInner>>,
}

#[derive(Default)]
struct FilesInner {
    by_path: Map<FileId, ()>,
    by_id: IndexVec<FileId, PathBuf>,
}

impl Files {
    /// Inserts the path and returns a new id for it, or returns the existing
    /// id if the path was interned before.
    pub fn intern(&self, path: &Path) -> FileId {
        let mut inner = self.inner.borrow_mut();
        let hash = hash_path(path);
        let next_id = FileId::from_usize(inner.by_id.len());

        let FilesInner { by_path, by_id } = &mut *inner;
        let entry = by_path
            .raw_entry_mut()
            .from_hash(hash, |existing| by_id[*existing] == path);

        match entry {
            RawEntryMut::Occupied(entry) => *entry.key(),
            RawEntryMut::Vacant(entry) => {
                entry.insert_with_hasher(hash, next_id, (), |_| hash);
                let pushed = by_id.push(path.to_owned());
                debug_assert_eq!(pushed, next_id);
                next_id
            }
        }
    }

    /// Returns the path for the file with the given id.
    pub fn path(&self, id: FileId) -> PathBuf {
        self.inner.borrow().by_id[id].clone()
    }

    pub fn try_get(&self, path: &Path) -> Option<FileId> {
        let inner = self.inner.borrow();
        let hash = hash_path(path);
        inner
            .by_path
            .raw_entry()
            .from_hash(hash, |existing| inner.by_id[*existing] == path)
            .map(|(id, ())| *id)
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn hash_path(path: &Path) -> u64 {
    let mut hasher = FxHasher::default();
    path.hash(&mut hasher);
    hasher.finish()
}

impl Debug for Files {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        let mut debug = f.debug_map();
        for (id, path) in inner.by_id.iter_enumerated() {
            debug.entry(&id, &path);
        }
        debug.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Files;
    use std::path::Path;

    #[test]
    fn interning_is_stable() {
        let files = Files::default();
        let one = files.intern(Path::new("/src/a.py"));
        let two = files.intern(Path::new("/src/b.py"));
        assert_ne!(one, two);
        assert_eq!(one, files.intern(Path::new("/src/a.py")));
        assert_eq!(files.path(two), Path::new("/src/b.py"));
    }

    #[test]
    fn try_get_misses_unknown_paths() {
        let files = Files::default();
        files.intern(Path::new("/src/a.py"));
        assert_eq!(files.try_get(Path::new("/src/missing.py")), None);
    }
}
