//! Recursive, sorted directory traversal.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::{DirEntry, WalkDir};

/// Lazily yields every regular file under a set of roots.
///
/// Directory entries are visited in byte-wise order of their file names
/// (`OsString` ordering), so uppercase names sort before lowercase ones:
/// `B`, `a`, `c`. Paths on the skip-list are neither yielded nor descended
/// into; membership is component-wise [`Path`] equality, so `dir/` and `dir`
/// match. Symlinks are followed and a symlink loop is reported as an error.
pub struct Walker {
    entries: Box<dyn Iterator<Item = walkdir::Result<DirEntry>> + Send>,
}

impl Walker {
    /// Walks `roots` in the order given.
    pub fn new<I, P>(roots: I, skip: &[PathBuf]) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let roots: Vec<PathBuf> = roots.into_iter().map(Into::into).collect();
        let skip: Arc<[PathBuf]> = skip.into();

        let entries = roots.into_iter().flat_map(move |root| {
            let skip = Arc::clone(&skip);
            WalkDir::new(root)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(move |entry| !is_skipped(&skip, entry.path()))
        });

        Self {
            entries: Box::new(entries),
        }
    }
}

fn is_skipped(skip: &[PathBuf], path: &Path) -> bool {
    let skipped = skip.iter().any(|s| s == path);
    if skipped {
        log::info!("Skipping {} (skip-list)", path.display());
    }
    skipped
}

impl Iterator for Walker {
    type Item = std::io::Result<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        for entry in self.entries.by_ref() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };

            let file_type = entry.file_type();
            if file_type.is_file() {
                return Some(Ok(entry.into_path()));
            }
            if !file_type.is_dir() {
                log::debug!("Ignoring {} (not a regular file)", entry.path().display());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("titanic_walker_{name}"));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(&root).unwrap();
        root
    }

    fn names(root: &Path, walker: Walker) -> Vec<String> {
        walker
            .map(|p| {
                p.unwrap()
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn visits_entries_in_byte_order() {
        let root = fixture("order");
        for name in ["c", "a", "B"] {
            fs::write(root.join(name), name).unwrap();
        }

        let visited = names(&root, Walker::new([&root], &[]));
        assert_eq!(visited, vec!["B", "a", "c"]);

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn recurses_depth_first() {
        let root = fixture("nested");
        fs::create_dir_all(root.join("b/inner")).unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join("b/inner/z.txt"), "z").unwrap();
        fs::write(root.join("b/y.txt"), "y").unwrap();
        fs::write(root.join("c.txt"), "c").unwrap();

        let visited = names(&root, Walker::new([&root], &[]));
        assert_eq!(visited, vec!["a.txt", "b/inner/z.txt", "b/y.txt", "c.txt"]);

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn skip_list_prunes_files_and_directories() {
        let root = fixture("skip");
        fs::create_dir_all(root.join("cache")).unwrap();
        fs::write(root.join("cache/blob"), "x").unwrap();
        fs::write(root.join("keep.txt"), "k").unwrap();
        fs::write(root.join("secret.txt"), "s").unwrap();

        let skip = vec![root.join("cache/"), root.join("secret.txt")];
        let visited = names(&root, Walker::new([&root], &skip));
        assert_eq!(visited, vec!["keep.txt"]);

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn skipped_root_yields_nothing() {
        let root = fixture("skip_root");
        fs::write(root.join("a"), "a").unwrap();
        assert_eq!(Walker::new([&root], &[root.clone()]).count(), 0);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn roots_keep_their_given_order() {
        let root = fixture("roots");
        fs::write(root.join("z"), "z").unwrap();
        fs::write(root.join("a"), "a").unwrap();

        let visited = names(&root, Walker::new([root.join("z"), root.join("a")], &[]));
        assert_eq!(visited, vec!["z", "a"]);

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_root_is_an_error() {
        let mut walker = Walker::new(["/nonexistent/titanic/root"], &[]);
        let err = walker.next().unwrap().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
        assert!(err.to_string().contains("/nonexistent/titanic/root"));
        assert!(walker.next().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn follows_symlinked_directories() {
        let root = fixture("symlink");
        let target = fixture("symlink_target");
        fs::write(target.join("inside.txt"), "i").unwrap();
        std::os::unix::fs::symlink(&target, root.join("link")).unwrap();

        let visited = names(&root, Walker::new([&root], &[]));
        assert_eq!(visited, vec!["link/inside.txt"]);

        let _ = fs::remove_dir_all(&root);
        let _ = fs::remove_dir_all(&target);
    }
}
