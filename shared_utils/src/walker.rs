//! Directory Walker
//!
//! Lazily lists every regular file under a set of roots. Listing is cheap next
//! to codec work, so it stays sequential on the calling thread.

use crate::error::{PipelineError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Keep the roots that can actually be listed, as absolute paths.
///
/// A missing or unreadable root is logged and dropped; only when nothing is
/// left does this fail, since then the run cannot produce any output. A root
/// inside another root (or repeated) is dropped too, so no file is walked
/// twice.
pub fn usable_roots(roots: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut usable = Vec::with_capacity(roots.len());

    for root in roots {
        match std::fs::read_dir(root) {
            Ok(_) => {
                let absolute = root.canonicalize().unwrap_or_else(|_| root.clone());
                debug!(root = %absolute.display(), "Image root ready");
                usable.push(absolute);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(root = %root.display(), "Image root does not exist, skipping");
            }
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Image root is unreadable, skipping");
            }
        }
    }

    if usable.is_empty() {
        return Err(PipelineError::NoUsableRoot(roots.to_vec()));
    }
    Ok(outermost(usable))
}

/// Drop roots covered by another root, keeping first-seen order.
fn outermost(roots: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut kept: Vec<PathBuf> = Vec::with_capacity(roots.len());
    for root in roots {
        if let Some(outer) = kept.iter().find(|k| root.starts_with(k)) {
            warn!(root = %root.display(), within = %outer.display(), "Root already covered, skipping");
            continue;
        }
        kept.retain(|k| {
            let covered = k.starts_with(&root);
            if covered {
                warn!(root = %k.display(), within = %root.display(), "Root already covered, skipping");
            }
            !covered
        });
        kept.push(root);
    }
    kept
}

/// Recursively yield every regular file under `roots`.
///
/// Missing roots contribute nothing. A directory that cannot be listed comes
/// out as an `Err` item and the walk carries on with its siblings. Symlinks
/// are not followed. Entries come out sorted by file name within each
/// directory, so runs are reproducible.
pub fn walk_files(roots: &[PathBuf]) -> impl Iterator<Item = Result<PathBuf>> + '_ {
    roots
        .iter()
        .filter(|root| {
            let exists = root.exists();
            if !exists {
                debug!(root = %root.display(), "Skipping missing root");
            }
            exists
        })
        .flat_map(|root| {
            WalkDir::new(root)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
        })
        .filter_map(|entry| match entry {
            Ok(e) if e.file_type().is_file() => Some(Ok(e.into_path())),
            Ok(_) => None,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                Some(Err(PipelineError::Walk { path, source: err }))
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_walk_finds_nested_files() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.png"));
        touch(&dir.path().join("shows/2024/b.jpg"));
        touch(&dir.path().join("members/c.txt"));

        let roots = vec![dir.path().to_path_buf()];
        let mut found: Vec<PathBuf> = walk_files(&roots).map(|r| r.unwrap()).collect();
        found.sort();

        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|p| p.is_file()));
        assert!(found.contains(&dir.path().join("shows/2024/b.jpg")));
    }

    #[test]
    fn test_missing_root_contributes_nothing() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.png"));

        let roots = vec![dir.path().join("does-not-exist"), dir.path().to_path_buf()];
        let found: Vec<_> = walk_files(&roots).collect();

        assert_eq!(found.len(), 1);
        assert!(found[0].is_ok());
    }

    #[test]
    fn test_usable_roots_drops_missing() {
        let dir = TempDir::new().unwrap();
        let roots = vec![dir.path().join("gone"), dir.path().to_path_buf()];

        let usable = usable_roots(&roots).unwrap();
        assert_eq!(usable.len(), 1);
        assert!(usable[0].is_absolute());
    }

    #[test]
    fn test_usable_roots_fails_when_none_exist() {
        let dir = TempDir::new().unwrap();
        let roots = vec![dir.path().join("gone"), dir.path().join("also-gone")];

        let err = usable_roots(&roots).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, PipelineError::NoUsableRoot(ref r) if r.len() == 2));
    }

    #[test]
    fn test_nested_and_repeated_roots_collapse() {
        let dir = TempDir::new().unwrap();
        let public = dir.path().join("public");
        let images = public.join("images");
        let other = dir.path().join("src");
        fs::create_dir_all(&images).unwrap();
        fs::create_dir_all(&other).unwrap();

        let usable =
            usable_roots(&[images.clone(), public.clone(), other.clone(), public.clone()]).unwrap();
        assert_eq!(
            usable,
            vec![public.canonicalize().unwrap(), other.canonicalize().unwrap()]
        );
    }

    #[test]
    fn test_sibling_with_common_prefix_is_not_nested() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("images");
        let b = dir.path().join("images-old");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();

        assert_eq!(usable_roots(&[a, b]).unwrap().len(), 2);
    }

    #[test]
    fn test_walk_order_is_sorted() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("c.png"));
        touch(&dir.path().join("a.png"));
        touch(&dir.path().join("b.png"));

        let roots = vec![dir.path().to_path_buf()];
        let names: Vec<String> = walk_files(&roots)
            .map(|r| r.unwrap().file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.png", "b.png", "c.png"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_an_error_item() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        touch(&locked.join("hidden.png"));
        touch(&dir.path().join("visible.png"));

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        let enforced = fs::read_dir(&locked).is_err();
        let roots = vec![dir.path().to_path_buf()];
        let items: Vec<_> = walk_files(&roots).collect();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let files: Vec<&PathBuf> = items.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert!(files.contains(&&dir.path().join("visible.png")));
        if enforced {
            assert_eq!(files.len(), 1);
            assert!(items
                .iter()
                .any(|r| matches!(r, Err(PipelineError::Walk { .. }))));
        }
    }

    #[test]
    fn test_file_given_as_root_is_not_usable() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.png");
        touch(&file);

        assert!(usable_roots(&[file]).is_err());
    }
}
