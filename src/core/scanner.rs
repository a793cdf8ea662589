use std::fs;
use std::path::Path;

use super::{FileNode, IgnoreRuleSet, ScanError};
use crate::utils::file_detection::is_media_or_binary;

/// Builds the filtered in-memory snapshot of a source directory.
///
/// The walk descends recursively, folding each directory's `.gitignore` into
/// a per-level copy of the active rule set. Entries that match a rule are
/// dropped entirely; text-like files are read eagerly; files with a
/// binary/media extension stay in the tree with empty content.
pub struct DirectoryScanner {
    extra_patterns: Vec<String>,
}

impl DirectoryScanner {
    pub fn new(extra_patterns: Vec<String>) -> Self {
        Self { extra_patterns }
    }

    pub fn scan(&self, root_path: &Path) -> Result<FileNode, ScanError> {
        if !root_path.is_dir() {
            return Err(ScanError::NotADirectory(root_path.to_path_buf()));
        }

        let baseline = IgnoreRuleSet::baseline(&self.extra_patterns);
        let root_name = root_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root_path.to_string_lossy().into_owned());

        match Self::walk(root_path, &root_name, Path::new(""), &baseline)? {
            Some(root) => Ok(root),
            None => Err(ScanError::RootIgnored(root_path.to_path_buf())),
        }
    }

    fn walk(
        dir: &Path,
        name: &str,
        relative: &Path,
        inherited: &IgnoreRuleSet,
    ) -> Result<Option<FileNode>, ScanError> {
        let rules = inherited.with_local_gitignore(dir);

        if rules.matches_directory(name, relative) {
            tracing::debug!("Excluding directory {}", dir.display());
            return Ok(None);
        }

        let read_dir = match fs::read_dir(dir) {
            Ok(read_dir) => read_dir,
            // The scan root must be listable; deeper failures drop the subtree.
            Err(e) if relative.as_os_str().is_empty() => {
                return Err(ScanError::Io(e, dir.to_path_buf()));
            }
            Err(e) => {
                tracing::warn!("Skipping unreadable directory {}: {}", dir.display(), e);
                return Ok(None);
            }
        };

        let mut children = Vec::new();
        for entry in read_dir {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                    continue;
                }
            };
            let entry_name = entry.file_name().to_string_lossy().into_owned();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", entry.path().display(), e);
                    continue;
                }
            };

            if file_type.is_symlink() {
                tracing::warn!("Skipping symlink {}", entry.path().display());
                continue;
            }
            if rules.matches_name(&entry_name, file_type.is_dir()) {
                tracing::debug!("Excluding {}", entry.path().display());
                continue;
            }

            if file_type.is_dir() {
                let child_relative = relative.join(&entry_name);
                if let Some(child) =
                    Self::walk(&entry.path(), &entry_name, &child_relative, &rules)?
                {
                    children.push(child);
                }
            } else {
                let content = Self::read_content(&entry.path())?;
                children.push(FileNode::file(entry_name, content));
            }
        }

        Ok(Some(FileNode::directory(name, children)))
    }

    fn read_content(path: &Path) -> Result<Option<String>, ScanError> {
        if is_media_or_binary(path) {
            return Ok(None);
        }
        let bytes = fs::read(path).map_err(|e| ScanError::Io(e, path.to_path_buf()))?;
        match String::from_utf8(bytes) {
            Ok(text) => Ok(Some(text)),
            Err(e) => {
                tracing::warn!(
                    "File {} is not valid UTF-8, converting lossily",
                    path.display()
                );
                Ok(Some(String::from_utf8_lossy(e.as_bytes()).into_owned()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_file(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn scan(root: &Path) -> FileNode {
        DirectoryScanner::new(Vec::new()).scan(root).unwrap()
    }

    #[test]
    fn test_captures_files_and_directories_with_content() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "main.rs", "fn main() {}");
        write_file(dir.path(), "src/lib.rs", "pub fn lib() {}");

        let tree = scan(dir.path());
        assert!(tree.is_directory());
        assert_eq!(
            tree.child("main.rs").unwrap().content.as_deref(),
            Some("fn main() {}")
        );
        let src = tree.child("src").unwrap();
        assert!(src.is_directory());
        assert_eq!(
            src.child("lib.rs").unwrap().content.as_deref(),
            Some("pub fn lib() {}")
        );
    }

    #[test]
    fn test_gitignore_excludes_matching_files_but_not_itself() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), ".gitignore", "*.log\n");
        write_file(dir.path(), "debug.log", "noise");
        write_file(dir.path(), "main.rs", "fn main() {}");

        let tree = scan(dir.path());
        assert!(tree.child("debug.log").is_none());
        assert!(tree.child("main.rs").is_some());
        assert_eq!(
            tree.child(".gitignore").unwrap().content.as_deref(),
            Some("*.log\n")
        );
    }

    #[test]
    fn test_nested_gitignore_does_not_leak_into_siblings() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "sub/.gitignore", "secret.txt\n");
        write_file(dir.path(), "sub/secret.txt", "hidden");
        write_file(dir.path(), "sub/open.txt", "visible");
        write_file(dir.path(), "sibling/secret.txt", "visible");

        let tree = scan(dir.path());
        let sub = tree.child("sub").unwrap();
        assert!(sub.child("secret.txt").is_none());
        assert!(sub.child("open.txt").is_some());
        let sibling = tree.child("sibling").unwrap();
        assert!(sibling.child("secret.txt").is_some());
    }

    #[test]
    fn test_ignored_directory_is_absent_while_empty_directory_is_kept() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "node_modules/pkg/index.js", "x");
        fs::create_dir(dir.path().join("empty")).unwrap();

        let scanner = DirectoryScanner::new(vec!["node_modules".to_string()]);
        let tree = scanner.scan(dir.path()).unwrap();

        assert!(tree.child("node_modules").is_none());
        let empty = tree.child("empty").unwrap();
        assert_eq!(empty.children.as_deref(), Some(&[][..]));
    }

    #[test]
    fn test_git_directory_is_always_excluded() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), ".git/HEAD", "ref: refs/heads/main");
        write_file(dir.path(), "main.rs", "fn main() {}");

        let tree = scan(dir.path());
        assert!(tree.child(".git").is_none());
        assert!(tree.child("main.rs").is_some());
    }

    #[test]
    fn test_media_file_is_kept_without_content() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "logo.png", "not really a png");

        let tree = scan(dir.path());
        let logo = tree.child("logo.png").unwrap();
        assert_eq!(logo.content, None);
        assert!(!logo.is_directory());
    }

    #[test]
    fn test_user_pattern_applies_at_any_depth() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "dist/bundle.js", "x");
        write_file(dir.path(), "packages/app/dist/bundle.js", "x");
        write_file(dir.path(), "packages/app/src/index.js", "x");

        let scanner = DirectoryScanner::new(vec!["dist".to_string()]);
        let tree = scanner.scan(dir.path()).unwrap();

        assert!(tree.child("dist").is_none());
        let app = tree.child("packages").unwrap().child("app").unwrap();
        assert!(app.child("dist").is_none());
        assert!(app.child("src").is_some());
    }

    #[test]
    fn test_root_matching_exclude_pattern_is_an_error() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "main.rs", "fn main() {}");
        let root_name = dir
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();

        let scanner = DirectoryScanner::new(vec![root_name]);
        let result = scanner.scan(dir.path());
        assert!(matches!(result, Err(ScanError::RootIgnored(_))));
    }

    #[test]
    fn test_scan_root_must_be_a_directory() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "file.txt", "x");

        let scanner = DirectoryScanner::new(Vec::new());
        let result = scanner.scan(&dir.path().join("file.txt"));
        assert!(matches!(result, Err(ScanError::NotADirectory(_))));
    }

    #[test]
    fn test_repeated_scans_produce_identical_trees() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), ".gitignore", "*.tmp\n");
        write_file(dir.path(), "a.txt", "a");
        write_file(dir.path(), "b.tmp", "b");
        write_file(dir.path(), "sub/c.txt", "c");

        let scanner = DirectoryScanner::new(Vec::new());
        let first = scanner.scan(dir.path()).unwrap();
        let second = scanner.scan(dir.path()).unwrap();
        assert_eq!(first, second);
    }
}
