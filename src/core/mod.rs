pub mod error;
pub mod ignore;
pub mod scanner;

use serde::{Deserialize, Serialize};

/// One filesystem entry in the filtered directory snapshot.
///
/// A node carries `children` if and only if it represents a directory. A
/// directory whose entries were all filtered out still appears with an empty
/// child list; a directory that itself matched an ignore rule produces no
/// node at all. `content` is `None` for directories and for files whose
/// extension is on the binary/media skip-list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileNode {
    pub name: String,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileNode>>,
}

impl FileNode {
    pub fn file(name: impl Into<String>, content: Option<String>) -> Self {
        Self {
            name: name.into(),
            content,
            children: None,
        }
    }

    pub fn directory(name: impl Into<String>, children: Vec<FileNode>) -> Self {
        Self {
            name: name.into(),
            content: None,
            children: Some(children),
        }
    }

    pub fn is_directory(&self) -> bool {
        self.children.is_some()
    }

    /// Looks up a direct child by name.
    pub fn child(&self, name: &str) -> Option<&FileNode> {
        self.children
            .as_deref()
            .and_then(|children| children.iter().find(|c| c.name == name))
    }
}

pub use error::ScanError;
pub use ignore::IgnoreRuleSet;
pub use scanner::DirectoryScanner;
