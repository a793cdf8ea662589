use std::path::Path;

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "ico", "webp", "svg", "tiff", "tif", "heic", "heif",
    "avif", "jfif",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "mpg", "mpeg", "m4v",
];

const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx"];

const DATABASE_EXTENSIONS: &[&str] = &["db", "sqlite", "sqlite3"];

/// Determines whether a file's content should be left out of the snapshot.
///
/// Only the extension is consulted. Files on this list still appear in the
/// tree so the model sees they exist, but their bytes are never read.
pub fn is_media_or_binary(path: &Path) -> bool {
    let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };
    let ext_lower = extension.to_lowercase();
    let ext = ext_lower.as_str();

    IMAGE_EXTENSIONS.contains(&ext)
        || VIDEO_EXTENSIONS.contains(&ext)
        || DOCUMENT_EXTENSIONS.contains(&ext)
        || DATABASE_EXTENSIONS.contains(&ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_extensions_are_skipped() {
        assert!(is_media_or_binary(Path::new("logo.png")));
        assert!(is_media_or_binary(Path::new("clip.MP4")));
        assert!(is_media_or_binary(Path::new("report.pdf")));
        assert!(is_media_or_binary(Path::new("data/cache.sqlite3")));
    }

    #[test]
    fn test_source_files_are_kept() {
        assert!(!is_media_or_binary(Path::new("main.rs")));
        assert!(!is_media_or_binary(Path::new("index.js")));
        assert!(!is_media_or_binary(Path::new("README")));
        assert!(!is_media_or_binary(Path::new(".gitignore")));
    }
}
