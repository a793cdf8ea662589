use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::AnalysisError;

/// Directory created inside the analyzed project when no output directory
/// is configured.
pub const ANALYSIS_DIR: &str = ".repo-scribe";

/// Persists analysis artifacts for one run.
///
/// With a configured output directory the artifacts land under
/// `<output>/<project-name>/`; otherwise under `<project>/.repo-scribe/`.
pub struct AnalysisWriter {
    root: PathBuf,
}

impl AnalysisWriter {
    pub fn new(project_root: &Path, configured_output: Option<&Path>) -> Self {
        let root = match configured_output {
            Some(output) => {
                let project_name = project_root
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "project".to_string());
                output.join(project_name)
            }
            None => project_root.join(ANALYSIS_DIR),
        };
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes one artifact, creating the output directory on first use.
    /// When `as_json` is set, content that parses as JSON is pretty-printed;
    /// anything else is written verbatim.
    pub fn write_artifact(
        &self,
        name: &str,
        content: &str,
        as_json: bool,
    ) -> Result<PathBuf, AnalysisError> {
        fs::create_dir_all(&self.root).map_err(|e| AnalysisError::Io(e, self.root.clone()))?;
        let path = self.root.join(name);
        let rendered = if as_json {
            match serde_json::from_str::<serde_json::Value>(content) {
                Ok(value) => serde_json::to_string_pretty(&value)?,
                Err(_) => content.to_string(),
            }
        } else {
            content.to_string()
        };
        fs::write(&path, rendered.as_bytes()).map_err(|e| AnalysisError::Io(e, path.clone()))?;
        info!("Wrote {}", path.display());
        Ok(path)
    }

    /// Reads back a previously written artifact.
    pub fn read_artifact(&self, name: &str) -> Result<String, AnalysisError> {
        let path = self.root.join(name);
        debug!("Reading {}", path.display());
        fs::read_to_string(&path).map_err(|e| AnalysisError::Io(e, path))
    }

    /// Records one failure under `errors/` so the run can keep going.
    pub fn write_error(
        &self,
        kind: &str,
        detail: &str,
        message: &str,
    ) -> Result<PathBuf, AnalysisError> {
        let errors_dir = self.root.join("errors");
        fs::create_dir_all(&errors_dir).map_err(|e| AnalysisError::Io(e, errors_dir.clone()))?;
        let now = chrono::Utc::now();
        let path = errors_dir.join(format!("{kind}-{}.log", now.format("%Y%m%d-%H%M%S%3f")));
        let body = format!("[{}] {message}\n\n{detail}\n", now.to_rfc3339());
        fs::write(&path, body).map_err(|e| AnalysisError::Io(e, path.clone()))?;
        info!("Recorded failure in {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_artifacts_default_to_a_dot_directory_inside_the_project() {
        let project = TempDir::new().unwrap();
        let writer = AnalysisWriter::new(project.path(), None);
        assert_eq!(writer.root(), project.path().join(ANALYSIS_DIR));
    }

    #[test]
    fn test_configured_output_is_namespaced_by_project_name() {
        let project = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let writer = AnalysisWriter::new(project.path(), Some(output.path()));
        let project_name = project.path().file_name().unwrap();
        assert_eq!(writer.root(), output.path().join(project_name));
    }

    #[test]
    fn test_json_artifacts_are_pretty_printed() {
        let project = TempDir::new().unwrap();
        let writer = AnalysisWriter::new(project.path(), None);
        let path = writer
            .write_artifact("shape.json", r#"{"isMonorepo":false}"#, true)
            .unwrap();
        let written = std::fs::read_to_string(path).unwrap();
        assert!(written.contains("\n"), "expected multi-line JSON: {written}");
        assert!(written.contains("\"isMonorepo\": false"));
    }

    #[test]
    fn test_unparseable_json_is_written_verbatim() {
        let project = TempDir::new().unwrap();
        let writer = AnalysisWriter::new(project.path(), None);
        let path = writer.write_artifact("shape.json", "not json", true).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "not json");
    }

    #[test]
    fn test_roundtrip_through_read_artifact() {
        let project = TempDir::new().unwrap();
        let writer = AnalysisWriter::new(project.path(), None);
        writer.write_artifact("notes.md", "# Notes", false).unwrap();
        assert_eq!(writer.read_artifact("notes.md").unwrap(), "# Notes");
    }

    #[test]
    fn test_failures_are_recorded_under_errors() {
        let project = TempDir::new().unwrap();
        let writer = AnalysisWriter::new(project.path(), None);
        let path = writer
            .write_error("analysis", "stack detail", "backend analysis failed")
            .unwrap();
        assert!(path.starts_with(writer.root().join("errors")));
        let body = std::fs::read_to_string(path).unwrap();
        assert!(body.contains("backend analysis failed"));
        assert!(body.contains("stack detail"));
    }
}
