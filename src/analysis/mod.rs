//! The analysis pipeline: scan, classify, infer, persist.
//!
//! `AnalysisOrchestrator` advances through its stages in a fixed order and
//! writes an artifact after every step, so an interrupted run leaves behind
//! everything produced before the failure.

pub mod artifacts;
pub mod summarizer;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::core::{DirectoryScanner, FileNode, ScanError};
use crate::providers::{
    InferenceOptions, InferenceOutput, ModelProvider, ModelRegistry, ProviderError,
};
use crate::utils::tokens;

pub use artifacts::AnalysisWriter;
pub use summarizer::{CodeSummarizer, OutlineSummarizer};

pub const TREE_ARTIFACT: &str = "directory-tree.json";
pub const STRUCTURE_ARTIFACT: &str = "directory-structure.json";
pub const CLASSIFICATION_ARTIFACT: &str = "project-classification.json";
pub const DEPENDENCY_ARTIFACT: &str = "dependency-inference.md";
pub const CODE_ARTIFACT: &str = "code-inference.md";
pub const README_ARTIFACT: &str = "README.md";

/// Tokens a single file may cost before its content is swapped for a
/// structural outline.
pub const PER_FILE_TOKEN_THRESHOLD: usize = 2000;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("I/O error for path {1}: {0}")]
    Io(#[source] std::io::Error, PathBuf),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Project classification is not valid JSON: {0}")]
    Classification(#[source] serde_json::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Programming language not defined for non-monorepo project")]
    MissingLanguage,
}

/// Typed view of the classification a provider returns. Absent fields
/// deserialize to their defaults; unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectShape {
    pub is_monorepo: bool,
    pub directories: Vec<String>,
    pub programming_language: Option<String>,
    pub framework: Option<String>,
    pub dependencies_file: Option<String>,
    pub lock_file: Option<String>,
    pub entry_point_file: Option<String>,
    pub workflow: Option<String>,
    pub tree_sitter_language: Option<String>,
}

/// Parses the raw classification JSON. The raw document is persisted before
/// this is called, so a malformed response still leaves evidence on disk.
pub fn parse_shape(raw: &str) -> Result<ProjectShape, AnalysisError> {
    serde_json::from_str(raw).map_err(AnalysisError::Classification)
}

/// Pipeline stages, entered strictly in order. A run ends in `Done` or
/// bails out of whichever stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStage {
    ReadingTree,
    ClassifyingProject,
    SingleCodebase,
    Monorepo,
    Done,
}

/// Inputs for one run, assembled by the CLI layer.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    /// Root of the project to analyze.
    pub path: PathBuf,
    /// Model name as given on the command line; `None` means "use defaults".
    pub model: Option<String>,
    /// Echo long-form responses to stdout as they arrive.
    pub stream: bool,
    /// Emit request diagnostics from the providers.
    pub verbose: bool,
    /// Ignore patterns supplied on the command line, on top of the
    /// configured set.
    pub extra_ignores: Vec<String>,
    /// Overrides the configured reader-expertise hint.
    pub expertise: Option<String>,
}

/// Everything one run needs besides the orchestrator itself.
struct RunContext<'a> {
    writer: &'a AnalysisWriter,
    provider: Arc<dyn ModelProvider>,
    opts: InferenceOptions,
    extra_ignores: &'a [String],
}

pub struct AnalysisOrchestrator {
    config: AppConfig,
    registry: ModelRegistry,
    summarizer: Box<dyn CodeSummarizer>,
    stage: AnalysisStage,
}

impl AnalysisOrchestrator {
    pub fn new(
        config: AppConfig,
        registry: ModelRegistry,
        summarizer: Box<dyn CodeSummarizer>,
    ) -> Self {
        Self {
            config,
            registry,
            summarizer,
            stage: AnalysisStage::ReadingTree,
        }
    }

    pub fn stage(&self) -> AnalysisStage {
        self.stage
    }

    fn enter(&mut self, stage: AnalysisStage) {
        info!("Entering {:?}", stage);
        self.stage = stage;
    }

    /// Runs the full pipeline and returns the artifact directory.
    pub async fn run(&mut self, settings: &AnalysisSettings) -> Result<PathBuf, AnalysisError> {
        let writer = AnalysisWriter::new(&settings.path, self.config.output_directory.as_deref());
        let (provider, model) = self
            .registry
            .resolve(settings.model.as_deref().unwrap_or_default())?;
        info!(
            "Analyzing {} with {} ({})",
            settings.path.display(),
            model,
            provider.name()
        );
        let ctx = RunContext {
            writer: &writer,
            opts: self.inference_options(settings, Some(model)),
            provider,
            extra_ignores: &settings.extra_ignores,
        };

        self.enter(AnalysisStage::ReadingTree);
        let tree = self.read_tree(&settings.path, ctx.extra_ignores).await?;
        ctx.writer
            .write_artifact(TREE_ARTIFACT, &serde_json::to_string(&tree)?, true)?;
        let structure_json = serde_json::to_string(&strip_content(&tree))?;
        ctx.writer
            .write_artifact(STRUCTURE_ARTIFACT, &structure_json, true)?;

        self.enter(AnalysisStage::ClassifyingProject);
        let raw_shape = ctx
            .provider
            .infer_project_shape(&structure_json, &ctx.opts)
            .await?;
        ctx.writer
            .write_artifact(CLASSIFICATION_ARTIFACT, &raw_shape, true)?;
        let shape = parse_shape(&raw_shape)?;

        if shape.is_monorepo {
            self.enter(AnalysisStage::Monorepo);
            self.run_monorepo(&ctx, &settings.path, &shape).await?;
        } else {
            self.enter(AnalysisStage::SingleCodebase);
            if non_blank(&shape.programming_language).is_none() {
                return Err(AnalysisError::MissingLanguage);
            }
            self.run_single(&ctx, &settings.path, &shape, &tree, None)
                .await?;
        }

        self.enter(AnalysisStage::Done);
        Ok(writer.root().to_path_buf())
    }

    /// Drafts a README from the artifacts of a previous run. The structure
    /// and code artifacts must exist; a missing dependency artifact is
    /// substituted with a note.
    pub async fn generate_readme(
        &self,
        settings: &AnalysisSettings,
    ) -> Result<PathBuf, AnalysisError> {
        let writer = AnalysisWriter::new(&settings.path, self.config.output_directory.as_deref());
        let (provider, model) = self
            .registry
            .resolve(settings.model.as_deref().unwrap_or_default())?;
        let opts = self.inference_options(settings, Some(model));

        let structure = writer.read_artifact(STRUCTURE_ARTIFACT)?;
        let code = writer.read_artifact(CODE_ARTIFACT)?;
        let dependency = writer
            .read_artifact(DEPENDENCY_ARTIFACT)
            .unwrap_or_else(|_| "No dependency analysis was produced.".to_string());

        let output = provider
            .generate_readme(&structure, &dependency, &code, &opts)
            .await;
        let text = collect_output(output).await?;
        Ok(writer.write_artifact(README_ARTIFACT, &text, false)?)
    }

    fn inference_options(
        &self,
        settings: &AnalysisSettings,
        model: Option<String>,
    ) -> InferenceOptions {
        InferenceOptions {
            allow_streaming: settings.stream,
            verbose: settings.verbose,
            user_expertise: settings
                .expertise
                .clone()
                .or_else(|| self.config.user_expertise.clone()),
            model,
        }
    }

    async fn read_tree(&self, root: &Path, extra: &[String]) -> Result<FileNode, AnalysisError> {
        let mut patterns: Vec<String> = self.config.ignore_patterns.iter().cloned().collect();
        patterns.extend(extra.iter().cloned());
        let root = root.to_path_buf();
        let tree =
            tokio::task::spawn_blocking(move || DirectoryScanner::new(patterns).scan(&root))
                .await??;
        Ok(tree)
    }

    /// Analyzes every directory the classification listed. A member failure
    /// is recorded under `errors/` and the loop moves on.
    async fn run_monorepo(
        &self,
        ctx: &RunContext<'_>,
        project_root: &Path,
        shape: &ProjectShape,
    ) -> Result<(), AnalysisError> {
        if shape.directories.is_empty() {
            warn!("Monorepo classification listed no directories; nothing to analyze");
            return Ok(());
        }
        for directory in &shape.directories {
            let relative = directory.trim().trim_matches('/');
            if relative.is_empty() {
                continue;
            }
            let label = relative.replace('/', "-");
            info!("Analyzing {}", relative);
            if let Err(e) = self.run_member(ctx, project_root, relative, &label).await {
                error!("Analysis of {} failed: {}", relative, e);
                let message = format!("Analysis of {relative} failed: {e}");
                if let Err(write_err) = ctx.writer.write_error(&label, &format!("{e:?}"), &message)
                {
                    error!("Could not record the failure: {}", write_err);
                }
            }
        }
        Ok(())
    }

    async fn run_member(
        &self,
        ctx: &RunContext<'_>,
        project_root: &Path,
        relative: &str,
        label: &str,
    ) -> Result<(), AnalysisError> {
        let member_root = project_root.join(relative);
        let tree = self.read_tree(&member_root, ctx.extra_ignores).await?;
        let structure_json = serde_json::to_string(&strip_content(&tree))?;

        // Members are classified in isolation; their shape stays in memory.
        let raw_shape = ctx
            .provider
            .infer_project_shape(&structure_json, &ctx.opts)
            .await?;
        let shape = parse_shape(&raw_shape)?;
        if non_blank(&shape.programming_language).is_none() {
            return Err(AnalysisError::MissingLanguage);
        }
        self.run_single(ctx, &member_root, &shape, &tree, Some(label))
            .await
    }

    /// Produces the dependency and code artifacts for one codebase. A failed
    /// inference is replaced by a placeholder section instead of aborting.
    async fn run_single(
        &self,
        ctx: &RunContext<'_>,
        codebase_root: &Path,
        shape: &ProjectShape,
        tree: &FileNode,
        label: Option<&str>,
    ) -> Result<(), AnalysisError> {
        let prefix = label.map(|l| format!("{l}-")).unwrap_or_default();

        if let Some(manifest) = non_blank(&shape.dependencies_file) {
            let text = match self
                .dependency_report(ctx, codebase_root, manifest, shape)
                .await
            {
                Ok(text) => text,
                Err(e) => {
                    error!("Dependency inference failed: {}", e);
                    format!("Dependency analysis failed: {e}")
                }
            };
            ctx.writer
                .write_artifact(&format!("{prefix}{DEPENDENCY_ARTIFACT}"), &text, false)?;
        } else {
            info!("No dependency manifest classified; skipping dependency inference");
        }

        let language = non_blank(&shape.tree_sitter_language)
            .or_else(|| non_blank(&shape.programming_language))
            .unwrap_or_default();
        let pruned = prune_for_code_inference(
            tree,
            non_blank(&shape.lock_file),
            language,
            self.summarizer.as_ref(),
        );
        let pruned_json = serde_json::to_string(&pruned)?;
        debug!(
            "Code inference payload is ~{} tokens",
            tokens::approximate_tokens(&pruned_json)
        );

        let mut sections = Vec::new();
        match collect_output(ctx.provider.infer_code(&pruned_json, &ctx.opts).await).await {
            Ok(text) => sections.push(text),
            Err(e) => {
                error!("Code inference failed: {}", e);
                sections.push(format!("Code analysis failed: {e}"));
            }
        }
        match collect_output(
            ctx.provider
                .infer_interesting_code(&pruned_json, &ctx.opts)
                .await,
        )
        .await
        {
            Ok(text) => sections.push(text),
            Err(e) => {
                error!("Interesting-code inference failed: {}", e);
                sections.push(format!("Interesting-code analysis failed: {e}"));
            }
        }
        ctx.writer.write_artifact(
            &format!("{prefix}{CODE_ARTIFACT}"),
            &sections.join("\n\n---\n\n"),
            false,
        )?;
        Ok(())
    }

    async fn dependency_report(
        &self,
        ctx: &RunContext<'_>,
        codebase_root: &Path,
        manifest: &str,
        shape: &ProjectShape,
    ) -> Result<String, AnalysisError> {
        let path = codebase_root.join(manifest);
        let manifest_text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| AnalysisError::Io(e, path))?;
        let workflow = non_blank(&shape.workflow).unwrap_or_default();
        let output = ctx
            .provider
            .infer_dependency(&manifest_text, workflow, &ctx.opts)
            .await;
        Ok(collect_output(output).await?)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Recursive clone with every file's content removed.
fn strip_content(node: &FileNode) -> FileNode {
    FileNode {
        name: node.name.clone(),
        content: None,
        children: node
            .children
            .as_ref()
            .map(|children| children.iter().map(strip_content).collect()),
    }
}

/// Prepares a tree for code inference: the classified lock file is dropped
/// at every depth and oversized file contents are swapped for outlines. A
/// file the summarizer cannot outline keeps its raw content.
fn prune_for_code_inference(
    node: &FileNode,
    lock_file: Option<&str>,
    language: &str,
    summarizer: &dyn CodeSummarizer,
) -> FileNode {
    let children = node.children.as_ref().map(|children| {
        children
            .iter()
            .filter(|child| Some(child.name.as_str()) != lock_file)
            .map(|child| prune_for_code_inference(child, lock_file, language, summarizer))
            .collect()
    });
    let content = match &node.content {
        Some(text) if tokens::approximate_tokens(text) > PER_FILE_TOKEN_THRESHOLD => {
            summarizer.summarize(language, text).or_else(|| Some(text.clone()))
        }
        other => other.clone(),
    };
    FileNode {
        name: node.name.clone(),
        content,
        children,
    }
}

/// Collects one inference result, echoing streamed fragments to stdout as
/// they arrive.
async fn collect_output(
    result: Result<InferenceOutput, ProviderError>,
) -> Result<String, ProviderError> {
    match result? {
        InferenceOutput::Text(text) => Ok(text),
        InferenceOutput::Stream(mut stream) => {
            use std::io::Write as _;
            let mut collected = String::new();
            while let Some(chunk) = stream.recv().await {
                let chunk = chunk?;
                print!("{chunk}");
                let _ = std::io::stdout().flush();
                collected.push_str(&chunk);
            }
            println!();
            Ok(collected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> FileNode {
        FileNode::directory(
            "app",
            vec![
                FileNode::file("main.rs", Some("fn main() {}".to_string())),
                FileNode::file("Cargo.lock", Some("[[package]]".to_string())),
                FileNode::directory(
                    "src",
                    vec![
                        FileNode::file("lib.rs", Some("pub fn run() {}".to_string())),
                        FileNode::file("Cargo.lock", Some("[[package]]".to_string())),
                    ],
                ),
            ],
        )
    }

    #[test]
    fn test_strip_content_keeps_structure_only() {
        let stripped = strip_content(&sample_tree());
        assert_eq!(stripped.name, "app");
        let main = stripped.child("main.rs").unwrap();
        assert_eq!(main.content, None);
        assert!(!main.is_directory());
        let src = stripped.child("src").unwrap();
        assert!(src.is_directory());
        assert_eq!(src.child("lib.rs").unwrap().content, None);
    }

    #[test]
    fn test_prune_drops_the_lock_file_at_every_depth() {
        let pruned = prune_for_code_inference(
            &sample_tree(),
            Some("Cargo.lock"),
            "Rust",
            &OutlineSummarizer,
        );
        assert!(pruned.child("Cargo.lock").is_none());
        assert!(pruned.child("src").unwrap().child("Cargo.lock").is_none());
        assert!(pruned.child("main.rs").is_some());
    }

    #[test]
    fn test_prune_keeps_small_files_verbatim() {
        let pruned = prune_for_code_inference(&sample_tree(), None, "Rust", &OutlineSummarizer);
        assert_eq!(
            pruned.child("main.rs").unwrap().content.as_deref(),
            Some("fn main() {}")
        );
    }

    #[test]
    fn test_prune_outlines_oversized_files() {
        let mut body = String::from("pub fn entry() {\n");
        for _ in 0..600 {
            body.push_str("    let value = compute(value);\n");
        }
        body.push_str("}\n");
        let tree = FileNode::directory("app", vec![FileNode::file("big.rs", Some(body))]);

        let pruned = prune_for_code_inference(&tree, None, "Rust", &OutlineSummarizer);
        let content = pruned.child("big.rs").unwrap().content.as_deref().unwrap();
        assert!(content.starts_with("[structural outline"));
        assert!(!content.contains("let value"));
    }

    #[test]
    fn test_parse_shape_maps_camel_case_fields() {
        let shape = parse_shape(
            r#"{"isMonorepo":false,"programmingLanguage":"Rust","dependenciesFile":"Cargo.toml","lockFile":"Cargo.lock","workflow":"cargo"}"#,
        )
        .unwrap();
        assert!(!shape.is_monorepo);
        assert_eq!(shape.programming_language.as_deref(), Some("Rust"));
        assert_eq!(shape.dependencies_file.as_deref(), Some("Cargo.toml"));
        assert_eq!(shape.lock_file.as_deref(), Some("Cargo.lock"));
        assert_eq!(shape.workflow.as_deref(), Some("cargo"));
    }

    #[test]
    fn test_parse_shape_defaults_absent_fields() {
        let shape = parse_shape(r#"{"isMonorepo":true,"directories":["api","web"]}"#).unwrap();
        assert!(shape.is_monorepo);
        assert_eq!(shape.directories, vec!["api", "web"]);
        assert_eq!(shape.programming_language, None);
    }

    #[test]
    fn test_unparseable_classification_is_an_error() {
        assert!(matches!(
            parse_shape("not json"),
            Err(AnalysisError::Classification(_))
        ));
    }

    #[test]
    fn test_missing_language_error_names_the_condition() {
        let message = AnalysisError::MissingLanguage.to_string();
        assert!(message.contains("Programming language not defined for non-monorepo project"));
    }

    #[tokio::test]
    async fn test_collect_output_returns_plain_text_untouched() {
        let text = collect_output(Ok(InferenceOutput::Text("done".to_string())))
            .await
            .unwrap();
        assert_eq!(text, "done");
    }

    #[tokio::test]
    async fn test_collect_output_drains_a_stream_in_order() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tx.send(Ok("first ".to_string())).unwrap();
        tx.send(Ok("second".to_string())).unwrap();
        drop(tx);

        let text = collect_output(Ok(InferenceOutput::Stream(rx))).await.unwrap();
        assert_eq!(text, "first second");
    }
}
