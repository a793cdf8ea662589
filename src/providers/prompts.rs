//! Prompt text and the classification schema shared by every provider.
//!
//! Each vendor derives its own tool/function payload from the single static
//! field table below, so the classification contract cannot drift between
//! providers.

use serde_json::{json, Value};

pub const CLASSIFY_SYSTEM: &str = "You are a senior software engineer surveying an unfamiliar \
repository. You are given a JSON directory tree of the project with file contents removed. \
Classify the project by calling the provided tool. If the repository holds several independently \
buildable codebases, mark it as a monorepo and list the sub-directories; otherwise identify the \
primary language, framework, dependency manifest, lock file, entry point and build workflow.";

pub const DEPENDENCY_SYSTEM: &str = "You are a senior software engineer documenting a project's \
dependencies. You are given the contents of a dependency manifest and the name of the build \
workflow it belongs to. For each dependency, explain in one or two sentences what it provides \
and how this project likely uses it. Group runtime and development dependencies separately. \
Answer in Markdown.";

pub const CODE_SYSTEM: &str = "You are a senior software engineer writing an onboarding guide. \
You are given a JSON directory tree of a project including file contents. Walk a new team member \
through the codebase: what each significant file does, how the pieces connect, and where \
execution starts. Be concrete and reference files by name. Answer in Markdown.";

pub const INTERESTING_CODE_SYSTEM: &str = "You are a senior software engineer reviewing a \
codebase. You are given a JSON directory tree of a project including file contents. Point out \
the handful of places genuinely worth a close read: non-obvious algorithms, tricky control \
flow, clever data structures or load-bearing configuration. Quote short excerpts and explain \
why each one matters. Answer in Markdown.";

pub const README_SYSTEM: &str = "You are a senior software engineer writing a README for a \
project you have just analyzed. You are given the project's directory structure, a summary of \
its dependencies and a walkthrough of its code. Produce a complete README.md: what the project \
does, how it is laid out, how to install its dependencies and how to get started. Answer in \
Markdown only, with no surrounding commentary.";

/// Wraps the reader's background in a fixed tag ahead of the instructions.
/// Blank expertise leaves the prompt untouched.
pub fn compose_system_prompt(base: &str, user_expertise: Option<&str>) -> String {
    match user_expertise.map(str::trim).filter(|e| !e.is_empty()) {
        Some(expertise) => {
            format!("<user-expertise>{expertise}</user-expertise>\n\n{base}")
        }
        None => base.to_string(),
    }
}

pub fn classify_user_prompt(tree_json: &str) -> String {
    format!("Project directory tree (contents omitted):\n\n{tree_json}")
}

pub fn dependency_user_prompt(dependency_file: &str, workflow: &str) -> String {
    format!("Workflow: {workflow}\n\nDependency manifest:\n\n{dependency_file}")
}

pub fn code_user_prompt(tree_json: &str) -> String {
    format!("Project directory tree with file contents:\n\n{tree_json}")
}

pub fn readme_user_prompt(
    directory_structure: &str,
    dependency_inference: &str,
    code_inference: &str,
) -> String {
    format!(
        "Directory structure:\n\n{directory_structure}\n\nDependency analysis:\n\n\
{dependency_inference}\n\nCode analysis:\n\n{code_inference}"
    )
}

/// Name of the classification tool across all vendors.
pub const CLASSIFICATION_TOOL_NAME: &str = "classify_project";

pub const CLASSIFICATION_TOOL_DESCRIPTION: &str =
    "Record the classification of the analyzed repository.";

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Bool,
    String,
    StringArray,
}

/// One field of the classification result.
#[derive(Debug, Clone, Copy)]
pub struct SchemaField {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
    pub required: bool,
}

/// The full classification contract. Field names are part of the wire format
/// consumed by the orchestrator's parser.
pub const CLASSIFICATION_FIELDS: &[SchemaField] = &[
    SchemaField {
        name: "isMonorepo",
        kind: FieldKind::Bool,
        description: "Whether the repository contains multiple independently buildable codebases.",
        required: true,
    },
    SchemaField {
        name: "directories",
        kind: FieldKind::StringArray,
        description: "Top-level directories that each hold an independent codebase; monorepos only.",
        required: false,
    },
    SchemaField {
        name: "programmingLanguage",
        kind: FieldKind::String,
        description: "Primary programming language of the codebase.",
        required: false,
    },
    SchemaField {
        name: "framework",
        kind: FieldKind::String,
        description: "Main application framework, when one is identifiable.",
        required: false,
    },
    SchemaField {
        name: "dependenciesFile",
        kind: FieldKind::String,
        description: "Name of the dependency manifest, for example package.json or Cargo.toml.",
        required: false,
    },
    SchemaField {
        name: "lockFile",
        kind: FieldKind::String,
        description: "Name of the dependency lock file, when present.",
        required: false,
    },
    SchemaField {
        name: "entryPointFile",
        kind: FieldKind::String,
        description: "File where execution starts.",
        required: false,
    },
    SchemaField {
        name: "workflow",
        kind: FieldKind::String,
        description: "Build and runtime workflow, for example nodejs, cargo or maven.",
        required: false,
    },
    SchemaField {
        name: "treeSitterLanguage",
        kind: FieldKind::String,
        description: "tree-sitter grammar name matching the primary language.",
        required: false,
    },
];

/// JSON Schema object for the classification result, shared by every vendor
/// payload.
pub fn classification_schema() -> Value {
    let mut properties = serde_json::Map::new();
    for field in CLASSIFICATION_FIELDS {
        let value = match field.kind {
            FieldKind::Bool => json!({"type": "boolean", "description": field.description}),
            FieldKind::String => json!({"type": "string", "description": field.description}),
            FieldKind::StringArray => json!({
                "type": "array",
                "items": {"type": "string"},
                "description": field.description,
            }),
        };
        properties.insert(field.name.to_string(), value);
    }
    let required: Vec<&str> = CLASSIFICATION_FIELDS
        .iter()
        .filter(|f| f.required)
        .map(|f| f.name)
        .collect();

    json!({
        "type": "object",
        "properties": Value::Object(properties),
        "required": required,
    })
}
