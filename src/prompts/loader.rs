use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::errors::ScanError;

/// Values substituted for `{{NAME}}` placeholders.
pub type PromptVariables = BTreeMap<String, String>;

const MAX_INCLUDE_DEPTH: u8 = 5;

static INCLUDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@include\(([^)]+)\)").expect("include pattern"));
static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([A-Z][A-Z0-9_]*)\}\}").expect("placeholder pattern"));

/// Templates compiled into the binary. Files in the override directory win.
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("system/injection-detect", include_str!("../../prompts/system/injection-detect.txt")),
    ("system/injection-exploit", include_str!("../../prompts/system/injection-exploit.txt")),
    ("tasks/injection-detect", include_str!("../../prompts/tasks/injection-detect.txt")),
    ("tasks/injection-exploit", include_str!("../../prompts/tasks/injection-exploit.txt")),
    ("tasks/injection-exploit-step", include_str!("../../prompts/tasks/injection-exploit-step.txt")),
    ("shared/_target", include_str!("../../prompts/shared/_target.txt")),
    ("shared/_scope", include_str!("../../prompts/shared/_scope.txt")),
    ("shared/_directive-format", include_str!("../../prompts/shared/_directive-format.txt")),
];

/// Loads prompt templates, resolves @include directives and fills placeholders.
pub struct PromptLoader {
    override_dir: Option<PathBuf>,
}

impl PromptLoader {
    pub fn new(override_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = &override_dir {
            debug!(dir = %dir.display(), "PromptLoader using override directory");
        }
        Self { override_dir }
    }

    pub fn builtin() -> Self {
        Self::new(None)
    }

    /// Load a template by name (without .txt extension), processing @include directives.
    pub fn load(&self, name: &str) -> Result<String, ScanError> {
        let content = self.read(name)?;
        self.process_includes(&content, 0)
    }

    /// Load and interpolate. Any placeholder left without a value is an error.
    pub fn render(&self, name: &str, vars: &PromptVariables) -> Result<String, ScanError> {
        let template = self.load(name)?;
        interpolate(&template, vars)
            .map_err(|missing| ScanError::Template(format!("{}: unresolved placeholders {}", name, missing)))
    }

    /// Render every template against the variable names its caller supplies,
    /// so a broken override fails before any traffic is sent.
    pub fn preflight(&self, templates: &[(&str, &[&str])]) -> Result<(), ScanError> {
        for (name, supplied) in templates {
            let vars: PromptVariables = supplied
                .iter()
                .map(|v| (v.to_string(), format!("<{v}>")))
                .collect();
            self.render(name, &vars)?;
        }
        debug!(count = templates.len(), "Prompt templates validated");
        Ok(())
    }

    fn read(&self, name: &str) -> Result<String, ScanError> {
        let name = name.trim().trim_end_matches(".txt");
        if let Some(dir) = &self.override_dir {
            let file_path = dir.join(format!("{}.txt", name));
            if file_path.exists() {
                return std::fs::read_to_string(&file_path).map_err(|e| {
                    ScanError::Template(format!("Failed to read prompt {}: {}", file_path.display(), e))
                });
            }
        }
        BUILTIN_TEMPLATES
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .map(|(_, content)| content.to_string())
            .ok_or_else(|| ScanError::Template(format!("Prompt template not found: {}", name)))
    }

    /// Process @include(path) directives recursively with depth limit.
    fn process_includes(&self, content: &str, depth: u8) -> Result<String, ScanError> {
        if depth >= MAX_INCLUDE_DEPTH {
            return Err(ScanError::Template(format!(
                "Include depth limit ({}) exceeded, possible circular include",
                MAX_INCLUDE_DEPTH
            )));
        }

        let mut result = content.to_string();
        // Collect matches first to avoid borrow issues
        let matches: Vec<(String, String)> = INCLUDE_RE
            .captures_iter(content)
            .map(|cap| (cap[0].to_string(), cap[1].to_string()))
            .collect();

        for (full_match, include_path) in matches {
            let included = self.read(&include_path).map_err(|_| {
                ScanError::Template(format!("Included template not found: @include({})", include_path))
            })?;
            let processed = self.process_includes(&included, depth + 1)?;
            result = result.replace(&full_match, processed.trim_end());
        }

        Ok(result)
    }
}

/// Single-pass substitution: values are never rescanned, so target content
/// containing `{{...}}` passes through untouched. Returns the sorted list of
/// unknown names on failure.
pub fn interpolate(template: &str, vars: &PromptVariables) -> Result<String, String> {
    let mut missing = BTreeSet::new();
    let rendered = PLACEHOLDER_RE.replace_all(template, |cap: &Captures| match vars.get(&cap[1]) {
        Some(value) => value.clone(),
        None => {
            missing.insert(cap[1].to_string());
            cap[0].to_string()
        }
    });
    if missing.is_empty() {
        Ok(rendered.into_owned())
    } else {
        Err(missing.into_iter().collect::<Vec<_>>().join(", "))
    }
}
