// src/analyzer.rs — Heuristic script analysis
//
// Produces a ScriptProfile from a script on disk: language, third-party
// dependencies, runtime hints, and a recommended base image. No network.

use regex::Regex;
use std::path::Path;

use crate::core::types::{Language, ScriptProfile};
use crate::infra::errors::{DockersmithError, Result};

/// Scripts larger than this are rejected.
pub const MAX_SCRIPT_BYTES: u64 = 1024 * 1024;

const PYTHON_STDLIB: &[&str] = &[
    "abc", "argparse", "asyncio", "base64", "collections", "contextlib", "copy", "csv",
    "dataclasses", "datetime", "decimal", "enum", "functools", "glob", "hashlib", "http",
    "io", "itertools", "json", "logging", "math", "os", "pathlib", "pickle", "platform",
    "random", "re", "shutil", "signal", "socket", "sqlite3", "string", "subprocess", "sys",
    "tempfile", "textwrap", "threading", "time", "typing", "unittest", "urllib", "uuid",
    "__future__",
];

const NODE_BUILTINS: &[&str] = &[
    "assert", "buffer", "child_process", "crypto", "events", "fs", "http", "https", "net",
    "os", "path", "process", "querystring", "readline", "stream", "url", "util", "zlib",
];

/// Import names whose PyPI distribution is named differently.
const PYPI_NAMES: &[(&str, &str)] = &[
    ("bs4", "beautifulsoup4"),
    ("cv2", "opencv-python"),
    ("dateutil", "python-dateutil"),
    ("dotenv", "python-dotenv"),
    ("PIL", "pillow"),
    ("sklearn", "scikit-learn"),
    ("yaml", "pyyaml"),
];

const LANGUAGE_PATTERNS: &[(Language, &[&str])] = &[
    (
        Language::Python,
        &[r"^\s*import ", r"^\s*from \S+ import", r"^\s*def ", r"if __name__"],
    ),
    (
        Language::JavaScript,
        &[r"require\(", r"console\.log", r"function ", r"^\s*const ", r"^\s*let "],
    ),
    (
        Language::Bash,
        &[r"^\s*echo ", r"^\s*if \[", r"^\s*for \w+ in ", r"^\s*fi\s*$", r"\$\{?\w+\}?"],
    ),
];

pub struct ScriptAnalyzer {
    language_patterns: Vec<(Language, Vec<Regex>)>,
    py_import: Regex,
    py_from: Regex,
    js_require: Regex,
    js_import: Regex,
}

impl Default for ScriptAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptAnalyzer {
    pub fn new() -> Self {
        let language_patterns = LANGUAGE_PATTERNS
            .iter()
            .map(|(lang, patterns)| {
                let compiled = patterns
                    .iter()
                    .map(|p| Regex::new(&format!("(?mi){}", p)).expect("valid regex"))
                    .collect();
                (*lang, compiled)
            })
            .collect();

        Self {
            language_patterns,
            py_import: Regex::new(r"(?m)^\s*import\s+([^#\n]+)").expect("valid regex"),
            py_from: Regex::new(r"(?m)^\s*from\s+([A-Za-z_][\w.]*)\s+import\b")
                .expect("valid regex"),
            js_require: Regex::new(r#"require\(\s*['"]([^'"]+)['"]\s*\)"#).expect("valid regex"),
            js_import: Regex::new(r#"(?m)^\s*import\s+(?:[^'"]*?\s+from\s+)?['"]([^'"]+)['"]"#)
                .expect("valid regex"),
        }
    }

    /// Read and analyze a script on disk.
    pub fn analyze(&self, path: &Path) -> Result<ScriptProfile> {
        let invalid = |reason: &str| DockersmithError::InvalidScript {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let meta = std::fs::metadata(path).map_err(|e| invalid(&e.to_string()))?;
        if !meta.is_file() {
            return Err(invalid("not a regular file"));
        }
        if meta.len() > MAX_SCRIPT_BYTES {
            return Err(invalid(&format!(
                "larger than {} bytes",
                MAX_SCRIPT_BYTES
            )));
        }
        let bytes = std::fs::read(path)?;
        let content = String::from_utf8(bytes).map_err(|_| invalid("not valid UTF-8 text"))?;

        let profile = self.analyze_source(path, &content);
        tracing::info!(
            "Analyzed {}: {} ({} dependencies)",
            path.display(),
            profile.language,
            profile.dependencies.len()
        );
        Ok(profile)
    }

    /// Analyze script text that is already in memory.
    pub fn analyze_source(&self, path: &Path, content: &str) -> ScriptProfile {
        let language = self.detect_language(path, content);
        let mut profile = ScriptProfile::new(path, language)
            .with_dependencies(self.extract_dependencies(content, language));
        profile.runtime_version = runtime_version(content, language);
        profile.base_image = base_image(language, profile.runtime_version.as_deref());
        profile
    }

    /// Extension first, then shebang, then content scoring.
    pub fn detect_language(&self, path: &Path, content: &str) -> Language {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());
        match ext.as_deref() {
            Some("py") => return Language::Python,
            Some("js" | "mjs" | "cjs" | "ts") => return Language::JavaScript,
            Some("sh" | "bash") => return Language::Bash,
            _ => {}
        }

        if let Some(lang) = shebang_language(content) {
            return lang;
        }

        let mut best = (Language::Unknown, 0usize);
        for (lang, patterns) in &self.language_patterns {
            let score: usize = patterns.iter().map(|re| re.find_iter(content).count()).sum();
            if score > best.1 {
                best = (*lang, score);
            }
        }
        best.0
    }

    /// Third-party dependencies in order of first appearance.
    pub fn extract_dependencies(&self, content: &str, language: Language) -> Vec<String> {
        let mut found: Vec<(usize, String)> = Vec::new();

        match language {
            Language::Python => {
                for cap in self.py_import.captures_iter(content) {
                    let Some(m) = cap.get(1) else { continue };
                    for item in m.as_str().split(',') {
                        let module = item.split_whitespace().next().unwrap_or("");
                        if let Some(name) = top_level_python(module) {
                            found.push((m.start(), name));
                        }
                    }
                }
                for cap in self.py_from.captures_iter(content) {
                    let Some(m) = cap.get(1) else { continue };
                    if let Some(name) = top_level_python(m.as_str()) {
                        found.push((m.start(), name));
                    }
                }
            }
            Language::JavaScript => {
                for re in [&self.js_require, &self.js_import] {
                    for cap in re.captures_iter(content) {
                        let Some(m) = cap.get(1) else { continue };
                        if let Some(name) = npm_package(m.as_str()) {
                            found.push((m.start(), name));
                        }
                    }
                }
            }
            Language::Bash | Language::Unknown => {}
        }

        found.sort_by_key(|(pos, _)| *pos);
        let mut deps: Vec<String> = Vec::new();
        for (_, name) in found {
            if !deps.contains(&name) {
                deps.push(name);
            }
        }
        deps
    }
}

fn shebang_language(content: &str) -> Option<Language> {
    let first = content.lines().next()?;
    let interp = first.strip_prefix("#!")?;
    if interp.contains("python") {
        Some(Language::Python)
    } else if interp.contains("node") {
        Some(Language::JavaScript)
    } else if interp.contains("bash") || interp.trim_end().ends_with("sh") {
        Some(Language::Bash)
    } else {
        None
    }
}

/// Top-level package for a Python module path, or None for stdlib and
/// relative imports.
fn top_level_python(module: &str) -> Option<String> {
    if module.is_empty() || module.starts_with('.') {
        return None;
    }
    let top = module.split('.').next()?;
    if top.is_empty() || PYTHON_STDLIB.contains(&top) {
        return None;
    }
    let name = PYPI_NAMES
        .iter()
        .find(|(import, _)| *import == top)
        .map(|(_, dist)| *dist)
        .unwrap_or(top);
    Some(name.to_string())
}

/// npm package for a module specifier, or None for builtins and local files.
fn npm_package(spec: &str) -> Option<String> {
    if spec.starts_with('.') || spec.starts_with('/') || spec.starts_with("node:") {
        return None;
    }
    let mut parts = spec.split('/');
    let first = parts.next()?;
    let name = if first.starts_with('@') {
        format!("{}/{}", first, parts.next()?)
    } else {
        first.to_string()
    };
    if NODE_BUILTINS.contains(&name.as_str()) {
        return None;
    }
    Some(name)
}

fn runtime_version(content: &str, language: Language) -> Option<String> {
    match language {
        Language::Python => {
            let py3 = ["print(", "f\"", "f'", "async def", "->"]
                .iter()
                .any(|k| content.contains(k));
            let py2 = content
                .lines()
                .any(|l| l.trim_start().starts_with("print ") && !l.contains("print("));
            if py2 && !py3 {
                Some("2.7".into())
            } else {
                Some("3.11".into())
            }
        }
        Language::JavaScript => Some("18".into()),
        Language::Bash | Language::Unknown => None,
    }
}

fn base_image(language: Language, version: Option<&str>) -> Option<String> {
    match language {
        Language::Python if version == Some("2.7") => Some("python:2.7-slim".into()),
        Language::Python => Some("python:3.11-slim".into()),
        Language::JavaScript => Some("node:18-alpine".into()),
        Language::Bash => Some("ubuntu:22.04".into()),
        Language::Unknown => None,
    }
}
