// src/core/artifacts.rs — Output directory ownership (build context + log)

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use crate::infra::errors::{DockersmithError, Result};

pub const DOCKERFILE_NAME: &str = "Dockerfile";
pub const LOG_FILE_NAME: &str = "dockersmith.log";
const DOCKERIGNORE_NAME: &str = ".dockerignore";

const DOCKERIGNORE: &str = "\
.git
.gitignore
*.pyc
__pycache__/
.pytest_cache/
.coverage
.env
.venv
venv/
node_modules/
.DS_Store
*.log
.idea/
.vscode/
*.swp
*.swo
*~
";

/// Where output directories are allowed to live.
#[derive(Debug, Clone)]
pub struct OutputPolicy {
    pub root: PathBuf,
}

impl OutputPolicy {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `dir` and check it stays under the root. Relative paths are
    /// taken relative to the root.
    pub fn resolve(&self, dir: &Path) -> Result<PathBuf> {
        let base = std::path::absolute(&self.root)?;
        let root = resolve_existing_prefix(&normalize(&base));
        let joined = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            base.join(dir)
        };
        let resolved = resolve_existing_prefix(&normalize(&joined));

        if !resolved.starts_with(&root) {
            return Err(DockersmithError::UnsafeOutputPath {
                path: dir.to_path_buf(),
                root,
            });
        }
        Ok(resolved)
    }
}

/// Lexically remove `.` and fold `..` into the parent.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the longest existing ancestor so symlinks cannot smuggle the
/// path elsewhere, then re-append the components that do not exist yet.
fn resolve_existing_prefix(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut rest: Vec<std::ffi::OsString> = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut out = canonical;
            for part in rest.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match existing.file_name() {
            Some(name) => {
                rest.push(name.to_os_string());
                if !existing.pop() {
                    return path.to_path_buf();
                }
            }
            None => return path.to_path_buf(),
        }
    }
}

/// The per-run output directory. Everything in it forms the build context.
#[derive(Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
    copied_script: Option<String>,
}

impl ArtifactStore {
    /// Check `dir` against the policy and create it.
    pub fn open(dir: &Path, policy: &OutputPolicy) -> Result<Self> {
        let dir = policy.resolve(dir)?;
        fs::create_dir_all(&dir)?;
        tracing::debug!("Output directory: {}", dir.display());
        Ok(Self {
            dir,
            copied_script: None,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn dockerfile_path(&self) -> PathBuf {
        self.dir.join(DOCKERFILE_NAME)
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE_NAME)
    }

    /// Replace the Dockerfile atomically. On failure the previous file stays.
    pub fn write_dockerfile(&self, text: &str) -> Result<()> {
        let path = self.dockerfile_path();
        let tmp_path = self.dir.join(format!("{}.tmp", DOCKERFILE_NAME));

        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(text.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp_path, &path)
        };

        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }

    /// Current on-disk Dockerfile, if any.
    pub fn read_dockerfile(&self) -> Result<Option<String>> {
        match fs::read_to_string(self.dockerfile_path()) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Append a timestamped section to the run log.
    pub fn append_log(&self, attempt: Option<u32>, stage: &str, text: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;

        let ts = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let header = match attempt {
            Some(i) => format!("=== [{}] attempt {} / {} ===", ts, i + 1, stage),
            None => format!("=== [{}] {} ===", ts, stage),
        };
        writeln!(file, "{}", header)?;
        file.write_all(text.as_bytes())?;
        if !text.ends_with('\n') {
            writeln!(file)?;
        }
        writeln!(file)?;
        Ok(())
    }

    /// Copy the subject script into the build context. Once per run.
    pub fn copy_script(&mut self, source: &Path) -> Result<PathBuf> {
        if let Some(name) = &self.copied_script {
            return Err(DockersmithError::ScriptAlreadyCopied { name: name.clone() });
        }
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| DockersmithError::InvalidScript {
                path: source.to_path_buf(),
                reason: "path has no file name".into(),
            })?;

        let target = self.dir.join(&name);
        // Source may already live in the output directory.
        let same_file = match (source.canonicalize(), target.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };
        if !same_file {
            fs::copy(source, &target)?;
        }
        self.copied_script = Some(name);
        Ok(target)
    }

    /// Write the standard `.dockerignore` unless one exists. Returns whether
    /// a file was written.
    pub fn write_dockerignore(&self) -> Result<bool> {
        let path = self.dir.join(DOCKERIGNORE_NAME);
        if path.exists() {
            return Ok(false);
        }
        fs::write(&path, DOCKERIGNORE)?;
        Ok(true)
    }
}
