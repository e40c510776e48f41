//! Per-job working directory.
//!
//! A workspace lives at `<root>/<task>_<nonce>_app` and is owned by exactly
//! one job. Round 1 wipes and recreates it; later rounds reuse it in place so
//! the generator sees whatever a previous attempt left behind.

use std::path::{Component, Path, PathBuf};

use chrono::Datelike;
use walkdir::WalkDir;

use crate::errors::JobError;
use crate::util::sanitize_name;

use super::models::JobRequest;

pub const ATTACHMENTS_DIR: &str = "attachments";

/// Files above this size are left out of the generator's view of prior output.
const MAX_SNAPSHOT_FILE_BYTES: u64 = 256 * 1024;

/// A text file already present in the workspace.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceFile {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

/// Validate a caller- or model-supplied relative path.
///
/// Rejects absolute paths, `..` components, and anything under `.git`.
/// `.` components are dropped. Returns `None` for an empty result.
pub fn safe_relative_path(raw: &str) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in Path::new(raw.trim()).components() {
        match component {
            Component::Normal(part) => {
                if clean.as_os_str().is_empty() && part == ".git" {
                    return None;
                }
                clean.push(part);
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}

impl Workspace {
    pub fn dir_name(task: &str, nonce: &str) -> String {
        format!("{}_{}_app", sanitize_name(task, 80), sanitize_name(nonce, 64))
    }

    /// Create (round 1: recreate) the workspace for `request` under `base`.
    pub async fn prepare(base: &Path, request: &JobRequest) -> Result<Self, JobError> {
        let root = base.join(Self::dir_name(&request.task, &request.nonce));
        let io_err = |source| JobError::Workspace {
            path: root.clone(),
            source,
        };

        if !request.is_revision() && tokio::fs::try_exists(&root).await.map_err(io_err)? {
            tracing::debug!(path = %root.display(), "Wiping existing workspace for round 1");
            tokio::fs::remove_dir_all(&root).await.map_err(io_err)?;
        }
        tokio::fs::create_dir_all(&root).await.map_err(io_err)?;

        Ok(Self { root })
    }

    /// Wrap an existing directory without touching it.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Write `content` at the workspace-relative `relative`, creating parents.
    pub async fn write_file(&self, relative: &Path, content: &[u8]) -> Result<PathBuf, JobError> {
        let target = self.root.join(relative);
        let io_err = |source| JobError::Workspace {
            path: target.clone(),
            source,
        };
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&target, content).await.map_err(io_err)?;
        Ok(target)
    }

    /// Write the license, the brief-derived README and the `.nojekyll` marker.
    /// Overwrites whatever the generator produced under those names.
    pub async fn write_boilerplate(&self, request: &JobRequest, holder: &str) -> Result<(), JobError> {
        let year = chrono::Utc::now().year();
        self.write_file(Path::new("LICENSE"), license_text(year, holder).as_bytes())
            .await?;
        self.write_file(Path::new("README.md"), readme_text(request).as_bytes())
            .await?;
        self.write_file(Path::new(".nojekyll"), b"").await?;
        Ok(())
    }

    /// Text files currently in the workspace, excluding VCS metadata and
    /// attachments. Non-UTF-8 bytes are replaced; binary files are skipped.
    pub fn snapshot(&self) -> std::io::Result<Vec<WorkspaceFile>> {
        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() != 1
                    || (entry.file_name() != ".git" && entry.file_name() != ATTACHMENTS_DIR)
            });

        for entry in walker {
            let entry = entry.map_err(std::io::Error::other)?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.metadata().map_err(std::io::Error::other)?.len() > MAX_SNAPSHOT_FILE_BYTES {
                continue;
            }
            let bytes = std::fs::read(entry.path())?;
            if bytes.contains(&0) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            files.push(WorkspaceFile {
                path: relative.to_string_lossy().replace('\\', "/"),
                content: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(files)
    }
}

fn license_text(year: i32, holder: &str) -> String {
    let holder = if holder.trim().is_empty() { "the authors" } else { holder };
    format!(
        "MIT License\n\
         \n\
         Copyright (c) {year} {holder}\n\
         \n\
         Permission is hereby granted, free of charge, to any person obtaining a copy\n\
         of this software and associated documentation files (the \"Software\"), to deal\n\
         in the Software without restriction, including without limitation the rights\n\
         to use, copy, modify, merge, publish, distribute, sublicense, and/or sell\n\
         copies of the Software, and to permit persons to whom the Software is\n\
         furnished to do so, subject to the following conditions:\n\
         \n\
         The above copyright notice and this permission notice shall be included in all\n\
         copies or substantial portions of the Software.\n\
         \n\
         THE SOFTWARE IS PROVIDED \"AS IS\", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR\n\
         IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,\n\
         FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE\n\
         AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER\n\
         LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,\n\
         OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE\n\
         SOFTWARE.\n"
    )
}

fn readme_text(request: &JobRequest) -> String {
    let mut readme = format!("# {}\n\n## Brief\n\n{}\n", request.task, request.brief.trim());
    if !request.checks.is_empty() {
        readme.push_str("\n## Checks\n\n");
        for check in &request.checks {
            readme.push_str(&format!("- {}\n", check));
        }
    }
    readme.push_str(&format!(
        "\n## Round\n\nThis revision was produced for round {}.\n\n## License\n\nMIT License. See [LICENSE](LICENSE).\n",
        request.round
    ));
    readme
}
