//! Artifact storage.
//!
//! Generated pipeline steps hand artifacts between jobs through an
//! [`ArtifactProvider`]. The file-system provider keeps them under
//! `<store>/<build-id>/<slice or _>/<artifact>/` and exchanges them with the
//! conventional workspace directory `<workspace>/<artifact>`. Retrieving
//! with the slice [`ALL_SLICES`] merges every stored slice of an artifact.

use crate::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Build id used when none is given.
pub const DEFAULT_BUILD_ID: &str = "local";

/// Slice value addressing every stored slice of an artifact on retrieval.
pub const ALL_SLICES: &str = "*";

const UNSLICED_DIR: &str = "_";

/// Storage backend for named file sets.
#[async_trait]
pub trait ArtifactProvider: Send + Sync {
    /// Upload the named artifacts from the workspace.
    async fn store_artifacts(
        &self,
        names: &[String],
        build_id: Option<&str>,
        slice: Option<&str>,
    ) -> Result<()>;

    /// Download the named artifacts into the workspace.
    async fn retrieve_artifacts(
        &self,
        names: &[String],
        build_id: Option<&str>,
        slice: Option<&str>,
    ) -> Result<()>;

    /// Remove everything stored for the given builds.
    async fn cleanup(&self, build_ids: &[String]) -> Result<()>;

    /// Build ids holding stored artifacts, optionally filtered by artifact
    /// name and slice. Sorted.
    async fn stored_run_identifiers(
        &self,
        artifact: Option<&str>,
        slice: Option<&str>,
    ) -> Result<Vec<String>>;
}

/// Artifact provider backed by a local directory.
#[derive(Debug, Clone)]
pub struct FileSystemArtifactProvider {
    store_root: PathBuf,
    workspace: PathBuf,
}

impl FileSystemArtifactProvider {
    /// Create a provider storing under `store_root` and exchanging with
    /// `workspace`.
    #[must_use]
    pub fn new(store_root: impl Into<PathBuf>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            store_root: store_root.into(),
            workspace: workspace.into(),
        }
    }

    /// Directory an artifact is stored in.
    #[must_use]
    pub fn stored_path(&self, name: &str, build_id: Option<&str>, slice: Option<&str>) -> PathBuf {
        self.store_root
            .join(build_id.unwrap_or(DEFAULT_BUILD_ID))
            .join(slice.unwrap_or(UNSLICED_DIR))
            .join(name)
    }

    /// Workspace directory an artifact is published from and retrieved to.
    #[must_use]
    pub fn workspace_path(&self, name: &str) -> PathBuf {
        self.workspace.join(name)
    }

    async fn retrieve_all_slices(&self, names: &[String], build_id: Option<&str>) -> Result<()> {
        let build_dir = self.store_root.join(build_id.unwrap_or(DEFAULT_BUILD_ID));
        let slice_dirs = list_dirs(&build_dir).await?;
        for name in names {
            let dest = self.workspace_path(name);
            let mut merged = 0;
            for dir in &slice_dirs {
                let source = dir.join(name);
                if exists(&source).await {
                    copy_tree(&source, &dest).await?;
                    merged += 1;
                }
            }
            if merged == 0 {
                return Err(Error::artifact(format!(
                    "artifact '{name}' was not stored for build '{}' in any slice",
                    build_id.unwrap_or(DEFAULT_BUILD_ID)
                )));
            }
            tracing::info!(artifact = %name, slices = merged, path = %dest.display(), "Retrieved artifact slices");
        }
        Ok(())
    }

    async fn holds(&self, build_dir: &Path, artifact: Option<&str>, slice: Option<&str>) -> Result<bool> {
        let slice_dirs = match slice {
            Some(slice) => vec![build_dir.join(slice)],
            None => list_dirs(build_dir).await?,
        };
        for dir in slice_dirs {
            let present = match artifact {
                Some(name) => exists(&dir.join(name)).await,
                None => exists(&dir).await,
            };
            if present {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl ArtifactProvider for FileSystemArtifactProvider {
    async fn store_artifacts(
        &self,
        names: &[String],
        build_id: Option<&str>,
        slice: Option<&str>,
    ) -> Result<()> {
        if slice == Some(ALL_SLICES) {
            return Err(Error::artifact(format!(
                "slice '{ALL_SLICES}' can only be used to retrieve artifacts"
            )));
        }
        for name in names {
            let source = self.workspace_path(name);
            if !exists(&source).await {
                return Err(Error::artifact(format!(
                    "artifact '{name}' not found at {}",
                    source.display()
                )));
            }
            let dest = self.stored_path(name, build_id, slice);
            if exists(&dest).await {
                fs::remove_dir_all(&dest)
                    .await
                    .map_err(|e| Error::io(e, Some(dest.clone()), "remove_dir_all"))?;
            }
            copy_tree(&source, &dest).await?;
            tracing::info!(artifact = %name, path = %dest.display(), "Stored artifact");
        }
        Ok(())
    }

    async fn retrieve_artifacts(
        &self,
        names: &[String],
        build_id: Option<&str>,
        slice: Option<&str>,
    ) -> Result<()> {
        if slice == Some(ALL_SLICES) {
            return self.retrieve_all_slices(names, build_id).await;
        }
        for name in names {
            let source = self.stored_path(name, build_id, slice);
            if !exists(&source).await {
                return Err(Error::artifact(format!(
                    "artifact '{name}' was not stored for build '{}'{}",
                    build_id.unwrap_or(DEFAULT_BUILD_ID),
                    slice.map(|s| format!(" slice '{s}'")).unwrap_or_default()
                )));
            }
            let dest = self.workspace_path(name);
            copy_tree(&source, &dest).await?;
            tracing::info!(artifact = %name, path = %dest.display(), "Retrieved artifact");
        }
        Ok(())
    }

    async fn cleanup(&self, build_ids: &[String]) -> Result<()> {
        for id in build_ids {
            let dir = self.store_root.join(id);
            if exists(&dir).await {
                fs::remove_dir_all(&dir)
                    .await
                    .map_err(|e| Error::io(e, Some(dir.clone()), "remove_dir_all"))?;
                tracing::debug!(build_id = %id, "Removed stored artifacts");
            }
        }
        Ok(())
    }

    async fn stored_run_identifiers(
        &self,
        artifact: Option<&str>,
        slice: Option<&str>,
    ) -> Result<Vec<String>> {
        let slice = slice.filter(|s| *s != ALL_SLICES);
        let mut ids = Vec::new();
        for build_dir in list_dirs(&self.store_root).await? {
            if self.holds(&build_dir, artifact, slice).await? {
                if let Some(id) = build_dir.file_name().and_then(|n| n.to_str()) {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

async fn list_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !exists(dir).await {
        return Ok(Vec::new());
    }
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| Error::io(e, Some(dir.to_path_buf()), "read_dir"))?;
    let mut dirs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::io(e, Some(dir.to_path_buf()), "read_dir"))?
    {
        let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
        if is_dir {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Copy a file or directory tree, merging into an existing destination.
async fn copy_tree(source: &Path, dest: &Path) -> Result<()> {
    let metadata = fs::metadata(source)
        .await
        .map_err(|e| Error::io(e, Some(source.to_path_buf()), "metadata"))?;
    if metadata.is_file() {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(e, Some(parent.to_path_buf()), "create_dir_all"))?;
        }
        fs::copy(source, dest)
            .await
            .map_err(|e| Error::io(e, Some(dest.to_path_buf()), "copy"))?;
        return Ok(());
    }

    let mut stack = vec![(source.to_path_buf(), dest.to_path_buf())];
    while let Some((from, to)) = stack.pop() {
        fs::create_dir_all(&to)
            .await
            .map_err(|e| Error::io(e, Some(to.clone()), "create_dir_all"))?;
        let mut entries = fs::read_dir(&from)
            .await
            .map_err(|e| Error::io(e, Some(from.clone()), "read_dir"))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io(e, Some(from.clone()), "read_dir"))?
        {
            let target = to.join(entry.file_name());
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Error::io(e, Some(entry.path()), "file_type"))?;
            if file_type.is_dir() {
                stack.push((entry.path(), target));
            } else {
                fs::copy(entry.path(), &target)
                    .await
                    .map_err(|e| Error::io(e, Some(target.clone()), "copy"))?;
            }
        }
    }
    Ok(())
}
