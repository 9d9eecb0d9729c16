//! Flat-file source registry.
//!
//! Sources are recorded in `<data_dir>/sources.json`; uploaded documents
//! keep a backup copy under `<data_dir>/files/<uuid>.json`. All filesystem
//! work is synchronous and runs on tokio's blocking pool via
//! [`RegistryHandle::call`], keeping handler tasks free of blocking I/O.
//!
//! Reads resolve a source's content from its original path first and fall
//! back to the backup copy when the original is gone or unreadable.
//! Originals of path-registered sources are never written or deleted.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use fs2::FileExt;
use uuid::Uuid;

use crate::errors::RegistryError;
use crate::model::Source;

type Result<T> = std::result::Result<T, RegistryError>;

/// Async-safe handle to the registry.
///
/// Wraps [`SourceRegistry`] behind `Arc<Mutex>` and runs all access on
/// tokio's blocking thread pool via `spawn_blocking`. The mutex also
/// serializes compound read-modify-write operations against sources.json.
#[derive(Clone)]
pub struct RegistryHandle {
    inner: Arc<std::sync::Mutex<SourceRegistry>>,
}

impl RegistryHandle {
    pub fn new(registry: SourceRegistry) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(registry)),
        }
    }

    /// Run a closure with access to the registry on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&SourceRegistry) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let registry = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = registry
                .lock()
                .map_err(|e| anyhow::anyhow!("Registry lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("Registry task panicked")?
    }
}

/// Outcome of the one-shot legacy import.
#[derive(Debug, Clone)]
pub enum MigrationOutcome {
    /// No `uploads/tasks.json` present.
    NoLegacyFile,
    /// The registry already has sources; nothing to do.
    SourcesExist,
    /// The legacy file was imported as a new uploaded source.
    Migrated(Source),
}

/// Synchronous registry rooted at a data directory.
pub struct SourceRegistry {
    data_dir: PathBuf,
}

impl SourceRegistry {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn sources_file(&self) -> PathBuf {
        self.data_dir.join("sources.json")
    }

    fn lock_file(&self) -> PathBuf {
        self.data_dir.join("sources.lock")
    }

    fn files_dir(&self) -> PathBuf {
        self.data_dir.join("files")
    }

    fn backup_path(&self, file_name: &str) -> PathBuf {
        self.files_dir().join(file_name)
    }

    fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    /// Location of the single-file task document that predates the registry.
    pub fn legacy_tasks_file(&self) -> PathBuf {
        self.uploads_dir().join("tasks.json")
    }

    fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.data_dir.clone(), self.files_dir()] {
            fs::create_dir_all(&dir).map_err(|source| RegistryError::WriteFailed {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    // ── Persistence ───────────────────────────────────────────────────

    /// Load all source records.
    ///
    /// A missing or unparsable sources.json yields an empty list rather
    /// than an error, so a corrupt registry never takes the dashboard
    /// down. Records written before backup tracking (no `originalPath`)
    /// are migrated to point at their local copy and persisted.
    pub fn load(&self) -> Result<Vec<Source>> {
        let path = self.sources_file();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let data = fs::read_to_string(&path)
            .map_err(|source| RegistryError::ReadFailed { path, source })?;
        let mut sources: Vec<Source> = match serde_json::from_str(&data) {
            Ok(sources) => sources,
            Err(e) => {
                tracing::warn!(error = %e, "sources.json is unparsable; treating registry as empty");
                return Ok(Vec::new());
            }
        };

        let mut needs_save = false;
        for source in &mut sources {
            if source.original_path.is_none() {
                if let Some(file_path) = source.file_path.clone() {
                    source.original_path =
                        Some(self.backup_path(&file_path).to_string_lossy().into_owned());
                    source.is_uploaded = true;
                    needs_save = true;
                }
            }
        }
        if needs_save {
            tracing::info!("migrated legacy source records to backup-tracking format");
            self.save(&sources)?;
        }

        Ok(sources)
    }

    /// Persist the full source list, pretty-printed, under an exclusive
    /// advisory lock so concurrent handler tasks cannot interleave writes.
    pub fn save(&self, sources: &[Source]) -> Result<()> {
        self.ensure_dirs()?;

        let lock_path = self.lock_file();
        let lock = fs::File::create(&lock_path).map_err(|source| RegistryError::WriteFailed {
            path: lock_path.clone(),
            source,
        })?;
        lock.lock_exclusive()
            .map_err(|source| RegistryError::WriteFailed {
                path: lock_path,
                source,
            })?;

        let json = serde_json::to_string_pretty(sources)
            .map_err(|e| RegistryError::Other(e.into()))?;
        let path = self.sources_file();
        fs::write(&path, json).map_err(|source| RegistryError::WriteFailed { path, source })?;
        Ok(())
        // lock released when `lock` drops
    }

    // ── Creation ──────────────────────────────────────────────────────

    fn validate_name(&self, name: &str, existing: &[Source]) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if existing
            .iter()
            .any(|s| s.name.to_lowercase() == name.to_lowercase())
        {
            return Err(RegistryError::DuplicateName {
                name: name.to_string(),
            });
        }
        Ok(name.to_string())
    }

    /// Register an uploaded document. The content is written to a backup
    /// copy under `files/`, which also serves as the original path.
    pub fn create_upload(&self, name: &str, file_name: &str, content: &str) -> Result<Source> {
        let existing = self.load()?;
        let name = self.validate_name(name, &existing)?;

        if !file_name.ends_with(".json") {
            return Err(RegistryError::NotJson {
                path: PathBuf::from(file_name),
            });
        }
        serde_json::from_str::<serde_json::Value>(content)
            .map_err(|source| RegistryError::InvalidJson { source })?;

        self.ensure_dirs()?;
        let id = Uuid::new_v4().to_string();
        let backup_name = format!("{}.json", id);
        let backup_path = self.backup_path(&backup_name);
        fs::write(&backup_path, content).map_err(|source| RegistryError::WriteFailed {
            path: backup_path.clone(),
            source,
        })?;

        let now = Utc::now();
        let source = Source {
            id,
            name,
            file_name: file_name.to_string(),
            file_path: Some(backup_name),
            original_path: Some(backup_path.to_string_lossy().into_owned()),
            created_at: now,
            last_used: Some(now),
            is_uploaded: true,
            has_error: None,
            error_message: None,
        };

        let mut sources = existing;
        sources.push(source.clone());
        self.save(&sources)?;
        tracing::info!(id = %source.id, name = %source.name, "registered uploaded source");
        Ok(source)
    }

    /// Register a document by filesystem path. No backup copy is kept;
    /// the original file stays where it is.
    pub fn create_from_path(&self, name: &str, path: &str) -> Result<Source> {
        let existing = self.load()?;
        let name = self.validate_name(name, &existing)?;

        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(RegistryError::PathMissing { path });
        }
        let absolute = fs::canonicalize(&path).map_err(|_| RegistryError::PathMissing {
            path: path.clone(),
        })?;
        if absolute.extension().and_then(|e| e.to_str()) != Some("json") {
            return Err(RegistryError::NotJson { path: absolute });
        }

        let content = fs::read_to_string(&absolute).map_err(|_| RegistryError::Unreadable {
            path: absolute.clone(),
        })?;
        serde_json::from_str::<serde_json::Value>(&content)
            .map_err(|source| RegistryError::InvalidJson { source })?;

        let file_name = absolute
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let now = Utc::now();
        let source = Source {
            id: Uuid::new_v4().to_string(),
            name,
            file_name,
            file_path: None,
            original_path: Some(absolute.to_string_lossy().into_owned()),
            created_at: now,
            last_used: Some(now),
            is_uploaded: false,
            has_error: None,
            error_message: None,
        };

        let mut sources = existing;
        sources.push(source.clone());
        self.save(&sources)?;
        tracing::info!(id = %source.id, name = %source.name, "registered path source");
        Ok(source)
    }

    // ── Deletion ──────────────────────────────────────────────────────

    /// Remove a source. Uploaded sources also lose their backup copy;
    /// originals of path-registered sources are left untouched.
    pub fn delete(&self, id: &str) -> Result<Source> {
        let mut sources = self.load()?;
        let index = sources
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| RegistryError::SourceNotFound { id: id.to_string() })?;

        let removed = sources.remove(index);
        if removed.is_uploaded {
            if let Some(ref file_path) = removed.file_path {
                let backup = self.backup_path(file_path);
                if backup.exists() {
                    if let Err(e) = fs::remove_file(&backup) {
                        tracing::warn!(path = %backup.display(), error = %e, "failed to remove backup copy");
                    }
                }
            }
        }

        self.save(&sources)?;
        tracing::info!(id = %removed.id, name = %removed.name, "deleted source");
        Ok(removed)
    }

    // ── Validation ────────────────────────────────────────────────────

    /// Annotate every source with its current health and persist the list
    /// when any annotation changed.
    pub fn validate(&self) -> Result<Vec<Source>> {
        let sources = self.load()?;
        let mut annotated: Vec<Source> = sources.iter().map(|s| self.annotate(s)).collect();

        let changed = annotated
            .iter()
            .zip(&sources)
            .any(|(a, b)| a.has_error != b.has_error || a.error_message != b.error_message);
        if changed {
            self.save(&annotated)?;
        } else {
            annotated = sources;
        }
        Ok(annotated)
    }

    fn annotate(&self, source: &Source) -> Source {
        let mut out = source.clone();

        let original_exists = source
            .original_path
            .as_deref()
            .is_some_and(|p| Path::new(p).exists());

        if !original_exists {
            out.has_error = Some(true);
            out.error_message = Some("Original file not found".to_string());
            if source.is_uploaded {
                if let Some(ref file_path) = source.file_path {
                    if self.backup_path(file_path).exists() {
                        out.has_error = Some(false);
                        out.error_message =
                            Some("Using backup copy (original file not found)".to_string());
                    }
                }
            }
        } else {
            // Existence alone is not enough; the file must also be readable.
            let readable = source
                .original_path
                .as_deref()
                .is_some_and(|p| fs::File::open(p).is_ok());
            if readable {
                out.has_error = Some(false);
                out.error_message = None;
            } else {
                out.has_error = Some(true);
                out.error_message = Some("File not readable".to_string());
            }
        }
        out
    }

    // ── Reads ─────────────────────────────────────────────────────────

    /// Resolve a source's document content, original path first, backup
    /// copy second. Bumps `lastUsed` on success (best effort).
    pub fn read_source(&self, id: &str) -> Result<(Source, String)> {
        let mut sources = self.load()?;
        let index = sources
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| RegistryError::SourceNotFound { id: id.to_string() })?;

        let content = self.resolve_content(&sources[index])?;

        sources[index].last_used = Some(Utc::now());
        let source = sources[index].clone();
        if let Err(e) = self.save(&sources) {
            tracing::warn!(error = %e, "failed to persist lastUsed update");
        }
        Ok((source, content))
    }

    fn resolve_content(&self, source: &Source) -> Result<String> {
        let backup = source.file_path.as_deref().map(|fp| self.backup_path(fp));
        let original = source.original_path.as_deref().map(Path::new);

        if let Some(original) = original.filter(|p| p.exists()) {
            match fs::read_to_string(original) {
                Ok(content) => return Ok(content),
                Err(e) => {
                    tracing::debug!(path = %original.display(), error = %e, "original unreadable; trying backup");
                    return match backup {
                        Some(backup) if backup.exists() => {
                            fs::read_to_string(&backup).map_err(|source| {
                                RegistryError::ReadFailed {
                                    path: backup,
                                    source,
                                }
                            })
                        }
                        // A backup was recorded but is gone.
                        Some(_) => Err(RegistryError::BackupMissing {
                            id: source.id.clone(),
                        }),
                        None => Err(RegistryError::NotAccessible {
                            id: source.id.clone(),
                        }),
                    };
                }
            }
        }

        // Original is gone entirely; the backup copy is the last resort.
        if let Some(backup) = backup.filter(|b| b.exists()) {
            return fs::read_to_string(&backup).map_err(|source| RegistryError::ReadFailed {
                path: backup,
                source,
            });
        }
        Err(RegistryError::FileMissing {
            id: source.id.clone(),
        })
    }

    // ── Legacy upload & migration ─────────────────────────────────────

    /// Store a document at the legacy single-file location
    /// (`uploads/tasks.json`), validating name and content first.
    pub fn store_legacy_upload(&self, file_name: &str, content: &str) -> Result<PathBuf> {
        if !file_name.ends_with(".json") {
            return Err(RegistryError::NotJson {
                path: PathBuf::from(file_name),
            });
        }
        serde_json::from_str::<serde_json::Value>(content)
            .map_err(|source| RegistryError::InvalidJson { source })?;

        let dir = self.uploads_dir();
        fs::create_dir_all(&dir).map_err(|source| RegistryError::WriteFailed {
            path: dir.clone(),
            source,
        })?;
        let path = self.legacy_tasks_file();
        fs::write(&path, content).map_err(|source| RegistryError::WriteFailed {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// One-shot import of the legacy `uploads/tasks.json` into the
    /// registry. The legacy file is left in place.
    pub fn migrate_legacy(&self) -> Result<MigrationOutcome> {
        let legacy = self.legacy_tasks_file();
        if !legacy.exists() {
            return Ok(MigrationOutcome::NoLegacyFile);
        }

        let existing = self.load()?;
        if !existing.is_empty() {
            return Ok(MigrationOutcome::SourcesExist);
        }

        let content = fs::read_to_string(&legacy).map_err(|source| RegistryError::ReadFailed {
            path: legacy,
            source,
        })?;
        serde_json::from_str::<serde_json::Value>(&content)
            .map_err(|source| RegistryError::InvalidJson { source })?;

        self.ensure_dirs()?;
        let id = Uuid::new_v4().to_string();
        let backup_name = format!("{}.json", id);
        let backup_path = self.backup_path(&backup_name);
        fs::write(&backup_path, &content).map_err(|source| RegistryError::WriteFailed {
            path: backup_path.clone(),
            source,
        })?;

        let now = Utc::now();
        let source = Source {
            id,
            name: "Migrated Tasks".to_string(),
            file_name: "tasks.json".to_string(),
            file_path: Some(backup_name),
            original_path: Some(backup_path.to_string_lossy().into_owned()),
            created_at: now,
            last_used: Some(now),
            is_uploaded: true,
            has_error: None,
            error_message: None,
        };

        self.save(std::slice::from_ref(&source))?;
        tracing::info!(id = %source.id, "migrated legacy tasks.json into the registry");
        Ok(MigrationOutcome::Migrated(source))
    }
}
