//! Content-addressed workspace snapshots for refinement rollback.
//!
//! A snapshot is a manifest (relative path → sha256) plus the set of
//! directories. File contents live once in `snapshots/blobs/<sha256>`.
//! Restoring rewrites changed files, recreates missing ones and removes
//! anything the manifest does not list. `.gatekeeper/`, `.git/` and the
//! configured exclusions are never captured or touched.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::core::attribution::Fingerprint;
use crate::io::paths::{STATE_DIR_NAME, create_dir, write_atomic};

/// Handle to a captured snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    /// Seconds since the Unix epoch.
    pub captured_at: u64,
    /// Manifest path used to restore.
    pub handle: PathBuf,
}

/// Capture/restore of mutable workspace state.
pub trait SnapshotManager {
    fn capture(&self, label: &str) -> Result<Snapshot>;
    /// Make the workspace equal the snapshot.
    fn restore(&self, snapshot: &Snapshot) -> Result<()>;
    /// Drop a snapshot that is no longer needed.
    fn discard(&self, snapshot: &Snapshot) -> Result<()>;
    /// Digest of every tracked file, used for change attribution.
    fn fingerprint(&self) -> Result<Fingerprint>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    id: String,
    label: String,
    captured_at: u64,
    files: BTreeMap<String, String>,
    dirs: BTreeSet<String>,
}

/// Workspace scan result keyed by forward-slash relative path.
struct Scan {
    files: BTreeMap<String, PathBuf>,
    dirs: BTreeSet<String>,
}

/// Snapshot manager storing blobs under `.gatekeeper/snapshots/`.
#[derive(Debug, Clone)]
pub struct ContentSnapshots {
    root: PathBuf,
    store_dir: PathBuf,
    excluded: HashSet<String>,
}

impl ContentSnapshots {
    pub fn new(root: impl Into<PathBuf>, store_dir: impl Into<PathBuf>, exclude: &[String]) -> Self {
        let mut excluded: HashSet<String> = exclude.iter().cloned().collect();
        excluded.insert(STATE_DIR_NAME.to_string());
        excluded.insert(".git".to_string());
        Self {
            root: root.into(),
            store_dir: store_dir.into(),
            excluded,
        }
    }

    fn blobs_dir(&self) -> PathBuf {
        self.store_dir.join("blobs")
    }

    fn scan(&self) -> Result<Scan> {
        let mut files = BTreeMap::new();
        let mut dirs = BTreeSet::new();
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                !(entry.depth() == 1
                    && self
                        .excluded
                        .contains(entry.file_name().to_string_lossy().as_ref()))
            });
        for entry in walker {
            let entry = entry.with_context(|| format!("walk {}", self.root.display()))?;
            let rel = relative_key(&self.root, entry.path())?;
            let file_type = entry.file_type();
            if file_type.is_dir() {
                dirs.insert(rel);
            } else if file_type.is_file() {
                files.insert(rel, entry.into_path());
            } else {
                debug!(path = %rel, "skipping non-regular file");
            }
        }
        Ok(Scan { files, dirs })
    }

    fn load_manifest(&self, snapshot: &Snapshot) -> Result<Manifest> {
        let contents = fs::read_to_string(&snapshot.handle)
            .with_context(|| format!("read snapshot manifest {}", snapshot.handle.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parse snapshot manifest {}", snapshot.handle.display()))
    }

    fn unique_id(&self, label: &str) -> (String, u64) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let slug: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        let base = format!("{slug}-{}", now.as_nanos());
        let mut id = base.clone();
        let mut n = 1;
        while self.store_dir.join(format!("{id}.json")).exists() {
            n += 1;
            id = format!("{base}-{n}");
        }
        (id, now.as_secs())
    }

    /// Delete blobs no remaining manifest refers to.
    fn prune_blobs(&self) -> Result<usize> {
        let blobs_dir = self.blobs_dir();
        if !blobs_dir.is_dir() {
            return Ok(0);
        }
        let mut referenced = HashSet::new();
        for entry in fs::read_dir(&self.store_dir)
            .with_context(|| format!("read {}", self.store_dir.display()))?
        {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let contents = fs::read_to_string(&path)
                    .with_context(|| format!("read snapshot manifest {}", path.display()))?;
                let manifest: Manifest = serde_json::from_str(&contents)
                    .with_context(|| format!("parse snapshot manifest {}", path.display()))?;
                referenced.extend(manifest.files.into_values());
            }
        }
        let mut removed = 0;
        for entry in fs::read_dir(&blobs_dir)
            .with_context(|| format!("read {}", blobs_dir.display()))?
        {
            let path = entry?.path();
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !referenced.contains(&name) {
                fs::remove_file(&path)
                    .with_context(|| format!("remove blob {}", path.display()))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl SnapshotManager for ContentSnapshots {
    #[instrument(skip_all, fields(label = %label))]
    fn capture(&self, label: &str) -> Result<Snapshot> {
        let scan = self.scan()?;
        let blobs_dir = self.blobs_dir();
        create_dir(&blobs_dir)?;

        let mut files = BTreeMap::new();
        for (rel, path) in &scan.files {
            let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
            let digest = digest_bytes(&bytes);
            let blob = blobs_dir.join(&digest);
            if !blob.exists() {
                write_atomic(&blob, &bytes)?;
            }
            files.insert(rel.clone(), digest);
        }

        let (id, captured_at) = self.unique_id(label);
        let manifest = Manifest {
            id: id.clone(),
            label: label.to_string(),
            captured_at,
            files,
            dirs: scan.dirs,
        };
        let handle = self.store_dir.join(format!("{id}.json"));
        let mut buf = serde_json::to_string_pretty(&manifest)?;
        buf.push('\n');
        write_atomic(&handle, buf.as_bytes())?;
        info!(snapshot = %id, files = manifest.files.len(), "captured snapshot");
        Ok(Snapshot {
            id,
            captured_at,
            handle,
        })
    }

    #[instrument(skip_all, fields(snapshot = %snapshot.id))]
    fn restore(&self, snapshot: &Snapshot) -> Result<()> {
        let manifest = self.load_manifest(snapshot)?;
        let current = self.scan()?;

        for (rel, path) in &current.files {
            if !manifest.files.contains_key(rel) {
                debug!(path = %rel, "removing file absent from snapshot");
                fs::remove_file(path).with_context(|| format!("remove {}", path.display()))?;
            }
        }
        // Deepest first so parents are empty by the time we reach them.
        for rel in current.dirs.iter().rev() {
            if !manifest.dirs.contains(rel) {
                let path = self.root.join(rel);
                if path.exists() {
                    debug!(path = %rel, "removing directory absent from snapshot");
                    fs::remove_dir_all(&path)
                        .with_context(|| format!("remove {}", path.display()))?;
                }
            }
        }
        for rel in &manifest.dirs {
            create_dir(&self.root.join(rel))?;
        }

        let blobs_dir = self.blobs_dir();
        let mut rewritten = 0usize;
        for (rel, digest) in &manifest.files {
            let path = self.root.join(rel);
            let unchanged = match current.files.get(rel) {
                Some(existing) => fs::read(existing)
                    .map(|bytes| digest_bytes(&bytes) == *digest)
                    .unwrap_or(false),
                None => false,
            };
            if unchanged {
                continue;
            }
            let blob = blobs_dir.join(digest);
            let bytes = fs::read(&blob).with_context(|| {
                format!("read blob {} for {}", blob.display(), rel)
            })?;
            if let Some(parent) = path.parent() {
                create_dir(parent)?;
            }
            fs::write(&path, bytes).with_context(|| format!("restore {}", path.display()))?;
            rewritten += 1;
        }
        info!(rewritten, "restored snapshot");
        Ok(())
    }

    #[instrument(skip_all, fields(snapshot = %snapshot.id))]
    fn discard(&self, snapshot: &Snapshot) -> Result<()> {
        if snapshot.handle.exists() {
            fs::remove_file(&snapshot.handle)
                .with_context(|| format!("remove {}", snapshot.handle.display()))?;
        } else {
            warn!("snapshot manifest already gone");
        }
        let pruned = self.prune_blobs()?;
        debug!(pruned, "discarded snapshot");
        Ok(())
    }

    fn fingerprint(&self) -> Result<Fingerprint> {
        let scan = self.scan()?;
        let mut fingerprint = Fingerprint::new();
        for (rel, path) in scan.files {
            let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
            fingerprint.insert(rel, digest_bytes(&bytes));
        }
        Ok(fingerprint)
    }
}

fn digest_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn relative_key(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| anyhow!("{} is outside {}", path.display(), root.display()))?;
    Ok(rel
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/"))
}
