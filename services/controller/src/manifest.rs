//! Schedule manifests on disk.
//!
//! A manifest path is either a single file or a directory whose `*.yaml`,
//! `*.yml` and `*.json` files are read in name order. Each file may hold
//! several YAML documents; a document is either one Schedule or a list with
//! an `items` field.
//!
//! Objects are decoded one at a time. A malformed object is reported and
//! skipped; the other Schedules of the same file are still returned. Only a
//! path that cannot be read fails the whole load.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use kss_schedule::Schedule;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::informer::ScheduleSource;

const MANIFEST_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// A manifest object that could not be decoded as a Schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidObject {
    /// File the object was read from, if any.
    pub file: Option<PathBuf>,

    /// Document number within the file, starting at 1.
    pub document: usize,

    /// Index within an `items` list.
    pub item: Option<usize>,

    pub error: String,
}

impl fmt::Display for InvalidObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}: ", file.display())?;
        }
        write!(f, "document {}", self.document)?;
        if let Some(item) = self.item {
            write!(f, ", item {}", item)?;
        }
        write!(f, ": {}", self.error)
    }
}

/// Schedules decoded from one or more manifests.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub schedules: Vec<Schedule>,
    pub invalid: Vec<InvalidObject>,
}

impl Manifest {
    fn extend(&mut self, other: Manifest) {
        self.schedules.extend(other.schedules);
        self.invalid.extend(other.invalid);
    }
}

fn decode_schedule(value: serde_yaml::Value) -> std::result::Result<Schedule, String> {
    let schedule: Schedule = serde_yaml::from_value(value).map_err(|e| e.to_string())?;
    if schedule.name().is_empty() {
        return Err("metadata.name must not be empty".to_string());
    }
    Ok(schedule)
}

/// Parse every Schedule in a manifest string.
pub fn parse_manifest(contents: &str) -> Manifest {
    let mut manifest = Manifest::default();
    let mut invalid = |document: usize, item: Option<usize>, error: String| {
        manifest.invalid.push(InvalidObject {
            file: None,
            document,
            item,
            error,
        })
    };
    let mut schedules = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(contents).enumerate() {
        let number = index + 1;
        let value = match serde_yaml::Value::deserialize(document) {
            Ok(value) => value,
            Err(e) => {
                // The YAML stream cannot be resumed after a syntax error.
                invalid(number, None, format!("invalid YAML: {}", e));
                break;
            }
        };
        if value.is_null() {
            continue;
        }

        match value.get("items") {
            Some(serde_yaml::Value::Sequence(items)) => {
                for (item, value) in items.iter().enumerate() {
                    match decode_schedule(value.clone()) {
                        Ok(schedule) => schedules.push(schedule),
                        Err(e) => invalid(number, Some(item), e),
                    }
                }
            }
            Some(serde_yaml::Value::Null) => {}
            Some(_) => invalid(number, None, "items must be a list".to_string()),
            None => match decode_schedule(value) {
                Ok(schedule) => schedules.push(schedule),
                Err(e) => invalid(number, None, e),
            },
        }
    }

    manifest.schedules = schedules;
    manifest
}

fn is_manifest(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MANIFEST_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Load every manifest from a file or directory.
///
/// Fails only when the path or one of its files cannot be read.
pub fn load_manifests(path: &Path) -> Result<Manifest> {
    let files = if path.is_dir() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(path)
            .with_context(|| format!("failed to read directory {}", path.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && is_manifest(p))
            .collect();
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };

    let mut manifest = Manifest::default();
    for file in files {
        let contents = std::fs::read_to_string(&file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        let mut parsed = parse_manifest(&contents);
        for invalid in &mut parsed.invalid {
            invalid.file = Some(file.clone());
        }
        debug!(
            file = %file.display(),
            schedules = parsed.schedules.len(),
            invalid = parsed.invalid.len(),
            "Loaded manifest"
        );
        manifest.extend(parsed);
    }

    Ok(manifest)
}

/// Load every valid Schedule from a file or directory.
///
/// Malformed objects are logged and skipped.
pub fn load_schedules(path: &Path) -> Result<Vec<Schedule>> {
    let manifest = load_manifests(path)?;
    for invalid in &manifest.invalid {
        warn!(
            file = %invalid.file.as_deref().map(|p| p.display().to_string()).unwrap_or_default(),
            document = invalid.document,
            item = ?invalid.item,
            error = %invalid.error,
            "Skipping malformed schedule"
        );
    }
    Ok(manifest.schedules)
}

/// Lists Schedules from manifests on disk.
#[derive(Debug, Clone)]
pub struct ManifestSource {
    path: PathBuf,
}

impl ManifestSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ScheduleSource for ManifestSource {
    async fn list(&self) -> Result<Vec<Schedule>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || load_schedules(&path))
            .await
            .context("manifest loader task failed")?
    }
}
