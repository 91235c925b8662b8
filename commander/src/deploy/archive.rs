//! Plugin bundle builder

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::errors::DeployError;
use crate::utils::sha256_hash;

/// Packages plugin source trees into a single archive
pub trait ArchiveBuilder: Send + Sync {
    /// Write a bundle of `codes` to `output_path`
    fn build_bundle(&self, output_path: &Path, codes: &[String]) -> Result<(), DeployError>;
}

/// Zip bundles from a local plugins directory
///
/// Plugin `Author.Name` lives in `<plugins_dir>/author/name` and is stored
/// under `author/name/` in the archive. Entries are sorted and stamped with a
/// fixed time and mode, so the same tree always yields the same bytes.
#[derive(Debug, Clone)]
pub struct ZipArchiveBuilder {
    plugins_dir: PathBuf,
}

impl ZipArchiveBuilder {
    pub fn new(plugins_dir: impl Into<PathBuf>) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
        }
    }

    /// Relative archive prefix for a plugin code
    pub fn plugin_prefix(code: &str) -> Result<String, DeployError> {
        let parts: Vec<&str> = code.trim().split('.').collect();
        match parts.as_slice() {
            [author, name] if !author.is_empty() && !name.is_empty() => {
                Ok(format!("{}/{}", author.to_lowercase(), name.to_lowercase()))
            }
            _ => Err(DeployError::LocalBuildError(format!(
                "Invalid plugin code `{}`, expected Author.Name",
                code
            ))),
        }
    }

    fn collect_entries(&self, codes: &[String]) -> Result<Vec<(String, PathBuf)>, DeployError> {
        let mut entries = Vec::new();
        for code in codes {
            let prefix = Self::plugin_prefix(code)?;
            let root = self.plugins_dir.join(&prefix);
            if !root.is_dir() {
                return Err(DeployError::LocalBuildError(format!(
                    "Plugin {} not found at {}",
                    code,
                    root.display()
                )));
            }
            walk(&root, &prefix, &mut entries).map_err(|e| {
                DeployError::LocalBuildError(format!("Unable to read {}: {}", root.display(), e))
            })?;
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.dedup_by(|a, b| a.0 == b.0);
        Ok(entries)
    }
}

fn walk(dir: &Path, prefix: &str, entries: &mut Vec<(String, PathBuf)>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let entry_name = format!("{}/{}", prefix, name);

        if file_type.is_dir() {
            walk(&entry.path(), &entry_name, entries)?;
        } else if file_type.is_file() {
            entries.push((entry_name, entry.path()));
        }
    }
    Ok(())
}

fn build_error(output_path: &Path, e: impl std::fmt::Display) -> DeployError {
    DeployError::LocalBuildError(format!("Unable to write {}: {}", output_path.display(), e))
}

impl ArchiveBuilder for ZipArchiveBuilder {
    fn build_bundle(&self, output_path: &Path, codes: &[String]) -> Result<(), DeployError> {
        let entries = self.collect_entries(codes)?;

        let file = fs::File::create(output_path).map_err(|e| build_error(output_path, e))?;
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644);

        for (name, path) in &entries {
            zip.start_file(name.as_str(), options)
                .map_err(|e| build_error(output_path, e))?;
            let mut source = fs::File::open(path).map_err(|e| build_error(output_path, e))?;
            io::copy(&mut source, &mut zip).map_err(|e| build_error(output_path, e))?;
        }
        zip.finish().map_err(|e| build_error(output_path, e))?;

        let bytes = fs::read(output_path).map_err(|e| build_error(output_path, e))?;
        info!(
            "Built bundle {} ({} files, sha256 {})",
            output_path.display(),
            entries.len(),
            sha256_hash(&bytes)
        );
        Ok(())
    }
}
