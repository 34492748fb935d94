//! Terebyfile discovery and Cargo manifest reading
//!
//! The search for a Terebyfile starts in the working directory and walks up
//! until it reaches the directory of the enclosing Cargo package.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, TerebyError};

/// Terebyfile name, matched case-insensitively
pub const TEREBYFILE_NAME: &str = "terebyfile.rhai";

/// Name of the package that ships the `tereby` binary
pub const PACKAGE_NAME: &str = "tereby";

/// The parts of a `Cargo.toml` we care about
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub package: Option<Package>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Package {
    pub name: String,
}

impl Manifest {
    /// Read `<dir>/Cargo.toml`, if the directory has one
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join("Cargo.toml");
        if !path.is_file() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        let manifest =
            toml::from_str(&content).map_err(|source| TerebyError::ManifestParse { path, source })?;

        Ok(Some(manifest))
    }

    pub fn package_name(&self) -> Option<&str> {
        self.package.as_ref().map(|package| package.name.as_str())
    }
}

/// Find the Terebyfile for a working directory
pub fn find_terebyfile(start: &Path) -> Result<PathBuf> {
    let mut dir = Some(start);

    while let Some(current) = dir {
        tracing::debug!(dir = %current.display(), "looking for Terebyfile");

        let mut candidates = candidates_in(current)?;

        if candidates.len() > 1 {
            candidates.sort();
            return Err(TerebyError::MultipleTerebyfiles {
                names: candidates
                    .iter()
                    .map(|path| file_name(path))
                    .collect(),
            });
        }

        if let Some(path) = candidates.pop() {
            if !path.is_file() {
                return Err(TerebyError::NotAFile {
                    name: file_name(&path),
                });
            }
            return Ok(path);
        }

        if current.join("Cargo.toml").exists() {
            break;
        }

        dir = current.parent();
    }

    Err(TerebyError::TerebyfileNotFound)
}

fn candidates_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.eq_ignore_ascii_case(TEREBYFILE_NAME));
        if matches {
            found.push(entry.path());
        }
    }

    Ok(found)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
