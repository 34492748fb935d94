//! Re-execution into the project's pinned tereby
//!
//! A globally installed `tereby` hands off to the build the project itself
//! depends on, so every checkout runs its Terebyfile with the same version.
//! The installation is searched from the Terebyfile's directory upward:
//!
//! - `<dir>/.tools/tereby/bin/tereby` (`cargo install tereby --root .tools/tereby`)
//! - `<dir>/target/debug/tereby` when `<dir>/Cargo.toml` is tereby itself

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

use crate::config::{Manifest, PACKAGE_NAME};
use crate::error::{Result, TerebyError};

/// What to do after resolving the installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// This process is the pinned installation
    InProcess,
    /// Another binary should handle the invocation
    HandOff(PathBuf),
}

fn binary_name() -> String {
    format!("{PACKAGE_NAME}{}", std::env::consts::EXE_SUFFIX)
}

/// Locate the tereby binary that serves a Terebyfile
pub fn find_installation(terebyfile: &Path) -> Result<PathBuf> {
    let start = terebyfile.parent().unwrap_or(Path::new("."));

    for dir in start.ancestors() {
        let installed = dir.join(".tools").join(PACKAGE_NAME).join("bin").join(binary_name());
        if installed.is_file() {
            tracing::debug!(path = %installed.display(), "found installed tereby");
            return Ok(installed);
        }

        let manifest = Manifest::load(dir)?;
        if manifest.as_ref().and_then(Manifest::package_name) == Some(PACKAGE_NAME) {
            let built = dir.join("target").join("debug").join(binary_name());
            tracing::debug!(path = %built.display(), "using tereby's own build");
            return Ok(built);
        }
    }

    Err(TerebyError::InstallationNotFound)
}

/// Decide whether `current_exe` is the installation serving `terebyfile`
pub fn resolve(terebyfile: &Path, current_exe: &Path) -> Result<Resolution> {
    let installation = find_installation(terebyfile)?;

    let target = installation.canonicalize().unwrap_or(installation);
    let current = current_exe
        .canonicalize()
        .unwrap_or_else(|_| current_exe.to_path_buf());

    if target == current {
        tracing::debug!("already running the pinned tereby");
        Ok(Resolution::InProcess)
    } else {
        tracing::debug!(target = %target.display(), "handing off");
        Ok(Resolution::HandOff(target))
    }
}

/// Run `path` with the same arguments in place of this process
#[cfg(unix)]
pub fn hand_off(path: &Path, args: &[OsString]) -> Result<ExitCode> {
    use std::os::unix::process::CommandExt;

    // exec only returns on failure
    let source = Command::new(path).args(args).exec();
    Err(TerebyError::Handoff {
        path: path.to_path_buf(),
        source,
    })
}

/// Run `path` with the same arguments and forward its exit status
#[cfg(not(unix))]
pub fn hand_off(path: &Path, args: &[OsString]) -> Result<ExitCode> {
    let status = Command::new(path)
        .args(args)
        .status()
        .map_err(|source| TerebyError::Handoff {
            path: path.to_path_buf(),
            source,
        })?;

    let code = status.code().unwrap_or(1);
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}
