use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

/// Command name of the external packer
pub const PACKER_COMMAND: &str = "conda-pack";

/// Platform tag carried in archive file names by default
pub const DEFAULT_PLATFORM_TAG: &str = "win64";

/// Errors raised while exporting an environment to an archive
#[derive(Error, Debug)]
pub enum PackError {
    /// The packer reported a failure (missing environment, disk full)
    #[error("Failed to pack environment '{name}': {reason}")]
    PackFailed { name: String, reason: String },

    /// The packer reported success but the archive is not on disk
    #[error("Packing '{name}' reported success but no archive exists at '{path}'")]
    ArchiveMissing { name: String, path: String },

    /// IO error preparing the output location
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PackResult<T> = Result<T, PackError>;

/// Check whether the packer is installed
pub fn packer_available() -> bool {
    Command::new(PACKER_COMMAND)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

/// Compute the archive path for a named environment: `<name>-<tag>.zip`
pub fn archive_path(output_dir: &Path, name: &str, platform_tag: &str) -> PathBuf {
    output_dir.join(format!("{name}-{platform_tag}.zip"))
}

/// Export a named environment into a self-contained, relocatable archive.
///
/// Blocks until the packer finishes. The archive must exist on disk
/// afterward; a reported success without one is treated as a failure.
pub fn pack_env(name: &str, output: &Path) -> PackResult<PathBuf> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    debug!(env = name, archive = %output.display(), "packing environment");

    let result = Command::new(PACKER_COMMAND)
        .args(["-n", name, "-o"])
        .arg(output)
        .output()
        .map_err(|e| PackError::PackFailed {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

    if !result.status.success() {
        return Err(PackError::PackFailed {
            name: name.to_string(),
            reason: String::from_utf8_lossy(&result.stderr).to_string(),
        });
    }

    if !output.exists() {
        return Err(PackError::ArchiveMissing {
            name: name.to_string(),
            path: output.display().to_string(),
        });
    }

    Ok(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_path_naming() {
        let path = archive_path(Path::new("."), "plant-seg-gpu", DEFAULT_PLATFORM_TAG);
        assert_eq!(path, PathBuf::from("./plant-seg-gpu-win64.zip"));

        let path = archive_path(Path::new("dist"), "plant-seg-cpu", "linux64");
        assert_eq!(path, PathBuf::from("dist/plant-seg-cpu-linux64.zip"));
    }

    #[test]
    fn test_error_display_names_archive() {
        let error = PackError::ArchiveMissing {
            name: "plant-seg-gpu".to_string(),
            path: "./plant-seg-gpu-win64.zip".to_string(),
        };
        assert!(error.to_string().contains("plant-seg-gpu-win64.zip"));
    }
}
