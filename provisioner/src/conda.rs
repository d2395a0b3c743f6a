use crate::variant::Variant;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

/// Conda-compatible environment managers supported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondaTool {
    /// Standalone micromamba binary
    Micromamba,
    /// Mamba resolver inside a conda installation
    Mamba,
    /// Classic conda
    Conda,
    /// No conda-compatible tool available
    None,
}

impl CondaTool {
    /// Get the command name for this tool
    pub fn command(&self) -> &'static str {
        match self {
            CondaTool::Micromamba => "micromamba",
            CondaTool::Mamba => "mamba",
            CondaTool::Conda => "conda",
            CondaTool::None => "",
        }
    }

    /// Check if this tool is available
    pub fn is_available(&self) -> bool {
        !matches!(self, CondaTool::None)
    }
}

/// Errors raised while driving the environment manager
#[derive(Error, Debug)]
pub enum CondaError {
    /// No conda-compatible tool is installed
    #[error("No conda-compatible tool available. Please install micromamba, mamba, or conda to provision environments.")]
    NoToolAvailable,

    /// Environment creation failed (unresolvable packages, network failure, name collision)
    #[error("Failed to create environment '{name}': {reason}")]
    CreateFailed { name: String, reason: String },

    /// Environment removal failed
    #[error("Failed to remove environment '{name}': {reason}")]
    RemoveFailed { name: String, reason: String },

    /// Package cache clean failed
    #[error("Failed to clean package caches: {reason}")]
    CleanFailed { reason: String },

    /// Environment listing failed or produced unparseable output
    #[error("Failed to list environments: {reason}")]
    ListFailed { reason: String },

    /// The tool could not be spawned at all
    #[error("Command execution failed: {command}")]
    CommandFailed { command: String },
}

pub type CondaResult<T> = Result<T, CondaError>;

/// Detect an available conda-compatible tool in order of preference
pub fn detect_tool() -> CondaTool {
    // micromamba first: standalone and fastest, no base environment needed
    for tool in [CondaTool::Micromamba, CondaTool::Mamba, CondaTool::Conda] {
        if Command::new(tool.command())
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
        {
            return tool;
        }
    }

    CondaTool::None
}

fn create_args(variant: &Variant) -> Vec<String> {
    let mut args = vec!["create".to_string(), "-n".to_string(), variant.name.clone()];
    for channel in &variant.channels {
        args.push("-c".to_string());
        args.push(channel.clone());
    }
    args.extend(variant.packages.iter().cloned());
    // Assume-yes flag instead of piping a confirmation to stdin
    args.push("-y".to_string());
    args
}

/// Create a named environment from a variant's channels and packages.
///
/// Blocks until the tool has resolved and installed every package, or failed.
/// Creation is not idempotent: a second call with the same name fails with
/// the tool's name-collision error.
pub fn create_env(tool: CondaTool, variant: &Variant) -> CondaResult<()> {
    if !tool.is_available() {
        return Err(CondaError::NoToolAvailable);
    }

    let args = create_args(variant);
    debug!(tool = tool.command(), env = %variant.name, "creating environment");

    let output = Command::new(tool.command())
        .args(&args)
        .output()
        .map_err(|_e| CondaError::CommandFailed {
            command: format!("{} {}", tool.command(), args.join(" ")),
        })?;

    if !output.status.success() {
        return Err(CondaError::CreateFailed {
            name: variant.name.clone(),
            reason: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    Ok(())
}

/// Remove a named environment and everything installed into it
pub fn remove_env(tool: CondaTool, name: &str) -> CondaResult<()> {
    if !tool.is_available() {
        return Err(CondaError::NoToolAvailable);
    }

    debug!(tool = tool.command(), env = name, "removing environment");

    let output = Command::new(tool.command())
        .args(["env", "remove", "-n", name, "-y"])
        .output()
        .map_err(|e| CondaError::RemoveFailed {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(CondaError::RemoveFailed {
            name: name.to_string(),
            reason: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    Ok(())
}

/// Clean the tool's package caches to reclaim disk space
pub fn clean_cache(tool: CondaTool) -> CondaResult<()> {
    if !tool.is_available() {
        return Err(CondaError::NoToolAvailable);
    }

    debug!(tool = tool.command(), "cleaning package caches");

    let output = Command::new(tool.command())
        .args(["clean", "--all", "-y"])
        .output()
        .map_err(|e| CondaError::CleanFailed {
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(CondaError::CleanFailed {
            reason: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
struct EnvListing {
    envs: Vec<PathBuf>,
}

/// Check whether a named environment currently exists.
///
/// Environments are listed as prefix paths; the name is matched against the
/// final path component.
pub fn env_exists(tool: CondaTool, name: &str) -> CondaResult<bool> {
    if !tool.is_available() {
        return Err(CondaError::NoToolAvailable);
    }

    let output = Command::new(tool.command())
        .args(["env", "list", "--json"])
        .output()
        .map_err(|e| CondaError::ListFailed {
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(CondaError::ListFailed {
            reason: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let listing: EnvListing =
        serde_json::from_slice(&output.stdout).map_err(|e| CondaError::ListFailed {
            reason: e.to_string(),
        })?;

    let name = std::ffi::OsStr::new(name);
    Ok(listing
        .envs
        .iter()
        .any(|prefix| prefix.file_name().is_some_and(|stem| stem == name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_variant() -> Variant {
        Variant {
            name: "plant-seg-gpu".to_string(),
            channels: vec!["pytorch".to_string(), "conda-forge".to_string()],
            packages: vec!["plantseg".to_string(), "pillow=8.4".to_string()],
        }
    }

    #[test]
    fn test_tool_command() {
        assert_eq!(CondaTool::Micromamba.command(), "micromamba");
        assert_eq!(CondaTool::Mamba.command(), "mamba");
        assert_eq!(CondaTool::Conda.command(), "conda");
        assert_eq!(CondaTool::None.command(), "");
    }

    #[test]
    fn test_tool_availability() {
        assert!(CondaTool::Micromamba.is_available());
        assert!(CondaTool::Conda.is_available());
        assert!(!CondaTool::None.is_available());
    }

    #[test]
    fn test_detect_tool() {
        // We can't predict what is installed in the test environment,
        // just ensure the probe returns a valid variant
        match detect_tool() {
            CondaTool::Micromamba | CondaTool::Mamba | CondaTool::Conda | CondaTool::None => {}
        }
    }

    #[test]
    fn test_create_args_order() {
        let args = create_args(&sample_variant());
        assert_eq!(
            args,
            vec![
                "create",
                "-n",
                "plant-seg-gpu",
                "-c",
                "pytorch",
                "-c",
                "conda-forge",
                "plantseg",
                "pillow=8.4",
                "-y",
            ]
        );
    }

    #[test]
    fn test_create_args_keeps_version_pins() {
        let args = create_args(&sample_variant());
        assert!(args.contains(&"pillow=8.4".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("-y"));
    }

    #[test]
    fn test_env_listing_parse() {
        let raw = r#"{"envs": ["/opt/conda", "/opt/conda/envs/plant-seg-gpu"]}"#;
        let listing: EnvListing = serde_json::from_str(raw).unwrap();
        assert_eq!(listing.envs.len(), 2);
        assert!(listing
            .envs
            .iter()
            .any(|p| p.file_name().is_some_and(|n| n == "plant-seg-gpu")));
    }

    #[test]
    fn test_ops_require_available_tool() {
        let variant = sample_variant();
        assert!(matches!(
            create_env(CondaTool::None, &variant),
            Err(CondaError::NoToolAvailable)
        ));
        assert!(matches!(
            remove_env(CondaTool::None, "plant-seg-gpu"),
            Err(CondaError::NoToolAvailable)
        ));
        assert!(matches!(
            clean_cache(CondaTool::None),
            Err(CondaError::NoToolAvailable)
        ));
        assert!(matches!(
            env_exists(CondaTool::None, "plant-seg-gpu"),
            Err(CondaError::NoToolAvailable)
        ));
    }

    #[test]
    fn test_error_display_names_environment() {
        let error = CondaError::CreateFailed {
            name: "plant-seg-cpu".to_string(),
            reason: "prefix already exists".to_string(),
        };
        assert!(error.to_string().contains("plant-seg-cpu"));
        assert!(error.to_string().contains("prefix already exists"));
    }
}
