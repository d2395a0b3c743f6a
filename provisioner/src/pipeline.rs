//! Provision → package → teardown sequencing.
//!
//! The two external collaborators sit behind traits so the sequencing rules
//! can be exercised without conda or conda-pack installed. Execution is
//! strictly sequential, one blocking child process at a time: a failure
//! while creating or packing aborts the remaining variants, environments
//! created so far are removed best-effort, and removal failures are logged
//! rather than escalated.

use crate::conda::{self, CondaError, CondaTool};
use crate::packer::{self, PackError};
use crate::variant::{Manifest, Variant};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Errors that abort the provisioning sequence
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Environment creation failed for a variant
    #[error("Provisioning '{variant}' failed while creating the environment: {source}")]
    CreateFailed {
        variant: String,
        #[source]
        source: CondaError,
    },

    /// Packing failed for a variant
    #[error("Provisioning '{variant}' failed while packing the environment: {source}")]
    PackFailed {
        variant: String,
        #[source]
        source: PackError,
    },
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// External environment manager contract
pub trait EnvManager {
    fn create(&self, variant: &Variant) -> Result<(), CondaError>;
    fn remove(&self, name: &str) -> Result<(), CondaError>;
    fn clean(&self) -> Result<(), CondaError>;
    fn exists(&self, name: &str) -> Result<bool, CondaError>;
}

/// External packer contract
pub trait EnvPacker {
    fn pack(&self, name: &str, output: &Path) -> Result<PathBuf, PackError>;
}

/// Environment manager backed by the detected conda-compatible CLI
pub struct CondaCli {
    tool: CondaTool,
}

impl CondaCli {
    pub fn new(tool: CondaTool) -> Self {
        Self { tool }
    }

    /// Probe the host for an installed tool
    pub fn detect() -> Self {
        Self::new(conda::detect_tool())
    }

    pub fn tool(&self) -> CondaTool {
        self.tool
    }
}

impl EnvManager for CondaCli {
    fn create(&self, variant: &Variant) -> Result<(), CondaError> {
        conda::create_env(self.tool, variant)
    }

    fn remove(&self, name: &str) -> Result<(), CondaError> {
        conda::remove_env(self.tool, name)
    }

    fn clean(&self) -> Result<(), CondaError> {
        conda::clean_cache(self.tool)
    }

    fn exists(&self, name: &str) -> Result<bool, CondaError> {
        conda::env_exists(self.tool, name)
    }
}

/// Packer backed by the conda-pack CLI
pub struct CondaPackCli;

impl EnvPacker for CondaPackCli {
    fn pack(&self, name: &str, output: &Path) -> Result<PathBuf, PackError> {
        packer::pack_env(name, output)
    }
}

/// What a cleanup pass accomplished
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    /// Environments that were removed
    pub removed: Vec<String>,
    /// Environments that could not be removed and need manual attention
    pub remaining: Vec<String>,
}

/// Result of a full provisioning run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Archives written, in variant order
    pub archives: Vec<PathBuf>,
    /// Environments removed during teardown
    pub removed: Vec<String>,
    /// Environments left behind (kept deliberately, or removal failed)
    pub remaining: Vec<String>,
}

/// Drives the provision → package → teardown sequence
pub struct Pipeline<M: EnvManager, P: EnvPacker> {
    manager: M,
    packer: P,
}

impl<M: EnvManager, P: EnvPacker> Pipeline<M, P> {
    pub fn new(manager: M, packer: P) -> Self {
        Self { manager, packer }
    }

    /// Create a variant's environment and pack it into an archive.
    ///
    /// On success exactly one archive named `<name>-<tag>.zip` exists in the
    /// output directory. If packing fails the freshly created environment is
    /// removed best-effort before the error is returned, so a failed
    /// provision does not leak an environment.
    pub fn provision(
        &self,
        variant: &Variant,
        output_dir: &Path,
        platform_tag: &str,
    ) -> PipelineResult<PathBuf> {
        info!(env = %variant.name, "creating environment");
        self.manager
            .create(variant)
            .map_err(|source| PipelineError::CreateFailed {
                variant: variant.name.clone(),
                source,
            })?;

        let archive = packer::archive_path(output_dir, &variant.name, platform_tag);
        info!(env = %variant.name, archive = %archive.display(), "packing environment");
        match self.packer.pack(&variant.name, &archive) {
            Ok(path) => Ok(path),
            Err(source) => {
                self.remove_best_effort(std::slice::from_ref(&variant.name));
                Err(PipelineError::PackFailed {
                    variant: variant.name.clone(),
                    source,
                })
            }
        }
    }

    /// Remove the named environments, then clean the package caches once.
    ///
    /// Advisory: removal and clean failures are logged and reported in the
    /// returned report, never escalated.
    pub fn cleanup(&self, names: &[String]) -> CleanupReport {
        let remaining = self.remove_best_effort(names);
        let removed = names
            .iter()
            .filter(|name| !remaining.contains(name))
            .cloned()
            .collect();

        if let Err(e) = self.manager.clean() {
            warn!("package cache clean failed: {e}");
        }

        CleanupReport { removed, remaining }
    }

    /// Provision every variant in order, then tear the environments down.
    ///
    /// The first create or pack failure aborts the remaining variants;
    /// environments provisioned before the failure are removed best-effort
    /// and the caches cleaned before the error propagates.
    pub fn run(&self, manifest: &Manifest) -> PipelineResult<RunSummary> {
        let mut provisioned: Vec<String> = Vec::new();
        let mut archives: Vec<PathBuf> = Vec::new();

        for variant in &manifest.variants {
            match self.provision(variant, &manifest.output_dir, &manifest.platform_tag) {
                Ok(archive) => {
                    provisioned.push(variant.name.clone());
                    archives.push(archive);
                }
                Err(err) => {
                    if !provisioned.is_empty() {
                        warn!(
                            "aborting after '{}'; removing {} provisioned environment(s)",
                            variant.name,
                            provisioned.len()
                        );
                        let report = self.cleanup(&provisioned);
                        for name in &report.remaining {
                            warn!("environment '{name}' could not be removed; remove it manually");
                        }
                    }
                    return Err(err);
                }
            }
        }

        if manifest.keep_envs {
            info!("keeping {} environment(s) as requested", provisioned.len());
            return Ok(RunSummary {
                archives,
                removed: Vec::new(),
                remaining: provisioned,
            });
        }

        let report = self.cleanup(&provisioned);
        for name in &report.remaining {
            warn!("environment '{name}' could not be removed; remove it manually");
        }

        Ok(RunSummary {
            archives,
            removed: report.removed,
            remaining: report.remaining,
        })
    }

    /// Remove environments, logging failures; returns the names still present
    fn remove_best_effort(&self, names: &[String]) -> Vec<String> {
        let mut remaining = Vec::new();
        for name in names {
            match self.manager.remove(name) {
                Ok(()) => info!(env = %name, "removed environment"),
                Err(e) => {
                    warn!("failed to remove environment '{name}': {e}");
                    remaining.push(name.clone());
                }
            }
        }
        remaining
    }
}
