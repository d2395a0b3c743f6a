//! Conda environment provisioning and packing for PlantSeg releases
//!
//! This crate drives two external command-line collaborators: a
//! conda-compatible environment manager (micromamba, mamba, or conda) and
//! the conda-pack archiver. Dependency resolution, package formats, and
//! environment isolation belong entirely to those tools; this crate owns
//! the sequencing, the failure policy, and the release manifest.

pub mod conda;
pub mod packer;
pub mod pipeline;
pub mod variant;

pub use conda::{
    clean_cache, create_env, detect_tool, env_exists, remove_env, CondaError, CondaResult,
    CondaTool,
};
pub use packer::{
    archive_path, pack_env, packer_available, PackError, PackResult, DEFAULT_PLATFORM_TAG,
    PACKER_COMMAND,
};
pub use pipeline::{
    CleanupReport, CondaCli, CondaPackCli, EnvManager, EnvPacker, Pipeline, PipelineError,
    PipelineResult, RunSummary,
};
pub use variant::{Manifest, ManifestError, ManifestResult, Variant};
