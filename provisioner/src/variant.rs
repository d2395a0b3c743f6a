use crate::packer::DEFAULT_PLATFORM_TAG;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or validating a release manifest
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Manifest file could not be read
    #[error("Failed to read manifest '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Manifest is not valid TOML
    #[error("Failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    /// Manifest parsed but is not usable
    #[error("Invalid manifest: {reason}")]
    Invalid { reason: String },

    /// A variant name was requested that the manifest does not define
    #[error("Unknown variant '{name}'")]
    UnknownVariant { name: String },
}

pub type ManifestResult<T> = Result<T, ManifestError>;

/// A named environment configuration to provision and pack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    /// Environment name, also the stem of the archive file name
    pub name: String,
    /// Channels consulted during resolution, highest priority first
    pub channels: Vec<String>,
    /// Packages to install, optionally version-pinned (e.g. "pillow=8.4")
    pub packages: Vec<String>,
}

/// A release manifest: the ordered variants to build plus archive options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Variants, provisioned strictly in order
    #[serde(rename = "variant")]
    pub variants: Vec<Variant>,

    /// Directory archives are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Platform tag in archive file names (`<name>-<tag>.zip`)
    #[serde(default = "default_platform_tag")]
    pub platform_tag: String,

    /// Keep environments after packing, skipping removal and cache clean
    #[serde(default)]
    pub keep_envs: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_platform_tag() -> String {
    DEFAULT_PLATFORM_TAG.to_string()
}

impl Default for Manifest {
    /// The built-in PlantSeg release pair: a CUDA-enabled environment and a
    /// CPU-only one, differing only by the `cpuonly` toggle package.
    fn default() -> Self {
        let channels: Vec<String> = ["pytorch", "conda-forge", "lcerrone", "awolny"]
            .into_iter()
            .map(String::from)
            .collect();

        Self {
            variants: vec![
                Variant {
                    name: "plant-seg-gpu".to_string(),
                    channels: channels.clone(),
                    packages: vec!["plantseg".to_string(), "pillow=8.4".to_string()],
                },
                Variant {
                    name: "plant-seg-cpu".to_string(),
                    channels,
                    packages: vec![
                        "plantseg".to_string(),
                        "pillow=8.4".to_string(),
                        "cpuonly".to_string(),
                    ],
                },
            ],
            output_dir: default_output_dir(),
            platform_tag: default_platform_tag(),
            keep_envs: false,
        }
    }
}

impl Manifest {
    /// Parse and validate a manifest from TOML text
    pub fn from_toml_str(raw: &str) -> ManifestResult<Self> {
        let manifest: Manifest = toml::from_str(raw)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Load and validate a manifest from a TOML file
    pub fn load(path: &Path) -> ManifestResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Look up a variant by name
    pub fn variant(&self, name: &str) -> ManifestResult<&Variant> {
        self.variants
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| ManifestError::UnknownVariant {
                name: name.to_string(),
            })
    }

    /// Names of every variant's environment, in provisioning order
    pub fn env_names(&self) -> Vec<String> {
        self.variants.iter().map(|v| v.name.clone()).collect()
    }

    fn validate(&self) -> ManifestResult<()> {
        if self.variants.is_empty() {
            return Err(ManifestError::Invalid {
                reason: "manifest defines no variants".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for variant in &self.variants {
            if variant.name.is_empty() {
                return Err(ManifestError::Invalid {
                    reason: "variant with empty name".to_string(),
                });
            }
            // Names double as live environment labels, so they must be unique
            if !seen.insert(variant.name.as_str()) {
                return Err(ManifestError::Invalid {
                    reason: format!("duplicate variant name '{}'", variant.name),
                });
            }
            if variant.packages.is_empty() {
                return Err(ManifestError::Invalid {
                    reason: format!("variant '{}' lists no packages", variant.name),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        output_dir = "dist"
        platform_tag = "win64"

        [[variant]]
        name = "plant-seg-gpu"
        channels = ["pytorch", "conda-forge", "lcerrone", "awolny"]
        packages = ["plantseg", "pillow=8.4"]

        [[variant]]
        name = "plant-seg-cpu"
        channels = ["pytorch", "conda-forge", "lcerrone", "awolny"]
        packages = ["plantseg", "pillow=8.4", "cpuonly"]
    "#;

    #[test]
    fn test_default_manifest() {
        let manifest = Manifest::default();
        assert_eq!(manifest.env_names(), vec!["plant-seg-gpu", "plant-seg-cpu"]);
        assert_eq!(manifest.platform_tag, "win64");
        assert_eq!(manifest.output_dir, PathBuf::from("."));
        assert!(!manifest.keep_envs);

        // The CPU variant is the GPU one plus the cpuonly toggle
        let cpu = manifest.variant("plant-seg-cpu").unwrap();
        assert!(cpu.packages.contains(&"cpuonly".to_string()));
        let gpu = manifest.variant("plant-seg-gpu").unwrap();
        assert!(!gpu.packages.contains(&"cpuonly".to_string()));
        assert_eq!(gpu.channels, cpu.channels);
    }

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::from_toml_str(SAMPLE).unwrap();
        assert_eq!(manifest.variants.len(), 2);
        assert_eq!(manifest.output_dir, PathBuf::from("dist"));
        assert!(!manifest.keep_envs);

        let gpu = manifest.variant("plant-seg-gpu").unwrap();
        assert_eq!(
            gpu.channels,
            vec!["pytorch", "conda-forge", "lcerrone", "awolny"]
        );
        assert_eq!(gpu.packages, vec!["plantseg", "pillow=8.4"]);
    }

    #[test]
    fn test_optional_fields_default() {
        let raw = r#"
            [[variant]]
            name = "demo"
            channels = ["conda-forge"]
            packages = ["python=3.10"]
        "#;
        let manifest = Manifest::from_toml_str(raw).unwrap();
        assert_eq!(manifest.output_dir, PathBuf::from("."));
        assert_eq!(manifest.platform_tag, "win64");
        assert!(!manifest.keep_envs);
    }

    #[test]
    fn test_unknown_variant() {
        let manifest = Manifest::default();
        assert!(matches!(
            manifest.variant("plant-seg-tpu"),
            Err(ManifestError::UnknownVariant { .. })
        ));
    }

    #[test]
    fn test_rejects_empty_manifest() {
        let result = Manifest::from_toml_str("output_dir = \".\"\nvariant = []");
        assert!(matches!(result, Err(ManifestError::Invalid { .. })));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let raw = r#"
            [[variant]]
            name = "demo"
            channels = []
            packages = ["python"]

            [[variant]]
            name = "demo"
            channels = []
            packages = ["python"]
        "#;
        let result = Manifest::from_toml_str(raw);
        match result {
            Err(ManifestError::Invalid { reason }) => assert!(reason.contains("duplicate")),
            other => panic!("expected invalid manifest, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_packageless_variant() {
        let raw = r#"
            [[variant]]
            name = "demo"
            channels = ["conda-forge"]
            packages = []
        "#;
        assert!(matches!(
            Manifest::from_toml_str(raw),
            Err(ManifestError::Invalid { .. })
        ));
    }
}
