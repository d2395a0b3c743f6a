use clap::{Parser, Subcommand};
use provisioner::conda::{detect_tool, CondaError};
use provisioner::packer::{packer_available, PACKER_COMMAND};
use provisioner::pipeline::{CondaCli, CondaPackCli, Pipeline};
use provisioner::variant::Manifest;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "packager")]
#[command(about = "Provision, pack, and tear down PlantSeg release environments")]
struct Cli {
    /// Release manifest (TOML); defaults to the built-in PlantSeg manifest
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision, pack, and tear down every variant in the manifest
    Run {
        /// Directory archives are written to
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Keep the environments after packing (skips removal and cache clean)
        #[arg(long)]
        keep_envs: bool,
    },
    /// Provision and pack a single variant, leaving its environment in place
    Provision {
        /// Variant name from the manifest
        name: String,
        /// Directory the archive is written to
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Remove the manifest's environments and clean the package caches
    Cleanup,
    /// Report which external tools are available
    Check,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let manifest = load_manifest(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            output_dir,
            keep_envs,
        } => run_all(manifest, output_dir, keep_envs)?,
        Commands::Provision { name, output_dir } => provision_one(manifest, &name, output_dir)?,
        Commands::Cleanup => cleanup(manifest)?,
        Commands::Check => check()?,
    }

    Ok(())
}

fn load_manifest(path: Option<&Path>) -> Result<Manifest, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            info!("loading manifest from {}", path.display());
            Ok(Manifest::load(path)?)
        }
        None => {
            info!("using the built-in PlantSeg manifest");
            Ok(Manifest::default())
        }
    }
}

fn detected_pipeline() -> Result<Pipeline<CondaCli, CondaPackCli>, Box<dyn std::error::Error>> {
    let manager = CondaCli::detect();
    if !manager.tool().is_available() {
        return Err(CondaError::NoToolAvailable.into());
    }
    println!("Using environment manager: {}", manager.tool().command());
    Ok(Pipeline::new(manager, CondaPackCli))
}

fn run_all(
    mut manifest: Manifest,
    output_dir: Option<PathBuf>,
    keep_envs: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(dir) = output_dir {
        manifest.output_dir = dir;
    }
    if keep_envs {
        manifest.keep_envs = true;
    }

    let pipeline = detected_pipeline()?;

    println!(
        "🚀 Provisioning {} variant(s) into {}",
        manifest.variants.len(),
        manifest.output_dir.display()
    );

    match pipeline.run(&manifest) {
        Ok(summary) => {
            for archive in &summary.archives {
                println!("📦 {}", archive.display());
            }
            if manifest.keep_envs {
                println!(
                    "✅ {} archive(s) written; kept environment(s): {}",
                    summary.archives.len(),
                    summary.remaining.join(", ")
                );
            } else {
                println!(
                    "✅ {} archive(s) written, {} environment(s) removed, caches cleaned",
                    summary.archives.len(),
                    summary.removed.len()
                );
                for name in &summary.remaining {
                    println!("⚠️  environment '{name}' was not removed; remove it manually");
                }
            }
            Ok(())
        }
        Err(e) => {
            error!("provisioning run failed: {e}");
            Err(e.into())
        }
    }
}

fn provision_one(
    manifest: Manifest,
    name: &str,
    output_dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let variant = manifest.variant(name)?.clone();
    let output_dir = output_dir.unwrap_or_else(|| manifest.output_dir.clone());

    let pipeline = detected_pipeline()?;

    let archive = pipeline.provision(&variant, &output_dir, &manifest.platform_tag)?;
    println!("📦 {}", archive.display());
    println!(
        "✅ Environment '{}' is still installed; run 'packager cleanup' to remove it",
        variant.name
    );

    Ok(())
}

fn cleanup(manifest: Manifest) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = detected_pipeline()?;

    let report = pipeline.cleanup(&manifest.env_names());
    println!(
        "✅ Removed {} environment(s), caches cleaned",
        report.removed.len()
    );
    for name in &report.remaining {
        println!("⚠️  environment '{name}' was not removed; remove it manually");
    }

    Ok(())
}

fn check() -> Result<(), Box<dyn std::error::Error>> {
    let tool = detect_tool();
    let mut missing = false;

    if tool.is_available() {
        println!("✓ environment manager: {}", tool.command());
    } else {
        println!("✗ no conda-compatible environment manager found (micromamba, mamba, conda)");
        missing = true;
    }

    if packer_available() {
        println!("✓ packer: {PACKER_COMMAND}");
    } else {
        println!("✗ {PACKER_COMMAND} not found");
        missing = true;
    }

    if missing {
        return Err("required external tools are missing".into());
    }
    Ok(())
}
