pub mod cleanup;
pub mod docker;
pub mod eks;
pub mod kubernetes;
pub mod network;
pub mod packages;
pub mod ready;
pub mod time_sync;

use std::{fs::File, io::Write, path::Path};

use crate::{
    arch,
    config::BuildConfig,
    errors::{Error, Result},
    release,
    source::ArtifactSource,
};
use tokio::time::Duration;

/// Runs the whole provisioning sequence against the live host,
/// aborting on the first error.
pub async fn provision(cfg: &BuildConfig) -> Result<()> {
    ready::wait_for_cloud_init(Duration::from_secs(120), Duration::from_secs(5))?;

    let arch_type = arch::detect()?;
    log::info!("provisioning for arch '{}'", arch_type.as_str());

    packages::install()?;
    time_sync::configure()?;
    network::configure(cfg)?;

    if cfg.install_docker {
        docker::install(cfg, arch_type).await?;
    } else {
        log::info!("INSTALL_DOCKER is false; skipping container runtime install");
    }

    let source = ArtifactSource::for_bucket(cfg, arch_type).await;
    kubernetes::install(cfg, arch_type, &source).await?;
    eks::install(cfg)?;
    release::write().await?;
    cleanup::run()?;

    Ok(())
}

/// Runs a single host command, folding the failure into the install
/// error kind.
pub(crate) fn sh(cmd: &str) -> Result<(String, String)> {
    command_manager::run(cmd)
        .map(|o| (o.stdout, o.stderr))
        .map_err(|e| Error::Install {
            message: format!("failed '{cmd}' {e}"),
        })
}

/// Writes "contents" to a root-owned path, via a temporary file the way
/// the running user can always create one.
pub(crate) fn write_file_as_root(contents: &str, dest_path: &str, mode: &str) -> Result<()> {
    let tmp_path = random_manager::tmp_path(10, None).map_err(|e| Error::Install {
        message: format!("failed random_manager::tmp_path {}", e),
    })?;
    let mut f = File::create(&tmp_path).map_err(|e| Error::Install {
        message: format!("failed File::create {}", e),
    })?;
    f.write_all(contents.as_bytes())
        .map_err(|e| Error::Install {
            message: format!("failed to write file {}", e),
        })?;

    if let Some(parent) = Path::new(dest_path).parent() {
        sh(&format!("sudo mkdir -p {}", parent.display()))?;
    }
    sh(&format!("sudo cp {tmp_path} {dest_path}"))?;
    sh(&format!("sudo chmod {mode} {dest_path}"))?;
    std::fs::remove_file(&tmp_path).ok();

    Ok(())
}

/// Relocates a file the orchestrator staged in the template directory.
/// A missing template fails the run; the image is incomplete without it.
pub(crate) fn stage_template(cfg: &BuildConfig, name: &str, dest_path: &str) -> Result<()> {
    let src = Path::new(&cfg.template_dir).join(name);
    if !src.exists() {
        return Err(Error::Install {
            message: format!("template file '{}' not found", src.display()),
        });
    }

    log::info!("staging template '{}' to '{dest_path}'", src.display());
    if let Some(parent) = Path::new(dest_path).parent() {
        sh(&format!("sudo mkdir -p {}", parent.display()))?;
    }
    sh(&format!("sudo cp {} {dest_path}", src.display()))?;
    sh(&format!("sudo chown root:root {dest_path}"))?;

    Ok(())
}
