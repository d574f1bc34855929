use super::{sh, stage_template, write_file_as_root};
use crate::{
    arch::ArchType,
    config::BuildConfig,
    errors::{Error, Result},
    source,
};

const REPO_KEY_URL: &str = "https://download.docker.com/linux/ubuntu/gpg";
const KEYRING_PATH: &str = "/usr/share/keyrings/docker-archive-keyring.gpg";
const APT_SOURCE_PATH: &str = "/etc/apt/sources.list.d/docker.list";
const DAEMON_JSON_PATH: &str = "/etc/docker/daemon.json";

/// Adds the Docker apt repository, installs the pinned runtime
/// packages, writes the staged daemon config, and enables the service.
pub async fn install(cfg: &BuildConfig, arch_type: ArchType) -> Result<()> {
    log::info!("installing container runtime docker-ce {}", cfg.docker_version);

    let tmp_key_path = random_manager::tmp_path(10, None).map_err(|e| Error::Install {
        message: format!("failed random_manager::tmp_path {}", e),
    })?;
    source::http_get_to_file(REPO_KEY_URL, &tmp_key_path).await?;
    sh(&format!("sudo rm -f {KEYRING_PATH}"))?;
    sh(&format!("sudo gpg --dearmor -o {KEYRING_PATH} {tmp_key_path}"))?;
    std::fs::remove_file(&tmp_key_path).ok();

    let (codename, _) = sh("lsb_release -cs")?;
    write_file_as_root(
        &apt_source_line(arch_type, codename.trim()),
        APT_SOURCE_PATH,
        "0644",
    )?;

    sh("sudo DEBIAN_FRONTEND=noninteractive apt-get update -yq")?;
    sh(&format!(
        "sudo DEBIAN_FRONTEND=noninteractive apt-get install -yq docker-ce={v} docker-ce-cli={v} containerd.io",
        v = cfg.docker_version
    ))?;

    stage_template(cfg, "docker-daemon.json", DAEMON_JSON_PATH)?;

    sh("sudo usermod -aG docker ubuntu")?;
    sh("sudo systemctl daemon-reload")?;
    sh("sudo systemctl enable docker")?;

    Ok(())
}

fn apt_source_line(arch_type: ArchType, codename: &str) -> String {
    format!(
        "deb [arch={} signed-by={KEYRING_PATH}] https://download.docker.com/linux/ubuntu {codename} stable\n",
        arch_type.as_str()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apt_source_line() {
        assert_eq!(
            apt_source_line(ArchType::Amd64, "focal"),
            "deb [arch=amd64 signed-by=/usr/share/keyrings/docker-archive-keyring.gpg] https://download.docker.com/linux/ubuntu focal stable\n"
        );
        assert!(apt_source_line(ArchType::Arm64, "jammy").contains("[arch=arm64 "));
    }
}
