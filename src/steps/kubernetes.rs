use super::{sh, stage_template};
use crate::{
    arch::ArchType,
    artifact::{self, ArtifactSpec, ChecksumAlgorithm},
    config::BuildConfig,
    errors::Result,
    source::ArtifactSource,
};

/// System binary directory the node binaries land in.
pub const BIN_DIR: &str = "/usr/bin";

/// Shared plugin directory both CNI bundles unpack into.
pub const CNI_BIN_DIR: &str = "/opt/cni/bin";

/// The fixed binary list, fetched from the release bucket. Every entry
/// ships with a sibling ".sha256" file.
pub const BINARIES: &[&str] = &["kubelet", "kubectl", "aws-iam-authenticator"];

/// Fetches, verifies, and installs the node binaries and the two CNI
/// bundles, then stages the kubelet unit and config files.
pub async fn install(
    cfg: &BuildConfig,
    arch_type: ArchType,
    source: &ArtifactSource,
) -> Result<()> {
    log::info!(
        "installing Kubernetes {} artifacts via the {} source",
        cfg.kubernetes_version,
        source.as_str()
    );

    sh("sudo mkdir -p /var/lib/kubernetes /var/lib/kubelet /etc/kubernetes/manifests /etc/kubernetes/kubelet")?;

    for binary in BINARIES.iter() {
        let spec = ArtifactSpec::new(binary, ChecksumAlgorithm::Sha256, BIN_DIR);
        artifact::install_executable(source, &spec).await?;
    }

    // the CNI release tarballs are public artifacts; always anonymous,
    // with ".sha512" sibling files
    let cni_source = ArtifactSource::http(&cni_url_base(&cfg.cni_version));
    let spec = ArtifactSpec::new(
        &cni_bundle_name(arch_type, &cfg.cni_version),
        ChecksumAlgorithm::Sha512,
        CNI_BIN_DIR,
    );
    artifact::install_bundle(&cni_source, &spec).await?;

    let plugins_source = ArtifactSource::http(&cni_plugins_url_base(&cfg.cni_plugin_version));
    let spec = ArtifactSpec::new(
        &cni_plugins_bundle_name(arch_type, &cfg.cni_plugin_version),
        ChecksumAlgorithm::Sha512,
        CNI_BIN_DIR,
    );
    artifact::install_bundle(&plugins_source, &spec).await?;

    stage_template(cfg, "kubelet.service", "/etc/systemd/system/kubelet.service")?;
    stage_template(cfg, "kubelet-kubeconfig", "/var/lib/kubelet/kubeconfig")?;
    stage_template(
        cfg,
        "kubelet-config.json",
        "/etc/kubernetes/kubelet/kubelet-config.json",
    )?;

    sh("sudo systemctl daemon-reload")?;
    // the bootstrap script enables kubelet once the node joins a cluster
    sh("sudo systemctl disable kubelet")?;

    Ok(())
}

fn cni_url_base(cni_version: &str) -> String {
    format!("https://github.com/containernetworking/cni/releases/download/{cni_version}")
}

fn cni_plugins_url_base(cni_plugin_version: &str) -> String {
    format!("https://github.com/containernetworking/plugins/releases/download/{cni_plugin_version}")
}

fn cni_bundle_name(arch_type: ArchType, cni_version: &str) -> String {
    format!("cni-{}-{}.tgz", arch_type.as_str(), cni_version)
}

fn cni_plugins_bundle_name(arch_type: ArchType, cni_plugin_version: &str) -> String {
    format!(
        "cni-plugins-linux-{}-{}.tgz",
        arch_type.as_str(),
        cni_plugin_version
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cni_names() {
        assert_eq!(
            cni_bundle_name(ArchType::Amd64, "v0.8.6"),
            "cni-amd64-v0.8.6.tgz"
        );
        assert_eq!(
            cni_plugins_bundle_name(ArchType::Arm64, "v0.8.7"),
            "cni-plugins-linux-arm64-v0.8.7.tgz"
        );
        assert_eq!(
            cni_url_base("v0.8.6"),
            "https://github.com/containernetworking/cni/releases/download/v0.8.6"
        );
        assert_eq!(
            cni_plugins_url_base("v0.8.7"),
            "https://github.com/containernetworking/plugins/releases/download/v0.8.7"
        );
    }
}
