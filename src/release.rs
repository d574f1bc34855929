use crate::{
    errors::Result,
    imds, steps,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Where the provenance record lands in the image.
pub const RELEASE_PATH: &str = "/etc/eks/release";

/// Write-once build provenance, persisted to the image.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ReleaseMetadata {
    pub base_ami_id: String,
    pub build_time: String,
    pub build_kernel: String,
    pub arch: String,
}

impl ReleaseMetadata {
    /// Collects the provenance from the live host (IMDS for the base
    /// image id, the kernel for the rest).
    pub async fn collect() -> Result<Self> {
        let base_ami_id = imds::fetch_ami_id().await?;
        let (build_kernel, _) = steps::sh("uname -r")?;
        let (machine, _) = steps::sh("uname -m")?;

        Ok(Self {
            base_ami_id,
            build_time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            build_kernel: build_kernel.trim().to_string(),
            arch: machine.trim().to_string(),
        })
    }

    /// Renders the "KEY=VALUE" record the way consumers of the image
    /// expect to source it.
    pub fn render(&self) -> String {
        format!(
            "BASE_AMI_ID={}\nBUILD_TIME={}\nBUILD_KERNEL={}\nARCH={}\n",
            self.base_ami_id, self.build_time, self.build_kernel, self.arch
        )
    }
}

/// Collects and persists the release record, read-only.
pub async fn write() -> Result<()> {
    let metadata = ReleaseMetadata::collect().await?;
    log::info!("writing release metadata:\n{}", metadata.render());
    steps::write_file_as_root(&metadata.render(), RELEASE_PATH, "0444")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let metadata = ReleaseMetadata {
            base_ami_id: "ami-0123456789abcdef0".to_string(),
            build_time: "2021-07-31T00:00:00.000Z".to_string(),
            build_kernel: "5.11.0-1014-aws".to_string(),
            arch: "x86_64".to_string(),
        };
        assert_eq!(
            metadata.render(),
            "BASE_AMI_ID=ami-0123456789abcdef0
BUILD_TIME=2021-07-31T00:00:00.000Z
BUILD_KERNEL=5.11.0-1014-aws
ARCH=x86_64
"
        );
    }
}
