use std::env;

use crate::{
    arch::ArchType,
    errors::{Error, Result},
};
use serde::{Deserialize, Serialize};

/// Required variables, checked in this order.
pub const REQUIRED_KEYS: &[&str] = &[
    "KUBERNETES_VERSION",
    "KUBERNETES_BUILD_DATE",
    "BINARY_BUCKET_NAME",
    "BINARY_BUCKET_REGION",
    "DOCKER_VERSION",
    "CNI_VERSION",
    "CNI_PLUGIN_VERSION",
];

/// Build-time configuration, resolved once at process start and then
/// passed to each step read-only.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct BuildConfig {
    pub kubernetes_version: String,
    pub kubernetes_build_date: String,
    pub binary_bucket_name: String,
    pub binary_bucket_region: String,
    pub docker_version: String,
    pub cni_version: String,
    pub cni_plugin_version: String,

    /// Toggles the container runtime step ("INSTALL_DOCKER", default true).
    pub install_docker: bool,
    /// Staging directory the orchestrator uploads template files to
    /// ("TEMPLATE_DIR", default "/tmp/worker").
    pub template_dir: String,
    /// Whether an access key was bound in the environment when the
    /// process started. Decides the artifact source for the whole run.
    pub aws_credentials: bool,
}

impl BuildConfig {
    /// Loads the configuration from the environment.
    /// The first unset or empty required variable fails the whole run.
    pub fn from_env() -> Result<Self> {
        for key in REQUIRED_KEYS.iter() {
            if env::var(key).ok().filter(|v| !v.is_empty()).is_none() {
                return Err(Error::MissingConfiguration {
                    name: key.to_string(),
                });
            }
        }

        let cfg = Self {
            kubernetes_version: env::var("KUBERNETES_VERSION").unwrap(),
            kubernetes_build_date: env::var("KUBERNETES_BUILD_DATE").unwrap(),
            binary_bucket_name: env::var("BINARY_BUCKET_NAME").unwrap(),
            binary_bucket_region: env::var("BINARY_BUCKET_REGION").unwrap(),
            docker_version: env::var("DOCKER_VERSION").unwrap(),
            cni_version: env::var("CNI_VERSION").unwrap(),
            cni_plugin_version: env::var("CNI_PLUGIN_VERSION").unwrap(),

            install_docker: env::var("INSTALL_DOCKER")
                .map(|v| v == "true")
                .unwrap_or(true),
            template_dir: env::var("TEMPLATE_DIR").unwrap_or_else(|_| "/tmp/worker".to_string()),
            aws_credentials: env::var("AWS_ACCESS_KEY_ID")
                .ok()
                .filter(|v| !v.is_empty())
                .is_some(),
        };
        log::info!(
            "loaded build configuration for Kubernetes {} ({}), bucket '{}' in '{}'",
            cfg.kubernetes_version,
            cfg.kubernetes_build_date,
            cfg.binary_bucket_name,
            cfg.binary_bucket_region
        );
        Ok(cfg)
    }

    /// Returns the object-storage domain suffix for the bucket region.
    pub fn s3_domain(&self) -> &'static str {
        match self.binary_bucket_region.as_str() {
            "cn-north-1" | "cn-northwest-1" => "amazonaws.com.cn",
            _ => "amazonaws.com",
        }
    }

    /// Key prefix of the release binaries inside the bucket.
    pub fn binary_key_prefix(&self, arch: ArchType) -> String {
        format!(
            "{}/{}/bin/linux/{}",
            self.kubernetes_version,
            self.kubernetes_build_date,
            arch.as_str()
        )
    }

    /// Public HTTPS base of the release binaries, for anonymous fetches
    /// against public buckets.
    pub fn public_url_base(&self, arch: ArchType) -> String {
        format!(
            "https://{}.s3.{}.{}/{}",
            self.binary_bucket_name,
            self.binary_bucket_region,
            self.s3_domain(),
            self.binary_key_prefix(arch)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example() -> BuildConfig {
        BuildConfig {
            kubernetes_version: "1.21.2".to_string(),
            kubernetes_build_date: "2021-07-31".to_string(),
            binary_bucket_name: "example-bucket".to_string(),
            binary_bucket_region: "us-west-2".to_string(),
            docker_version: "5:19.03.13".to_string(),
            cni_version: "v0.8.6".to_string(),
            cni_plugin_version: "v0.8.7".to_string(),
            install_docker: true,
            template_dir: "/tmp/worker".to_string(),
            aws_credentials: false,
        }
    }

    #[test]
    fn test_public_url_base() {
        let cfg = example();
        assert_eq!(
            cfg.public_url_base(ArchType::Amd64),
            "https://example-bucket.s3.us-west-2.amazonaws.com/1.21.2/2021-07-31/bin/linux/amd64"
        );
        assert_eq!(
            cfg.binary_key_prefix(ArchType::Arm64),
            "1.21.2/2021-07-31/bin/linux/arm64"
        );
    }

    #[test]
    fn test_s3_domain() {
        let mut cfg = example();
        assert_eq!(cfg.s3_domain(), "amazonaws.com");

        cfg.binary_bucket_region = "cn-north-1".to_string();
        assert_eq!(cfg.s3_domain(), "amazonaws.com.cn");
        assert!(cfg
            .public_url_base(ArchType::Amd64)
            .starts_with("https://example-bucket.s3.cn-north-1.amazonaws.com.cn/"));

        cfg.binary_bucket_region = "cn-northwest-1".to_string();
        assert_eq!(cfg.s3_domain(), "amazonaws.com.cn");
    }

    /// Env mutation lives in this one test so parallel test threads
    /// never race on the process environment.
    #[test]
    fn test_from_env_fail_fast() {
        for key in REQUIRED_KEYS.iter() {
            env::remove_var(key);
        }
        env::remove_var("INSTALL_DOCKER");
        env::remove_var("TEMPLATE_DIR");
        env::remove_var("AWS_ACCESS_KEY_ID");

        let err = BuildConfig::from_env().unwrap_err();
        assert!(matches!(err, Error::MissingConfiguration { .. }));

        env::set_var("KUBERNETES_VERSION", "1.21.2");
        env::set_var("KUBERNETES_BUILD_DATE", "2021-07-31");
        env::set_var("BINARY_BUCKET_NAME", "example-bucket");
        env::set_var("BINARY_BUCKET_REGION", "us-west-2");
        env::set_var("DOCKER_VERSION", "5:19.03.13");
        env::set_var("CNI_VERSION", "v0.8.6");
        env::set_var("CNI_PLUGIN_VERSION", "v0.8.7");

        let cfg = BuildConfig::from_env().unwrap();
        assert!(cfg.install_docker);
        assert!(!cfg.aws_credentials);
        assert_eq!(cfg.template_dir, "/tmp/worker");

        // each required key, when cleared, is reported by name
        for key in REQUIRED_KEYS.iter() {
            let saved = env::var(key).unwrap();
            env::set_var(key, "");
            let err = BuildConfig::from_env().unwrap_err();
            assert_eq!(
                err.message(),
                format!("required configuration '{key}' is not set")
            );
            env::set_var(key, saved);
        }

        env::set_var("INSTALL_DOCKER", "false");
        env::set_var("AWS_ACCESS_KEY_ID", "AKIAEXAMPLE");
        let cfg = BuildConfig::from_env().unwrap();
        assert!(!cfg.install_docker);
        assert!(cfg.aws_credentials);

        env::remove_var("INSTALL_DOCKER");
        env::remove_var("AWS_ACCESS_KEY_ID");
    }
}
