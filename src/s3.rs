use std::path::Path;

use crate::errors::{Error, Result};
use aws_config::{self, meta::region::RegionProviderChain};
use aws_sdk_s3::{
    operation::head_object::{HeadObjectError, HeadObjectOutput},
    Client,
};
use aws_smithy_client::SdkError;
use aws_types::{region::Region, SdkConfig as AwsSdkConfig};
use tokio::{
    fs::File,
    io::AsyncWriteExt,
};
use tokio_stream::StreamExt;

/// Implements the S3 client for the release binary bucket.
#[derive(Debug, Clone)]
pub struct Manager {
    pub region: String,
    pub cli: Client,
}

impl Manager {
    pub fn new(shared_config: &AwsSdkConfig) -> Self {
        Self {
            region: shared_config.region().unwrap().to_string(),
            cli: Client::new(shared_config),
        }
    }

    /// Returns "None" if the S3 file does not exist.
    pub async fn exists(&self, s3_bucket: &str, s3_key: &str) -> Result<Option<HeadObjectOutput>> {
        let head_output = match self
            .cli
            .head_object()
            .bucket(s3_bucket.to_string())
            .key(s3_key.to_string())
            .send()
            .await
        {
            Ok(out) => out,
            Err(e) => {
                if is_err_head_not_found(&e) {
                    log::info!("{s3_key} not found");
                    return Ok(None);
                }

                log::warn!("failed to head {s3_key}: {}", explain_err_head_object(&e));
                return Err(Error::Fetch {
                    message: format!("failed head_object {}", e),
                    retryable: is_sdk_err_retryable(&e),
                });
            }
        };

        log::info!(
            "head object exists 's3://{}/{}' (size {})",
            s3_bucket,
            s3_key,
            human_readable::bytes(head_output.content_length() as f64),
        );
        Ok(Some(head_output))
    }

    /// Downloads an object from the bucket using stream.
    ///
    /// WARN: use stream! otherwise it can cause OOM -- don't do the following!
    ///       "aws_smithy_http::byte_stream:ByteStream.collect" reads all the data into memory
    ///       "File.write_all_buf(&mut bytes)" to write bytes
    ///
    /// A missing object fails the run; the provisioner has nothing to
    /// fall back to when a release artifact is absent.
    pub async fn get_object(&self, s3_bucket: &str, s3_key: &str, file_path: &str) -> Result<()> {
        if Path::new(file_path).exists() {
            return Err(Error::Install {
                message: format!("file path '{file_path}' already exists"),
            });
        }

        log::info!("checking if the s3 object '{s3_key}' exists before downloading");
        let head_object = self.exists(s3_bucket, s3_key).await?;
        if head_object.is_none() {
            return Err(Error::Fetch {
                message: format!("s3 object '{s3_key}' does not exist in bucket '{s3_bucket}'"),
                retryable: false,
            });
        }

        let mut output = self
            .cli
            .get_object()
            .bucket(s3_bucket.to_string())
            .key(s3_key.to_string())
            .send()
            .await
            .map_err(|e| Error::Fetch {
                message: format!("failed get_object {}", e),
                retryable: is_sdk_err_retryable(&e),
            })?;

        // ref. https://docs.rs/tokio-stream/latest/tokio_stream/
        let mut file = File::create(file_path).await.map_err(|e| Error::Install {
            message: format!("failed File::create {}", e),
        })?;

        log::info!("writing byte stream to file {}", file_path);
        while let Some(d) = output.body.try_next().await.map_err(|e| Error::Fetch {
            message: format!("failed ByteStream::try_next {}", e),
            retryable: false,
        })? {
            file.write_all(&d).await.map_err(|e| Error::Install {
                message: format!("failed File.write_all {}", e),
            })?;
        }
        file.flush().await.map_err(|e| Error::Install {
            message: format!("failed File.flush {}", e),
        })?;

        Ok(())
    }
}

/// Loads an AWS config for the bucket region from default environments.
pub async fn load_config(reg: &str) -> AwsSdkConfig {
    log::info!("loading AWS configuration for region '{reg}'");
    let regp = RegionProviderChain::first_try(Region::new(reg.to_string()))
        .or_default_provider()
        .or_else(Region::new("us-west-2"));

    aws_config::from_env().region(regp).load().await
}

#[inline]
pub fn is_sdk_err_retryable<E>(e: &SdkError<E>) -> bool {
    match e {
        SdkError::TimeoutError(_) | SdkError::ResponseError { .. } => true,
        SdkError::DispatchFailure(e) => e.is_timeout() || e.is_io(),
        _ => false,
    }
}

#[inline]
fn is_err_head_not_found(e: &SdkError<HeadObjectError>) -> bool {
    match e {
        SdkError::ServiceError(err) => err.err().is_not_found(),
        _ => false,
    }
}

#[inline]
fn explain_err_head_object(e: &SdkError<HeadObjectError>) -> String {
    match e {
        SdkError::ServiceError(err) => format!(
            "head_object [code '{:?}', message '{:?}']",
            err.err().meta().code(),
            err.err().meta().message(),
        ),
        _ => e.to_string(),
    }
}
