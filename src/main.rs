use eks_ami_provisioner::{config::BuildConfig, errors::Result, steps};

/// Invoked by the image-build orchestrator with the build variables in
/// the environment; any failure aborts the whole provisioning session.
#[tokio::main]
async fn main() {
    // ref. https://github.com/env-logger-rs/env_logger/issues/47
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if let Err(e) = run().await {
        log::error!("provisioning failed: {}", e.message());
        std::process::exit(1);
    }
    log::info!("SUCCESS");
}

async fn run() -> Result<()> {
    let cfg = BuildConfig::from_env()?;
    steps::provision(&cfg).await
}
