/// Command-line front end for the prediction client.
///
/// Reads configuration from the environment, lets flags override the service address and
/// credential, and cancels every in-flight request on Ctrl-C.

mod args;

use args::{Args, Command};
use ab_glyph::FontArc;
use clap::Parser;
use cxraide_client::fallback::FallbackPredictor;
use cxraide_client::preprocess::encode::{decode_data_url, extension_for};
use cxraide_client::service::ModelServiceClient;
use cxraide_client::{AppError, Config, DisplayContext, Outcome, PredictOutcome, PredictionResult};
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cxraide_client=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // All work is cooperative on one thread; preprocessing goes to the blocking pool
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError::Config(format!("Failed to build runtime: {e}")))?;

    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), AppError> {
    let mut config = Config::from_env();
    if let Some(api_url) = args.api_url {
        config = config.with_api_url(api_url);
    }
    if args.token.is_some() {
        config = config.with_auth_token(args.token);
    }

    info!("API URL: {}", config.base_url());
    info!("Model input size: {}", config.input_size);

    let mut predictor = FallbackPredictor::new(config.input_size).with_jpeg_quality(config.jpeg_quality);
    if let Command::Predict { font: Some(path), .. } = &args.command {
        predictor = predictor.with_font(load_font(path).await?);
    }
    let client = ModelServiceClient::with_fallback(config, predictor)?;

    match args.command {
        Command::Status => match with_interrupt(&client, client.check_status()).await? {
            Outcome::Completed(status) => print_json(&status),
            Outcome::Cancelled => {
                info!("Status check cancelled");
                Ok(())
            }
        },
        Command::Predict {
            image,
            display,
            out_dir,
            fallback,
            ..
        } => {
            let bytes = tokio::fs::read(&image).await?;
            let outcome = match with_interrupt(&client, client.predict(&bytes, display)).await {
                Err(err) if fallback && err.is_network() => {
                    warn!("Service unreachable ({err}), synthesizing predictions");
                    PredictOutcome::Synthetic(client.synthesize_fallback(Some(&bytes), display).await?)
                }
                other => other?,
            };
            report(outcome, display, out_dir.as_deref()).await
        }
    }
}

async fn load_font(path: &Path) -> Result<FontArc, AppError> {
    let bytes = tokio::fs::read(path).await?;
    FontArc::try_from_vec(bytes).map_err(|e| AppError::Config(format!("Invalid font {}: {e}", path.display())))
}

/// Drive `fut`; on Ctrl-C cancel every category and let `fut` settle as cancelled.
async fn with_interrupt<F: Future>(client: &ModelServiceClient, fut: F) -> F::Output {
    tokio::pin!(fut);
    tokio::select! {
        out = &mut fut => return out,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling in-flight requests");
            client.cancel(None);
        }
    }
    fut.await
}

#[derive(Serialize)]
struct Report<'a> {
    source: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    display: Option<DisplayContext>,
    predictions: &'a [cxraide_client::Detection],
    image_size: cxraide_client::ImageSize,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

async fn report(outcome: PredictOutcome, display: Option<DisplayContext>, out_dir: Option<&Path>) -> Result<(), AppError> {
    let (source, result) = match &outcome {
        PredictOutcome::Served(result) => ("service", result),
        PredictOutcome::Synthetic(result) => ("synthetic", result),
        PredictOutcome::Cancelled => {
            info!("Prediction cancelled, nothing to report");
            return Ok(());
        }
    };

    if outcome.is_synthetic() {
        warn!("Detections are synthetic and do not come from the model");
    }

    if let Some(dir) = out_dir {
        write_images(result, dir).await?;
    }

    print_json(&Report {
        source,
        display,
        predictions: &result.predictions,
        image_size: result.image_size,
        message: result.message.as_deref(),
    })
}

async fn write_images(result: &PredictionResult, dir: &Path) -> Result<(), AppError> {
    tokio::fs::create_dir_all(dir).await?;

    for (name, url) in [("clean", &result.clean_image), ("annotated", &result.annotated_image)] {
        if url.is_empty() {
            continue;
        }
        let (mime, bytes) = decode_data_url(url)?;
        let path = dir.join(format!("{name}.{}", extension_for(&mime)));
        tokio::fs::write(&path, bytes).await?;
        info!("Wrote {}", path.display());
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| AppError::Encode(format!("JSON output: {e}")))?;
    println!("{text}");
    Ok(())
}
