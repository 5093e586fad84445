use anyhow::{Context, Result};
use clap::Parser;
use gemini_image_gen::app::App;
use gemini_image_gen::models::{Config, ImagePayload};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "gemini-image-gen")]
#[command(about = "Generate or edit an image with Gemini")]
struct CliArgs {
    /// Text prompt; may be omitted when reference images are given.
    #[arg(value_name = "PROMPT")]
    prompt: Vec<String>,

    /// Reference image to edit or draw from (repeatable).
    #[arg(short, long = "image", value_name = "PATH")]
    images: Vec<PathBuf>,

    /// Keep the generated file instead of deleting it after delivery.
    #[arg(long)]
    keep: bool,
}

async fn load_reference_images(paths: &[PathBuf]) -> Result<Vec<ImagePayload>> {
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read reference image {}", path.display()))?;
        images.push(ImagePayload::from_bytes(bytes));
    }
    Ok(images)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gemini_image_gen=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("{}", App::failure_reason(&e));
            std::process::exit(2);
        }
    };

    let images = load_reference_images(&args.images).await?;
    let prompt = args.prompt.join(" ");
    let app = App::new(&config);

    match app.generate(&prompt, images).await {
        Ok(stored) => {
            println!("{}", stored.path.display());

            if !args.keep {
                if let Some(pending) = app.after_send(&stored) {
                    info!(
                        "Removing {} in {}s",
                        stored.path.display(),
                        app.delivery().delete_delay.as_secs()
                    );
                    pending.await?;
                }
            }
            Ok(())
        }
        Err(e) => {
            error!("Generation failed: {}", e);
            eprintln!("{}", App::failure_reason(&e));
            std::process::exit(if e.is_configuration() { 2 } else { 1 });
        }
    }
}
