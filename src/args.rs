/// Command-line arguments.

use clap::{Parser, Subcommand};
use cxraide_client::DisplayContext;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Service base address (overrides API_URL)
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// Bearer credential forwarded as-is (overrides AUTH_TOKEN)
    #[arg(long, value_name = "TOKEN")]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the model status reported by the service
    Status,

    /// Send an image for prediction and print the detections as JSON
    Predict {
        /// Image file (JPEG, PNG, WebP or BMP)
        #[arg(long, value_name = "FILE")]
        image: PathBuf,

        /// Size the image is displayed at, e.g. 800x450; boxes are mapped into that space
        #[arg(long, value_name = "WxH", value_parser = parse_display)]
        display: Option<DisplayContext>,

        /// Directory to write the clean and annotated images to
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,

        /// Synthesize predictions when the service cannot be reached
        #[arg(long)]
        fallback: bool,

        /// TrueType/OpenType font for label text on synthesized annotations
        #[arg(long, value_name = "FILE")]
        font: Option<PathBuf>,
    },
}

fn parse_display(value: &str) -> Result<DisplayContext, String> {
    DisplayContext::parse(value).ok_or_else(|| format!("expected WIDTHxHEIGHT with positive sizes, got {value:?}"))
}
