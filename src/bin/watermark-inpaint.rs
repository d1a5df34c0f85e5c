use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use watermark_inpaint::{EngineConfig, InpaintEngine};

#[derive(Parser)]
#[command(
    name = "watermark-inpaint",
    about = "Remove watermarks by inpainting masked regions",
    version,
    after_help = "Simple usage: watermark-inpaint <image> -m <mask.png>\n\n\
                  Without a local model (--model) or cloud token (--token /\n\
                  REPLICATE_API_TOKEN), the classical fallback is used."
)]
struct Cli {
    /// Input image file
    input: String,

    /// Mask image (white = repaint); required unless --status
    #[arg(short, long)]
    mask: Option<String>,

    /// Output file (default: {name}_cleaned.png)
    #[arg(short, long)]
    output: Option<String>,

    /// Path to the local inpainting model (ONNX)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Cloud API token (falls back to REPLICATE_API_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// Print backend availability and exit
    #[arg(long)]
    status: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(format!("{stem}_cleaned.png"))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "watermark_inpaint=debug"
    } else {
        "watermark_inpaint=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = EngineConfig {
        model_path: cli.model,
        cloud_api_token: cli
            .token
            .or_else(|| std::env::var("REPLICATE_API_TOKEN").ok()),
        ..EngineConfig::default()
    };
    let engine = InpaintEngine::new(config);

    if cli.status {
        let status = engine.backend_status();
        println!("mode: {}", status.mode);
        println!("local model loaded: {}", status.local_loaded);
        println!("cloud available: {}", status.cloud_available);
        return;
    }

    let input_path = Path::new(&cli.input);
    let image_bytes = match std::fs::read(input_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error: failed to read {}: {e}", cli.input);
            process::exit(1);
        }
    };

    let mask_bytes = match &cli.mask {
        Some(path) => match std::fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                eprintln!("Error: failed to read mask {path}: {e}");
                process::exit(1);
            }
        },
        None => None,
    };

    let result = engine
        .remove_watermark(&image_bytes, mask_bytes.as_deref())
        .await;

    match result {
        Ok(output) => {
            let output_path = cli
                .output
                .map_or_else(|| default_output_path(input_path), PathBuf::from);
            if let Err(e) = std::fs::write(&output_path, output) {
                eprintln!("Error: failed to write {}: {e}", output_path.display());
                process::exit(1);
            }
            eprintln!("[OK] {}", output_path.display());
        }
        Err(e) => {
            eprintln!("[FAIL] {}: {e}", cli.input);
            process::exit(1);
        }
    }
}
