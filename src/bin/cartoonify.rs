//! CLI for Cartoonify - photo to cartoon portrait.

use cartoonify::{
    ApiKey, EncodedImage, EnvCredentials, FileSink, GeminiModel, GeminiProvider, ImageProvider,
    KeyPicker, View, Workflow, WorkflowHandle, API_KEY_ENV_VARS, DOWNLOAD_FILENAME,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cartoonify")]
#[command(about = "Turn a photo into a 3D animated movie style cartoon portrait via Gemini")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// API key (falls back to GOOGLE_API_KEY / GEMINI_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Gemini model to use
    #[arg(short, long, global = true, value_enum, default_value = "nano-banana")]
    model: ModelArg,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Cartoonify an image file
    Convert(ConvertArgs),

    /// Check that the API key and model are usable
    Check,
}

#[derive(Args)]
struct ConvertArgs {
    /// Source image (PNG, JPEG or WebP)
    input: PathBuf,

    /// Directory to save the result into
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Request timeout in seconds (none by default)
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    NanoBanana,
    NanoBananaPro,
}

impl From<ModelArg> for GeminiModel {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::NanoBanana => GeminiModel::NanoBanana,
            ModelArg::NanoBananaPro => GeminiModel::NanoBananaPro,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let key = match &cli.api_key {
        Some(k) => ApiKey::new(k.clone()),
        None => ApiKey::from_env(),
    };

    match &cli.command {
        Commands::Convert(args) => convert(&cli, args, key).await,
        Commands::Check => check(&cli, key).await,
    }
}

fn build_provider(cli: &Cli, key: ApiKey, timeout: Option<u64>) -> anyhow::Result<GeminiProvider> {
    let mut builder = GeminiProvider::builder()
        .api_key_slot(key)
        .model(cli.model.into());
    if let Some(secs) = timeout {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    Ok(builder.build()?)
}

/// Prompts for a key on the terminal. Fails when stdin is not interactive.
fn terminal_picker() -> KeyPicker {
    Arc::new(|| {
        if !std::io::stdin().is_terminal() {
            return Err(cartoonify::CartoonifyError::Dialog(format!(
                "stdin is not a terminal; set {}",
                API_KEY_ENV_VARS[0]
            )));
        }
        eprint!("Enter your Gemini API key: ");
        std::io::stderr().flush()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        let line = line.trim();
        Ok((!line.is_empty()).then(|| line.to_string()))
    })
}

async fn convert(cli: &Cli, args: &ConvertArgs, key: ApiKey) -> anyhow::Result<()> {
    let source = EncodedImage::from_path(&args.input)?;
    let provider = build_provider(cli, key.clone(), args.timeout)?;
    let gate = EnvCredentials::new(key).with_picker(terminal_picker());
    let sink = FileSink::new(&args.output);

    let handle = Workflow::spawn(Arc::new(provider), Arc::new(gate), Arc::new(sink.clone()));
    handle.select_source(source.to_data_url()).await?;

    let view = drive(&handle, cli.json).await?;
    match view {
        View::Result { generated, .. } => {
            handle.download().await?;
            let path = sink.path_for(DOWNLOAD_FILENAME);
            if cli.json {
                let result = serde_json::json!({
                    "success": true,
                    "input": args.input.display().to_string(),
                    "output": path.display().to_string(),
                    "mime_type": generated.mime_type,
                    "size_bytes": generated.size(),
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!(
                    "Cartoonified image: {} ({} bytes, {})",
                    path.display(),
                    generated.size(),
                    generated.mime_type
                );
            }
            Ok(())
        }
        View::Error { message, .. } => {
            if cli.json {
                let result = serde_json::json!({ "success": false, "error": message });
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            anyhow::bail!(message)
        }
        other => anyhow::bail!("workflow stopped in unexpected state: {}", other.name()),
    }
}

/// Walks the views until a terminal one, prompting for a key at most once.
async fn drive(handle: &WorkflowHandle, json: bool) -> anyhow::Result<View> {
    let mut prompted = false;
    let mut views = handle.subscribe();

    loop {
        let view = views.borrow_and_update().clone();
        match view {
            View::KeyMissing
            | View::Error {
                offer_key_selection: true,
                ..
            } if !prompted => {
                prompted = true;
                handle.select_key().await?;
                continue;
            }
            View::KeyMissing => {
                anyhow::bail!("no API key selected; set {}", API_KEY_ENV_VARS[0])
            }
            View::Busy => {
                if !json {
                    eprintln!("Cartoonifying...");
                }
            }
            View::Empty => {}
            terminal => return Ok(terminal),
        }
        views.changed().await?;
    }
}

async fn check(cli: &Cli, key: ApiKey) -> anyhow::Result<()> {
    let provider = build_provider(cli, key, None)?;
    let model = provider.model().as_str();
    let result = provider.health_check().await;

    if cli.json {
        let output = serde_json::json!({
            "provider": provider.name(),
            "model": model,
            "ok": result.is_ok(),
            "error": result.as_ref().err().map(|e| e.user_message()),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        match &result {
            Ok(()) => println!("✓ {} ({}) is reachable", provider.name(), model),
            Err(e) => println!("✗ {} ({}): {}", provider.name(), model, e.user_message()),
        }
    }

    result.map_err(Into::into)
}
