mod events;
mod state;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use base64::Engine;
use clap::Parser;
use log::info;
use rewise::{
    init_logging, load_config, resolve_location, AnalysisView, ClientConfig, FixedLocation,
    GeoLocation, LogFormat, NoLocation, Priority, TaskRequest, TerminalReason,
};

use state::AppState;

#[derive(Parser)]
#[command(name = "rewise")]
#[command(about = "Send an item to the Rewise analysis service and show the disposal options")]
#[command(version)]
struct Cli {
    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// WebSocket endpoint, overrides the config file
    #[arg(long)]
    endpoint: Option<String>,

    /// Text description of the item
    #[arg(short, long)]
    description: Option<String>,

    /// Image file, http(s) URL or data URI
    #[arg(short, long)]
    image: Option<String>,

    /// Latitude to report instead of the fallback location
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Longitude to report instead of the fallback location
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Do not send a location at all
    #[arg(long, conflicts_with_all = ["lat", "lon"])]
    no_location: bool,

    /// Disable per-frame diagnostics
    #[arg(long)]
    no_debug: bool,

    /// Do not install a log subscriber
    #[arg(short, long)]
    quiet: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Print the final state as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(TerminalReason::Completed) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<TerminalReason> {
    if !cli.quiet {
        let format = if cli.json_logs {
            LogFormat::Json
        } else {
            LogFormat::Text
        };
        init_logging(format)?;
    }

    let config = build_config(&cli)?;
    let request = build_request(&cli, &config).await?;
    if request.is_empty() {
        bail!("Provide a description, an image, or both");
    }

    info!("Starting Rewise CLI v{}", env!("CARGO_PKG_VERSION"));

    let state = AppState::new(config);
    info!("Using endpoint {}", state.config.endpoint);
    let bridge = events::start_progress_bridge(&state.broadcaster);

    state
        .session
        .begin(&request)
        .await
        .context("Failed to start the analysis")?;

    let reason = tokio::select! {
        reason = state.session.wait_for_terminal() => reason.unwrap_or(TerminalReason::Disconnected),
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, closing the connection");
            state.session.cancel().await;
            TerminalReason::Disconnected
        }
    };

    // Dropping the broadcaster closes the channel; the bridge drains what is queued first.
    state.broadcaster.detach();
    drop(state.broadcaster);
    if let Err(e) = bridge.await {
        log::debug!("Progress bridge ended abnormally: {}", e);
    }

    let view = AnalysisView::current(&state.store);
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&state.store.snapshot())?);
    } else {
        print_summary(&view);
    }

    match reason {
        TerminalReason::Completed => {}
        TerminalReason::UpstreamError => {
            let error = state.session.upstream_error().unwrap_or_default();
            eprintln!("Analysis failed: {}", error);
        }
        other => eprintln!("Analysis ended early: {:?}", other),
    }

    Ok(reason)
}

fn build_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ClientConfig::default(),
    };

    if let Some(endpoint) = &cli.endpoint {
        config = config.with_endpoint(endpoint.clone());
    }
    if cli.no_debug {
        config.debug_logging = false;
    }

    Ok(config)
}

async fn build_request(cli: &Cli, config: &ClientConfig) -> Result<TaskRequest> {
    let mut request = TaskRequest::default();

    if let Some(description) = cli.description.as_deref().map(str::trim) {
        if !description.is_empty() {
            request.text_description = Some(description.to_string());
        }
    }

    if let Some(image) = &cli.image {
        request = request.with_image(image_url(image)?);
    }

    if !cli.no_location {
        let location = match (cli.lat, cli.lon) {
            (Some(lat), Some(lon)) => {
                resolve_location(&FixedLocation(GeoLocation { lat, lon }), &config.geolocation)
                    .await
            }
            _ => resolve_location(&NoLocation, &config.geolocation).await,
        };
        request = request.with_location(location);
    }

    Ok(request)
}

/// Passes URLs through and turns a local file into a data URI.
fn image_url(image: &str) -> Result<String> {
    if image.starts_with("data:") || image.starts_with("http://") || image.starts_with("https://")
    {
        return Ok(image.to_string());
    }

    let path = Path::new(image);
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read image {}", path.display()))?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);

    Ok(format!("data:{};base64,{}", mime_type(path), encoded))
}

/// Guesses the media type from the extension, assuming JPEG when unknown.
fn mime_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| "image/jpeg".to_string())
}

fn priority_label(priority: Priority) -> &'static str {
    match priority {
        Priority::Highest => "最推荐",
        Priority::High => "推荐",
        Priority::Medium => "可选",
    }
}

fn print_summary(view: &AnalysisView) {
    let Some(summary) = view.item_summary() else {
        println!("No analysis result received.");
        return;
    };

    println!();
    println!("物品: {} ({})", summary.category, summary.description);
    println!("品牌: {}  成色: {}  年限: {}", summary.brand, summary.condition, summary.age);
    println!();

    for recommendation in view.recommendations() {
        println!(
            "  {} {} [{:.0}分, {}] {}",
            recommendation.display.icon,
            recommendation.title,
            recommendation.score,
            priority_label(recommendation.priority),
            recommendation.subtitle,
        );
    }

    if let Some(primary) = view.primary_recommendation() {
        println!();
        println!("建议: {}", primary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_urls_pass_through() {
        assert_eq!(image_url("https://x/a.jpg").unwrap(), "https://x/a.jpg");
        assert_eq!(
            image_url("data:image/png;base64,AAAA").unwrap(),
            "data:image/png;base64,AAAA"
        );
    }

    #[test]
    fn test_local_file_becomes_data_uri() {
        let mut file = tempfile::Builder::new().suffix(".PNG").tempfile().unwrap();
        file.write_all(b"abc").unwrap();

        let url = image_url(file.path().to_str().unwrap()).unwrap();
        assert_eq!(url, "data:image/png;base64,YWJj");
    }

    #[test]
    fn test_mime_type_from_extension() {
        assert_eq!(mime_type(Path::new("chair.bmp")), "image/bmp");
        assert_eq!(mime_type(Path::new("chair.tiff")), "image/tiff");
        assert_eq!(mime_type(Path::new("chair.JPG")), "image/jpeg");
        assert_eq!(mime_type(Path::new("chair")), "image/jpeg");
    }

    #[test]
    fn test_bmp_file_keeps_its_media_type() {
        let mut file = tempfile::Builder::new().suffix(".bmp").tempfile().unwrap();
        file.write_all(b"BM").unwrap();

        let url = image_url(file.path().to_str().unwrap()).unwrap();
        assert!(url.starts_with("data:image/bmp;base64,"), "{}", url);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(image_url("/definitely/not/here.jpg").is_err());
    }

    #[tokio::test]
    async fn test_request_uses_fallback_location() {
        let cli = Cli::parse_from(["rewise", "--description", "  old desk  "]);
        let config = build_config(&cli).unwrap();
        let request = build_request(&cli, &config).await.unwrap();

        assert_eq!(request.text_description.as_deref(), Some("old desk"));
        assert_eq!(request.user_location, Some(config.geolocation.fallback));
    }

    #[tokio::test]
    async fn test_explicit_location_and_endpoint() {
        let cli = Cli::parse_from([
            "rewise",
            "--endpoint",
            "ws://10.0.0.2:9000/ws",
            "--lat",
            "-33.86",
            "--lon",
            "151.2",
            "--no-debug",
            "-d",
            "chair",
        ]);
        let config = build_config(&cli).unwrap();
        let request = build_request(&cli, &config).await.unwrap();

        assert_eq!(config.endpoint, "ws://10.0.0.2:9000/ws");
        assert!(!config.debug_logging);
        assert_eq!(
            request.user_location,
            Some(GeoLocation {
                lat: -33.86,
                lon: 151.2
            })
        );
    }
}
