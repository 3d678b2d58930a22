// clipserver (video upload, subtitle preparation, and clip search service)

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod clipper;
mod config;
mod db;
mod error;
mod jobs;
mod prepare;
mod probe;
mod search;
mod sidecar;
mod srt;
mod subtitles;
mod tools;
mod web;

#[derive(Parser, Debug)]
#[command(version, about = "Video clip service: upload videos, prepare searchable transcripts, cut clips per keyword match", long_about = None, arg_required_else_help = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run the HTTP API server")]
    Serve {
        #[arg(long, help = "Address to bind")]
        address: Option<String>,
        #[arg(long, help = "Port to bind")]
        port: Option<u16>,
    },
    #[command(about = "Prepare the subtitle transcript for a stored video")]
    #[command(arg_required_else_help = true)]
    Prepare {
        #[arg(help = "Video id")]
        video_id: String,
        #[arg(long, help = "Regenerate even if a transcript already exists")]
        force: bool,
        #[arg(long, help = "ASR model tag (tiny, base, small, medium, large)")]
        model: Option<String>,
        #[arg(long, help = "Preferred subtitle language code")]
        language: Option<String>,
    },
    #[command(about = "Prepare subtitle transcripts for every stored video")]
    PrepareAll {
        #[arg(long, help = "Regenerate transcripts that already exist")]
        force: bool,
        #[arg(long, help = "ASR model tag (tiny, base, small, medium, large)")]
        model: Option<String>,
    },
    #[command(about = "Search a transcript and cut one clip per keyword match")]
    #[command(arg_required_else_help = true)]
    SearchClip {
        #[arg(help = "Path to the video file")]
        path: PathBuf,
        #[arg(help = "Keyword to search for")]
        keyword: String,
        #[arg(long, help = "Explicit SRT transcript path")]
        srt: Option<PathBuf>,
        #[arg(long, help = "Directory for the produced clips")]
        output_dir: Option<PathBuf>,
        #[arg(long, default_value_t = 1.0, help = "Seconds of padding around each match")]
        padding: f64,
        #[arg(long, help = "Match case sensitively")]
        case_sensitive: bool,
    },
    #[command(about = "Display or update configuration settings")]
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    #[command(about = "Print the current configuration")]
    Show,
    #[command(about = "Set a configuration field")]
    Set { field: String, value: String },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Commands::Serve { address, port } => {
            let mut cfg = config::load_config_or_default();
            if let Some(address) = address {
                cfg.address = address;
            }
            if let Some(port) = port {
                cfg.port = port;
            }

            report_tool_availability(&cfg).await;
            if let Err(e) = web::launch_server(&cfg).await {
                tracing::error!(error = %e, "server exited with error");
                std::process::exit(1);
            }
        }
        Commands::Prepare {
            video_id,
            force,
            model,
            language,
        } => {
            let cfg = config::load_config_or_default();
            let video = match db::get_video(&cfg.db_path(), &video_id) {
                Ok(Some(video)) => video,
                Ok(None) => {
                    eprintln!("error: video does not exist: {}", video_id);
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("error: {}", e);
                    std::process::exit(1);
                }
            };

            let locks = prepare::PrepareLocks::new();
            let req = prepare::PrepareRequest {
                video_id,
                video_path: PathBuf::from(&video.file_path),
                force_regenerate: force,
                asr_model: model,
                preferred_language: language,
            };
            match prepare::prepare(&cfg, &locks, &req).await {
                Ok(outcome) => print_json(&outcome),
                Err(e) => {
                    eprintln!("error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::PrepareAll { force, model } => {
            let cfg = config::load_config_or_default();
            let locks = prepare::PrepareLocks::new();
            match prepare::prepare_all(&cfg, &locks, force, model).await {
                Ok(report) => print_json(&report),
                Err(e) => {
                    eprintln!("error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::SearchClip {
            path,
            keyword,
            srt,
            output_dir,
            padding,
            case_sensitive,
        } => {
            let cfg = config::load_config_or_default();
            let opts = search::SearchClipOptions {
                srt_path: srt,
                output_dir,
                padding_seconds: padding,
                case_sensitive,
            };
            match search::search_and_clip(&cfg, &path, &keyword, &opts).await {
                Ok(report) => print_json(&report),
                Err(e) => {
                    eprintln!("error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Config { config_command } => match config_command {
            ConfigCommands::Show => {
                let cfg = config::load_config_or_default();
                print_json(&cfg);
            }
            ConfigCommands::Set { field, value } => {
                let mut cfg = config::load_config_or_default();
                if let Err(e) = config::set_config_field(&mut cfg, &field, &value) {
                    eprintln!("error: {}", e);
                    std::process::exit(1);
                }
                if let Err(e) = config::store_config(&cfg) {
                    eprintln!("error saving config: {}", e);
                    std::process::exit(1);
                }
                println!("set {} = {}", field, value);
            }
        },
    }
}

fn print_json(value: &impl serde::Serialize) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

async fn report_tool_availability(cfg: &config::ClipConfig) {
    for (tool, probe_arg) in [
        (cfg.ffmpeg_path.as_str(), "-version"),
        (cfg.ffprobe_path.as_str(), "-version"),
        (cfg.whisper_path.as_str(), "--help"),
    ] {
        if tools::is_installed(tool, probe_arg).await {
            tracing::info!(tool, "external tool available");
        } else {
            tracing::warn!(tool, "external tool not found; dependent operations will fail");
        }
    }
}
