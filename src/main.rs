use anyhow::Result;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use std::io;
use std::path::PathBuf;

use moodcam::app::App;
use moodcam::camera::NokhwaBackend;
use moodcam::config::Config;
use moodcam::detector::{FaceDetector, OnnxFaceDetector};
use moodcam::logging;
use moodcam::models::HttpArtifactSource;
use moodcam::overlay::{load_label_font, OverlayRenderer};
use moodcam::ui::video::VideoPreview;

#[derive(Default)]
struct Args {
    config_path: Option<PathBuf>,
    camera: Option<u32>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("moodcam {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--camera" => match args.get(i + 1).map(|v| v.parse::<u32>()) {
                Some(Ok(index)) => {
                    parsed.camera = Some(index);
                    i += 1;
                }
                _ => {
                    eprintln!("Error: --camera requires a device index");
                    std::process::exit(1);
                }
            },
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    parsed
}

fn print_help() {
    println!(
        r#"moodcam - live face and expression overlay for your webcam

USAGE:
    moodcam [OPTIONS]

OPTIONS:
    --config, -c PATH   Path to config file
    --camera INDEX      Camera device index (overrides config)
    --version, -V       Show version
    --help, -h          Show this help message

KEYS:
    Space / Enter       Start or stop the camera
    s                   Save snapshot.png
    q / Esc             Quit

ENVIRONMENT:
    MOODCAM_CONFIG      Path to config file (overrides default location)
    MOODCAM_LOG         Log filter (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/moodcam/config.toml"#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    // Initialize logging (uses journald on Linux, file fallback otherwise)
    let _ = logging::init(Some(Config::config_dir().join("logs")));

    // Load configuration
    let mut config = match args.config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };
    if let Some(index) = args.camera {
        config.camera.index = index;
    }

    let renderer = OverlayRenderer::new(&config.overlay, load_label_font(&config.overlay));
    let camera = Box::new(NokhwaBackend::new(config.camera.index));
    let source = HttpArtifactSource::new(&config.models);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Create and run app
    let preview = VideoPreview::new(config.preview.protocol);
    let mut app = App::new(config, camera, renderer);
    app.preview = preview;
    app.load_models(source, |models| {
        OnnxFaceDetector::from_models(models).map(|d| Box::new(d) as Box<dyn FaceDetector>)
    });
    let result = app.run(&mut terminal).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}
