use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use log::info;
use reply_bubble::capture::{CommandCapturer, ConsentToken};
use reply_bubble::config::{BubbleServiceConfig, ConfigStore, Tone};
use reply_bubble::geometry::DisplayMetrics;
use reply_bubble::headless::HeadlessWindowHost;
use reply_bubble::paths::default_config_path;
use reply_bubble::recognition::TesseractRecognizer;
use reply_bubble::replies::HttpReplyClient;
use reply_bubble::reply_card::SystemClipboard;
use reply_bubble::service::{
    BubbleController, ConsentResult, HostEvent, ServiceCommand, ServiceDeps, ServiceHandle,
    ServiceOptions, tap_bubble,
};
use reply_bubble::skins::{BubbleSkin, ScanningSkin};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Parser)]
#[command(name = "reply-bubble")]
#[command(about = "Floating capture bubble that turns on-screen text into reply suggestions")]
struct Cli {
    /// Config file; defaults to the platform data directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Update the persisted endpoint, credential or tone.
    Configure(ConfigureArgs),
    ShowConfig,
    /// Run the bubble service with a terminal front-end.
    Run(RunArgs),
}

#[derive(Debug, Args, Clone)]
struct ConfigureArgs {
    #[arg(long)]
    endpoint: Option<String>,

    #[arg(long)]
    credential: Option<String>,

    #[arg(long, value_enum)]
    tone: Option<Tone>,
}

#[derive(Debug, Args, Clone)]
struct RunArgs {
    #[arg(long, default_value = "1200ms", value_parser = parse_duration)]
    settle: Duration,

    #[arg(long, default_value = "600ms", value_parser = parse_duration)]
    auto_dismiss: Duration,

    #[arg(long, value_enum, default_value_t = BubbleSkin::Plasma)]
    bubble_skin: BubbleSkin,

    #[arg(long, value_enum, default_value_t = ScanningSkin::Sonar)]
    scanning_skin: ScanningSkin,

    #[arg(long, action = ArgAction::SetTrue)]
    snap_to_edge: bool,

    /// Screenshot command and arguments; `{output}` is replaced by the PNG path.
    #[arg(long, num_args = 1.., allow_hyphen_values = true)]
    capture_command: Vec<String>,

    #[arg(long, default_value = "tesseract")]
    tesseract: String,

    #[arg(long, default_value = "eng")]
    ocr_language: String,

    #[arg(long, default_value_t = 1080)]
    width: u32,

    #[arg(long, default_value_t = 2400)]
    height: u32,

    #[arg(long, default_value_t = 2.625)]
    density: f32,
}

fn parse_duration(value: &str) -> std::result::Result<Duration, String> {
    humantime::parse_duration(value).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let store = ConfigStore::new(cli.config.unwrap_or_else(default_config_path));

    match cli.command {
        Commands::Configure(args) => configure(&store, args),
        Commands::ShowConfig => show_config(&store),
        Commands::Run(args) => run(store, args).await,
    }
}

fn configure(store: &ConfigStore, args: ConfigureArgs) -> Result<()> {
    let mut config = store.load()?;
    if let Some(endpoint) = args.endpoint {
        config.endpoint = Some(endpoint);
    }
    if let Some(credential) = args.credential {
        config.credential = Some(credential);
    }
    if let Some(tone) = args.tone {
        config.tone = tone;
    }
    store.save(&config)?;
    println!("saved {}", store.path().display());
    print_config(&config);
    Ok(())
}

fn show_config(store: &ConfigStore) -> Result<()> {
    let config = store.load()?;
    println!("config file: {}", store.path().display());
    print_config(&config);
    Ok(())
}

fn print_config(config: &BubbleServiceConfig) {
    println!(
        "endpoint:   {}",
        config.endpoint.as_deref().unwrap_or("(not set)")
    );
    println!(
        "credential: {}",
        if config.credential.is_some() {
            "(set)"
        } else {
            "(not set)"
        }
    );
    println!("tone:       {}", config.tone);
    if let Some(url) = config.replies_url() {
        println!("requests:   POST {url}");
    }
    if !config.is_configured() {
        println!("reply fetching is disabled until endpoint and credential are set");
    }
}

async fn run(store: ConfigStore, args: RunArgs) -> Result<()> {
    let metrics = DisplayMetrics {
        width_px: args.width,
        height_px: args.height,
        density: args.density,
        density_dpi: (args.density * 160.0).round() as u32,
    };
    let capturer = match args.capture_command.split_first() {
        Some((program, rest)) => CommandCapturer::new(program.clone(), rest.to_vec()),
        None => CommandCapturer::platform_default(),
    };

    let deps = ServiceDeps {
        host: Arc::new(HeadlessWindowHost::new(metrics)),
        capturer: Arc::new(capturer),
        recognizer: Arc::new(TesseractRecognizer::new(args.tesseract, args.ocr_language)),
        fetcher: Arc::new(HttpReplyClient::new()?),
        clipboard: Arc::new(SystemClipboard),
        store,
    };
    let options = ServiceOptions {
        settle: args.settle,
        auto_dismiss: args.auto_dismiss,
        bubble_skin: args.bubble_skin,
        scanning_skin: args.scanning_skin,
        snap_to_edge: args.snap_to_edge,
        ..ServiceOptions::default()
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut controller = BubbleController::new(deps, options).with_events(event_tx);
    controller.start();
    let commands = controller
        .handle()
        .map(ServiceHandle::commands)
        .context("bubble service did not start")?;

    // A plain thread: a blocked stdin read must not hold up runtime shutdown.
    std::thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || read_commands(commands))
        .context("failed to spawn input thread")?;

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    break;
                };
                let stopped = event == HostEvent::Stopped;
                print_event(&event);
                if stopped {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                controller.stop().await;
            }
        }
    }

    controller.stop().await;
    Ok(())
}

const USAGE: &str = "tap | allow | deny | copy N | close | replies a|b|c | stop";

#[derive(Debug)]
enum Input {
    Tap,
    Command(ServiceCommand),
}

fn read_commands(commands: mpsc::UnboundedSender<ServiceCommand>) {
    eprintln!("interactive controls: {USAGE}");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            break;
        };
        let delivered = match parse_input(&line) {
            Ok(Some(Input::Tap)) => tap_bubble(&commands),
            Ok(Some(Input::Command(command))) => commands.send(command).is_ok(),
            Ok(None) => true,
            Err(message) => {
                eprintln!("{message}. use: {USAGE}");
                true
            }
        };
        if !delivered {
            break;
        }
    }
}

fn parse_input(line: &str) -> std::result::Result<Option<Input>, String> {
    let line = line.trim();
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map(|(word, rest)| (word, rest.trim()))
        .unwrap_or((line, ""));

    let input = match word.to_ascii_lowercase().as_str() {
        "" => return Ok(None),
        "tap" => Input::Tap,
        "allow" => Input::Command(ServiceCommand::Consent(ConsentResult::Granted(
            ConsentToken::new("terminal"),
        ))),
        "deny" => Input::Command(ServiceCommand::Consent(ConsentResult::Denied)),
        "copy" => {
            let row = rest
                .parse::<usize>()
                .ok()
                .filter(|row| *row >= 1)
                .ok_or_else(|| format!("copy expects a row number, got `{rest}`"))?;
            Input::Command(ServiceCommand::CopyReply(row - 1))
        }
        "close" => Input::Command(ServiceCommand::CloseCard),
        "replies" => {
            let replies = rest
                .split('|')
                .map(str::trim)
                .filter(|reply| !reply.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>();
            if replies.is_empty() {
                return Err("replies expects text separated by |".to_string());
            }
            Input::Command(ServiceCommand::PushReplies(replies))
        }
        "stop" | "quit" | "exit" => Input::Command(ServiceCommand::Stop),
        other => return Err(format!("unknown command `{other}`")),
    };
    Ok(Some(input))
}

fn print_event(event: &HostEvent) {
    match event {
        HostEvent::Started => println!("bubble shown; type `tap` to scan the screen"),
        HostEvent::ConsentRequested => {
            println!("screen capture requested: type `allow` or `deny`")
        }
        HostEvent::TextCaptured { text, captured_at } => {
            println!(
                "captured at {}:\n{text}",
                captured_at.format("%Y-%m-%d %H:%M:%S UTC")
            )
        }
        HostEvent::RepliesShown { replies } => {
            println!("reply suggestions:");
            for reply in replies {
                println!("  {}. {}", reply.id + 1, reply.text);
            }
            println!("type `copy N` to copy one or `close` to dismiss");
        }
        HostEvent::CaptureError { message } => eprintln!("scan failed: {message}"),
        HostEvent::Stopped => println!("bubble service stopped"),
    }
}
