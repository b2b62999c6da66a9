use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "teletrader")]
#[command(about = "Telegram trading bot for Deriv", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a template config (never overwrites an existing one).
    Init {
        /// Config file path (default: TELETRADER_CONFIG_PATH or ~/.teletrader/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Connect to Deriv and serve Telegram (long-poll, or webhook when telegram.webhookUrl is set).
    Start {
        /// Config file path (default: TELETRADER_CONFIG_PATH or ~/.teletrader/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Log at debug level
        #[arg(long)]
        debug: bool,
    },
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "warn,teletrader=debug"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let debug = matches!(cli.command, Some(Commands::Start { debug: true, .. }));
    init_logging(debug);

    match cli.command {
        Some(Commands::Version) => {
            println!("teletrader {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Start { config, .. }) => {
            if let Err(e) = run_start(config).await {
                log::error!("start failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(teletrader::config::default_config_path);
    let dir = teletrader::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    println!(
        "edit {} to set the bot token, allowed usernames and Deriv credentials",
        path.display()
    );
    Ok(())
}

async fn run_start(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = teletrader::config::load_config(config_path)?;
    log::info!("starting bot with config {}", path.display());
    teletrader::service::run_bot(config).await
}
