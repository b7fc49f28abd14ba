use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ragbridge")]
#[command(about = "LINE webhook bridge to a retrieval-augmented LLM", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: RAGBRIDGE_CONFIG_PATH or ~/.ragbridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the webhook gateway. Secrets come from the config file or LINE_CHANNEL_SECRET,
    /// LINE_CHANNEL_ACCESS_TOKEN, OPENROUTER_API_KEY and RETRIEVER_ENDPOINT.
    Gateway {
        /// Config file path (default: RAGBRIDGE_CONFIG_PATH or ~/.ragbridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 3000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Answer one question through retrieval and completion and print it; nothing is sent to LINE.
    Ask {
        /// Config file path (default: RAGBRIDGE_CONFIG_PATH or ~/.ragbridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// The question to answer.
        question: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("ragbridge {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Ask { config, question }) => {
            if let Err(e) = run_ask(config, question).await {
                log::error!("ask failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting gateway on {}:{} (config {})",
        config.gateway.bind,
        config.gateway.port,
        path.display()
    );
    lib::gateway::run_gateway(config).await
}

async fn run_ask(config_path: Option<std::path::PathBuf>, question: String) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let state = lib::gateway::GatewayState::from_config(config);
    let answer = state.pipeline().answer(question.trim()).await;
    println!("{}", answer);
    Ok(())
}
