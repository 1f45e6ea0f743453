use clap::{Parser, Subcommand};
use std::io::Write;

use lib::config::UserContext;
use lib::session::ChatSession;
use lib::storage::ConversationStore;
use lib::workflow::WorkflowClient;

#[derive(Parser)]
#[command(name = "entrena")]
#[command(about = "Entrena support chat CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and default files (config, conversations).
    Init {
        /// Config file path (default: ENTRENA_CONFIG_PATH or ~/.entrena/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the dev relay (same-origin proxy in front of the workflow backend).
    Relay {
        /// Config file path (default: ENTRENA_CONFIG_PATH or ~/.entrena/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Relay port (default from config or 15280)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Chat with the support assistant (interactive).
    Chat {
        /// Config file path (default: ENTRENA_CONFIG_PATH or ~/.entrena/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Print the reply as it streams in instead of waiting for the full turn.
        #[arg(long)]
        stream: bool,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("entrena {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Relay { config, port }) => {
            if let Err(e) = run_relay(config, port).await {
                log::error!("relay failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat { config, stream }) => {
            if let Err(e) = run_chat(config, stream).await {
                log::error!("chat failed: {}", e);
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

async fn run_relay(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, _path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.relay.port = p;
    }
    log::info!("starting relay on {}:{}", config.relay.bind, config.relay.port);
    lib::relay::run_relay(config).await
}

async fn run_chat(config_path: Option<std::path::PathBuf>, stream: bool) -> anyhow::Result<()> {
    let (config, _path) = lib::config::load_config(config_path)?;

    let user = UserContext::from_profile(config.profile.clone());
    let store = ConversationStore::new(lib::config::resolve_conversations_dir(&config), user.scope());
    let client = WorkflowClient::from_config(&config);
    log::info!("chat endpoint: {}", client.endpoint());

    let mut session = ChatSession::new(client, store, user, &config.chat);
    if session.message_count() > 0 {
        println!("(continuing a stored conversation, {} messages; /clear to start over)", session.message_count());
    }
    if session.user().is_guest() {
        println!("(chatting as guest; conversations are kept for 7 days)");
    }

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }
        if input.eq_ignore_ascii_case("/clear") {
            session.clear();
            println!("(conversation cleared)");
            continue;
        }
        if input.eq_ignore_ascii_case("/retry") {
            if !session.can_retry() {
                println!("(nothing to retry)");
                continue;
            }
            run_turn(&mut session, None, stream).await?;
            continue;
        }

        run_turn(&mut session, Some(input), stream).await?;
    }

    Ok(())
}

/// One REPL turn: send (or retry when `input` is None) and print the result.
async fn run_turn(
    session: &mut ChatSession<WorkflowClient>,
    input: Option<&str>,
    stream: bool,
) -> anyhow::Result<()> {
    let reply = if stream && input.is_some() {
        print!("< ");
        std::io::stdout().flush()?;
        let reply = session
            .send_streaming(input.unwrap_or_default(), &mut |chunk| {
                print!("{}", chunk);
                let _ = std::io::stdout().flush();
            })
            .await
            .map(|m| m.content.clone());
        println!();
        reply
    } else {
        let reply = match input {
            Some(text) => session.send(text).await,
            None => session.retry_last().await,
        };
        let reply = reply.map(|m| m.content.clone());
        if let Some(ref content) = reply {
            println!("< {}", content.trim());
        }
        reply
    };

    if reply.is_none() {
        if let Some(err) = session.error() {
            eprintln!("chat error: {} (/retry to try again)", err);
        }
    }
    Ok(())
}
