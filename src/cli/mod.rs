//! Command-line interface parsing and handling

pub mod chat;
pub mod say;
pub mod settings;

use std::error::Error;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::core::client::ConversationClient;
use crate::core::config::data::Config;
use crate::core::constants::DEFAULT_REPLY_TIMEOUT_SECS;
use crate::core::error::ChatError;
use crate::core::message::{ChatMessage, SendMessageOptions};
use crate::utils::logging::LoggingState;

fn long_version() -> &'static str {
    static LONG_VERSION: OnceLock<String> = OnceLock::new();
    LONG_VERSION.get_or_init(|| {
        format!(
            "{} ({} {})",
            env!("CARGO_PKG_VERSION"),
            option_env!("VERGEN_GIT_DESCRIBE").unwrap_or("unknown"),
            option_env!("VERGEN_BUILD_DATE").unwrap_or("unknown"),
        )
    })
}

#[derive(Parser, Debug)]
#[command(name = "parley", version, long_version = long_version())]
#[command(about = "Chat with a completions model from the terminal")]
#[command(
    long_about = "Parley keeps a conversation with a text completions model. Each turn is \
sent along with as much of the earlier conversation as fits the model's context window.\n\n\
Environment Variables:\n\
  OPENAI_API_KEY    Your API key (required)\n\
  RUST_LOG          Log filter for diagnostics on stderr (default: warn)\n\n\
Chat commands:\n\
  /reset            Start a new conversation\n\
  /log <filename>   Enable logging to specified file\n\
  /log              Toggle logging pause/resume\n\
  /status           Show the current conversation\n\
  /quit             Leave"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model to use instead of the configured one
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Enable logging to specified file
    #[arg(short = 'l', long, global = true)]
    pub log: Option<String>,

    /// Give up on a reply after this many seconds (0 waits forever)
    #[arg(
        short = 't',
        long,
        global = true,
        value_name = "SECS",
        default_value_t = DEFAULT_REPLY_TIMEOUT_SECS
    )]
    pub timeout: u64,

    /// Log request bodies and responses to stderr
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the chat loop (default)
    Chat,
    /// Send a single prompt and print the reply
    Say {
        /// Prompt text; multiple words are joined with spaces
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
        /// Wait for the whole reply instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },
    /// Set configuration values, or show them when no value is given
    Set {
        /// Configuration key to set
        key: Option<String>,
        /// Value to set for the key
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

impl Args {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("parley=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Build the client from the config file, the environment and the flags,
/// in increasing order of precedence.
pub fn build_client(
    args: &Args,
    config: &Config,
    api_key: String,
) -> Result<ConversationClient, ChatError> {
    let mut builder = ConversationClient::builder(api_key).with_config(config);
    if let Some(model) = &args.model {
        builder = builder.model(model.as_str());
    }
    if args.debug {
        builder = builder.debug(true);
    }
    builder.build()
}

/// A failed turn as shown to the user, with a hint for statuses that have
/// an obvious fix.
pub(crate) fn error_message(err: &ChatError) -> String {
    match err.status_code() {
        Some(401) => format!("{err}\nCheck the key in OPENAI_API_KEY."),
        Some(429) => format!("{err}\nRate limited; wait a moment and try again."),
        _ => err.to_string(),
    }
}

/// Send one turn; Ctrl+C while waiting cancels it.
pub(crate) async fn send_interruptible(
    client: &ConversationClient,
    text: &str,
    options: SendMessageOptions,
) -> Result<ChatMessage, ChatError> {
    let cancel = CancellationToken::new();
    let send = client.send_message(text, options.with_cancel_token(cancel.clone()));
    tokio::pin!(send);

    tokio::select! {
        result = &mut send => result,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            send.await
        }
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.debug);

    tokio::runtime::Runtime::new()?.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let config_path = Config::config_path()?;

    match args.command.clone().unwrap_or(Commands::Chat) {
        Commands::Set { key, value } => {
            if let Err(err) = settings::run_set(&config_path, key.as_deref(), &value) {
                eprintln!("❌ {err}");
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Unset { key } => {
            if let Err(err) = settings::run_unset(&config_path, &key) {
                eprintln!("❌ {err}");
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Say { prompt, no_stream } => {
            let (client, logging) = prepare_session(&args, &config_path)?;
            say::run_say(&client, prompt, !no_stream, args.timeout(), &logging).await
        }
        Commands::Chat => {
            let (client, logging) = prepare_session(&args, &config_path)?;
            chat::run_chat(&client, args.timeout(), logging).await
        }
    }
}

fn prepare_session(
    args: &Args,
    config_path: &Path,
) -> Result<(ConversationClient, LoggingState), Box<dyn Error>> {
    let config = Config::load_from_path(config_path)?;
    let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();

    let client = match build_client(args, &config, api_key) {
        Ok(client) => client,
        Err(err) => {
            eprintln!("❌ {err}");
            std::process::exit(1);
        }
    };
    let logging = LoggingState::new(args.log.clone(), client.settings().user_label.as_str())?;
    Ok((client, logging))
}
