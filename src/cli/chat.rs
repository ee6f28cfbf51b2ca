//! Line-oriented chat loop on stdin/stdout.

use std::error::Error;
use std::io::{self, Write};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::say::turn_options;
use crate::cli::{error_message, send_interruptible};
use crate::core::client::ConversationClient;
use crate::core::error::ChatError;
use crate::core::message::{ChatMessage, Role, SendMessageOptions};
use crate::utils::logging::LoggingState;

/// Where the next turn attaches: the conversation and the last reply.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChatSession {
    pub conversation_id: Option<String>,
    pub parent_message_id: Option<String>,
}

impl ChatSession {
    pub fn options(&self) -> SendMessageOptions {
        let mut options = SendMessageOptions::new();
        options.conversation_id.clone_from(&self.conversation_id);
        options.parent_message_id.clone_from(&self.parent_message_id);
        options
    }

    /// Chain the next turn onto `reply`.
    pub fn advance(&mut self, reply: &ChatMessage) {
        self.conversation_id.clone_from(&reply.conversation_id);
        self.parent_message_id = Some(reply.id.clone());
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ChatInput<'a> {
    Message(&'a str),
    Reset,
    Log(Option<&'a str>),
    Status,
    Help,
    Quit,
    Empty,
    Unknown(&'a str),
}

pub fn parse_input(line: &str) -> ChatInput<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ChatInput::Empty;
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return ChatInput::Message(trimmed);
    };

    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, Some(rest.trim()).filter(|rest| !rest.is_empty())),
        None => (command, None),
    };
    match name {
        "reset" => ChatInput::Reset,
        "log" => ChatInput::Log(rest),
        "status" => ChatInput::Status,
        "help" => ChatInput::Help,
        "quit" | "exit" => ChatInput::Quit,
        _ => ChatInput::Unknown(name),
    }
}

const HELP: &str = "Commands:\n  /reset            Start a new conversation\n  /log <filename>   Enable logging to the given file\n  /log              Toggle logging pause/resume\n  /status           Show model, conversation and logging state\n  /quit             Leave (Ctrl+D works too)\nCtrl+C cancels a reply in progress.";

pub async fn run_chat(
    client: &ConversationClient,
    timeout: Option<Duration>,
    mut logging: LoggingState,
) -> Result<(), Box<dyn Error>> {
    let mut session = ChatSession::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let user_label = client.settings().user_label.clone();
    let assistant_label = client.settings().assistant_label.clone();

    eprintln!(
        "parley · {} · type /help for commands",
        client.params().model
    );

    loop {
        print!("{user_label}: ");
        io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        match parse_input(&line) {
            ChatInput::Empty => continue,
            ChatInput::Quit => break,
            ChatInput::Help => println!("{HELP}"),
            ChatInput::Unknown(name) => eprintln!("⚠️  Unknown command: /{name}"),
            ChatInput::Reset => {
                session.reset();
                logging.log_note("New conversation")?;
                println!("Started a new conversation.");
            }
            ChatInput::Log(Some(path)) => match logging.set_log_file(path.to_string()) {
                Ok(message) => println!("{message}"),
                Err(err) => eprintln!("❌ Error: {err}"),
            },
            ChatInput::Log(None) => match logging.toggle_logging() {
                Ok(message) => println!("{message}"),
                Err(err) => eprintln!("⚠️  {err}"),
            },
            ChatInput::Status => {
                println!("  model: {}", client.params().model);
                println!(
                    "  conversation: {}",
                    session.conversation_id.as_deref().unwrap_or("(new)")
                );
                println!(
                    "  parent message: {}",
                    session.parent_message_id.as_deref().unwrap_or("(none)")
                );
                println!("  logging: {}", logging.get_status_string());
            }
            ChatInput::Message(text) => {
                logging.log_turn(Role::User, text)?;
                print!("{assistant_label}: ");
                io::stdout().flush()?;

                let (options, printer) = turn_options(session.options(), true, timeout);
                match send_interruptible(client, text, options).await {
                    Ok(reply) => {
                        if !printer.has_printed() {
                            print!("{}", reply.text);
                        }
                        println!("\n");
                        logging.log_turn(Role::Assistant, &reply.text)?;
                        session.advance(&reply);
                    }
                    Err(ChatError::Cancelled) => println!("\n(cancelled)\n"),
                    Err(err) => {
                        println!();
                        eprintln!("❌ Error: {}\n", error_message(&err));
                    }
                }
            }
        }
    }

    Ok(())
}
