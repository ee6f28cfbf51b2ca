//! One-shot `say` command

use std::error::Error;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cli::{error_message, send_interruptible};
use crate::core::client::ConversationClient;
use crate::core::message::{ChatMessage, Role, SendMessageOptions};
use crate::utils::logging::LoggingState;

/// Turns the growing partial reply into the slices not yet printed.
///
/// Leading whitespace of the reply is never printed, matching the trimmed
/// final text.
#[derive(Debug, Default)]
pub struct StreamPrinter {
    printed: Mutex<usize>,
}

impl StreamPrinter {
    pub fn next_delta(&self, partial: &str) -> Option<String> {
        let visible = partial.trim_start();
        let mut printed = self.printed.lock().ok()?;
        let delta = visible.get(*printed..).filter(|delta| !delta.is_empty())?;
        *printed = visible.len();
        Some(delta.to_string())
    }

    pub fn has_printed(&self) -> bool {
        self.printed.lock().map(|printed| *printed > 0).unwrap_or(false)
    }

    fn print(&self, partial: &ChatMessage) {
        if let Some(delta) = self.next_delta(&partial.text) {
            print!("{delta}");
            let _ = io::stdout().flush();
        }
    }
}

/// Options for one CLI turn, with a stdout printer attached when streaming.
pub(crate) fn turn_options(
    base: SendMessageOptions,
    stream: bool,
    timeout: Option<Duration>,
) -> (SendMessageOptions, Arc<StreamPrinter>) {
    let printer = Arc::new(StreamPrinter::default());
    let mut options = base.with_stream(stream);
    if let Some(timeout) = timeout {
        options = options.with_timeout(timeout);
    }
    if stream {
        let sink = Arc::clone(&printer);
        options = options.with_progress(move |partial| sink.print(partial));
    }
    (options, printer)
}

pub async fn run_say(
    client: &ConversationClient,
    prompt: Vec<String>,
    stream: bool,
    timeout: Option<Duration>,
    logging: &LoggingState,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: parley say <prompt>");
        std::process::exit(1);
    }

    logging.log_turn(Role::User, &prompt)?;

    let (options, printer) = turn_options(SendMessageOptions::new(), stream, timeout);
    match send_interruptible(client, &prompt, options).await {
        Ok(reply) => {
            if !printer.has_printed() {
                print!("{}", reply.text);
            }
            println!();
            logging.log_turn(Role::Assistant, &reply.text)?;
            Ok(())
        }
        Err(err) => {
            if printer.has_printed() {
                println!();
            }
            eprintln!("❌ Error: {}", error_message(&err));
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printer_emits_only_new_text() {
        let printer = StreamPrinter::default();
        assert_eq!(printer.next_delta("\n\n"), None);
        assert!(!printer.has_printed());
        assert_eq!(printer.next_delta("\n\nHi").as_deref(), Some("Hi"));
        assert_eq!(printer.next_delta("\n\nHi there").as_deref(), Some(" there"));
        assert_eq!(printer.next_delta("\n\nHi there"), None);
        assert!(printer.has_printed());
    }

    #[test]
    fn printer_handles_multibyte_fragments() {
        let printer = StreamPrinter::default();
        assert_eq!(printer.next_delta("ça").as_deref(), Some("ça"));
        assert_eq!(printer.next_delta("ça va ✓").as_deref(), Some(" va ✓"));
    }

    #[test]
    fn blocking_turns_get_no_progress_callback() {
        let (options, _) = turn_options(SendMessageOptions::new(), false, None);
        assert!(options.on_progress.is_none());
        assert!(!options.should_stream());

        let (options, _) =
            turn_options(SendMessageOptions::new(), true, Some(Duration::from_secs(5)));
        assert!(options.on_progress.is_some());
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
    }
}
