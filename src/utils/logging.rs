//! Plain-text transcript of a chat session.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::core::message::Role;

pub struct LoggingState {
    file_path: Option<String>,
    is_active: bool,
    user_label: String,
}

impl LoggingState {
    /// Start logging to `log_file` if one is given. The file is opened once
    /// up front so a bad path fails early.
    pub fn new(
        log_file: Option<String>,
        user_label: impl Into<String>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut logging = LoggingState {
            file_path: None,
            is_active: false,
            user_label: user_label.into(),
        };
        if let Some(path) = log_file {
            logging.set_log_file(path)?;
        }
        Ok(logging)
    }

    pub fn set_log_file(&mut self, path: String) -> Result<String, Box<dyn std::error::Error>> {
        test_file_access(&path)?;

        self.file_path = Some(path.clone());
        self.is_active = true;

        Ok(format!("Logging enabled to: {path}"))
    }

    pub fn toggle_logging(&mut self) -> Result<String, Box<dyn std::error::Error>> {
        match &self.file_path {
            Some(path) => {
                if self.is_active {
                    self.log_line("## Logging paused")?;
                    self.is_active = false;
                    Ok(format!("Logging paused (file: {path})"))
                } else {
                    self.is_active = true;
                    Ok(format!("Logging resumed to: {path}"))
                }
            }
            None => Err("No log file specified. Use /log <filename> to enable logging first.".into()),
        }
    }

    /// Append one turn: user turns get a `<label>: ` prefix, replies are
    /// written as-is.
    pub fn log_turn(&self, role: Role, text: &str) -> Result<(), Box<dyn std::error::Error>> {
        match role {
            Role::User => self.log_line(&format!("{}: {}", self.user_label, text)),
            Role::Assistant if text.is_empty() => Ok(()),
            Role::Assistant => self.log_line(text),
        }
    }

    /// Append a `## ` note, e.g. when a conversation is reset.
    pub fn log_note(&self, note: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.log_line(&format!("## {note}"))
    }

    fn log_line(&self, content: &str) -> Result<(), Box<dyn std::error::Error>> {
        let Some(file_path) = self.file_path.as_ref().filter(|_| self.is_active) else {
            return Ok(());
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        let mut writer = BufWriter::new(file);

        for line in content.lines() {
            writeln!(writer, "{line}")?;
        }
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn get_status_string(&self) -> String {
        let file_name = |path: &str| {
            Path::new(path)
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .into_owned()
        };
        match (&self.file_path, self.is_active) {
            (None, _) => "disabled".to_string(),
            (Some(path), true) => format!("active ({})", file_name(path)),
            (Some(path), false) => format!("paused ({})", file_name(path)),
        }
    }
}

fn test_file_access(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_labelled_turns_with_blank_separators() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("chat.log");
        let logging =
            LoggingState::new(Some(path.to_string_lossy().into_owned()), "Me").expect("logging");

        logging.log_turn(Role::User, "hello\nthere").unwrap();
        logging.log_turn(Role::Assistant, "hi!").unwrap();
        logging.log_turn(Role::Assistant, "").unwrap();
        logging.log_note("New conversation").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "Me: hello\nthere\n\nhi!\n\n## New conversation\n\n");
        assert_eq!(logging.get_status_string(), "active (chat.log)");
    }

    #[test]
    fn pausing_stops_writes() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("chat.log");
        let mut logging =
            LoggingState::new(Some(path.to_string_lossy().into_owned()), "User").expect("logging");

        logging.toggle_logging().unwrap();
        assert!(!logging.is_active());
        logging.log_turn(Role::Assistant, "not written").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "## Logging paused\n\n");
        assert_eq!(logging.get_status_string(), "paused (chat.log)");

        logging.toggle_logging().unwrap();
        assert!(logging.is_active());
    }

    #[test]
    fn disabled_logging_is_a_no_op() {
        let mut logging = LoggingState::new(None, "User").expect("logging");
        assert_eq!(logging.get_status_string(), "disabled");
        logging.log_turn(Role::User, "ignored").unwrap();
        assert!(logging.toggle_logging().is_err());
    }

    #[test]
    fn unwritable_path_fails_up_front() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("missing").join("chat.log");
        assert!(LoggingState::new(Some(path.to_string_lossy().into_owned()), "User").is_err());
    }
}
