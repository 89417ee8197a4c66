//! Interactive REPL for hall-chat
//!
//! Readline loop over a `Session`: plain lines are sent to the assistant,
//! slash commands manage conversations. Streaming replies are printed as
//! they render; Ctrl+C while streaming closes the stream.

pub mod colors;
mod commands;
mod helper;

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::debug;

use hall_chat::chat::{ChatController, StreamProgress, SubmitOutcome};
use hall_chat::config;
use hall_chat::Session;

pub use commands::print_conversations;
use helper::ChatHelper;

/// What the loop should do after a line
pub enum Flow {
    Continue,
    Quit,
}

pub struct Repl {
    editor: Editor<ChatHelper, DefaultHistory>,
    session: Session,
    history_path: PathBuf,
}

impl Repl {
    pub fn new(session: Session) -> Result<Self> {
        let mut editor = Editor::new()?;
        editor.set_helper(Some(ChatHelper::new()));

        Ok(Self {
            editor,
            session,
            history_path: config::config_dir().join("history"),
        })
    }

    fn load_history(&mut self) {
        if self.history_path.exists() {
            let _ = self.editor.load_history(&self.history_path);
        }
    }

    fn save_history(&mut self) {
        if let Some(parent) = self.history_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = self.editor.save_history(&self.history_path) {
            debug!(error = %e, "Failed to save history");
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        self.load_history();

        match self.session.controller_mut().connect().await {
            Ok(()) => println!("{}", colors::status(&self.session.controller().status_line())),
            Err(e) => println!("{}", colors::warning(&e.to_user_string())),
        }
        println!("Type your question (Ctrl+D to exit, /help for commands)");
        println!("  Press Ctrl+C to stop a reply in progress");
        println!();

        loop {
            let line = match self.editor.readline(">>> ") {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("Goodbye!");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    break;
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            self.editor.add_history_entry(trimmed)?;

            let flow = if trimmed.starts_with('/') {
                commands::handle(&mut self.session, trimmed).await?
            } else {
                send(self.session.controller_mut(), trimmed).await?;
                Flow::Continue
            };
            if let Flow::Quit = flow {
                break;
            }
        }

        self.session.logout();
        self.save_history();
        Ok(())
    }
}

/// Submit `text` and print the reply, streaming it if the backend streams
pub async fn send(controller: &mut ChatController, text: &str) -> Result<()> {
    let outcome = match controller.submit(text).await {
        Ok(outcome) => outcome,
        Err(e) => {
            println!("{}", colors::warning(&e.to_user_string()));
            return Ok(());
        }
    };
    print_outcome(controller, outcome).await
}

pub async fn print_outcome(controller: &mut ChatController, outcome: SubmitOutcome) -> Result<()> {
    match outcome {
        SubmitOutcome::Completed { message_id } => {
            if let Some(reply) = controller.messages().get(&message_id) {
                println!();
                println!("{}", reply.message);
                if let Some(url) = &reply.chart_url {
                    println!("{}", colors::link(url));
                }
                println!();
            }
        }
        SubmitOutcome::Streaming { .. } => stream_reply(controller).await?,
        SubmitOutcome::Failed { error, .. } => {
            println!("{}", colors::error(&error));
            println!("{}", colors::status("Use /retry to send it again"));
        }
    }
    Ok(())
}

/// Print rendered chunks until the stream ends or Ctrl+C closes it
async fn stream_reply(controller: &mut ChatController) -> Result<()> {
    println!();
    loop {
        tokio::select! {
            progress = controller.pump() => {
                match progress? {
                    StreamProgress::Rendered(chunk) => {
                        print!("{}", chunk);
                        io::stdout().flush()?;
                    }
                    StreamProgress::Buffered => {}
                    StreamProgress::Finished { tail, .. } => {
                        println!("{}", tail);
                        println!();
                        break;
                    }
                    StreamProgress::Failed { error } => {
                        println!();
                        println!("{}", colors::error(&error));
                        break;
                    }
                    StreamProgress::Idle => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                controller.cancel_stream().await?;
                println!();
                println!("{}", colors::status("[cancelled]"));
                break;
            }
        }
    }
    Ok(())
}
