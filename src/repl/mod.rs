use rustyline::{history::MemHistory, Editor};
use snafu::{ResultExt, Snafu};
use tokio::sync::{mpsc, oneshot};

mod parse;

/// A parsed operator action. This is the same surface a chat adapter would
/// produce; the console is just the transport that ships with the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Action {
    Track {
        target: String,
        handle: Option<String>,
    },
    Untrack {
        target: String,
    },
    Stats {
        target: String,
    },
    Top,
    List,
    Reset,
    Exit,
    None,
}

/// One action on its way to the watcher, with a slot for the answer.
#[derive(Debug)]
pub struct Command {
    pub action: Action,
    pub reply: oneshot::Sender<String>,
}

pub struct Repl {
    inner: Editor<(), MemHistory>,
    message: Option<String>,
}

impl Repl {
    pub fn new() -> Result<Self, ReplError> {
        let config = rustyline::Config::default();
        let inner =
            rustyline::Editor::with_history(config, MemHistory::new()).context(RustylineSnafu)?;

        let repl = Self {
            inner,
            message: None,
        };
        Ok(repl)
    }

    pub async fn prompt(&mut self) -> Action {
        let message = self
            .message
            .as_ref()
            .map(|msg| format!("  {msg}\n"))
            .unwrap_or_default();
        let prompt = format!("{}talon> ", message);

        let Ok(input) = self.inner.readline(&prompt) else {
            return Action::Exit;
        };

        self.message = None;

        if input.trim().is_empty() {
            return Action::None;
        }

        self.inner.add_history_entry(input.clone()).ok();

        match parse::parse(&input) {
            Ok(action) => action,
            Err(err) => {
                self.reply(err.to_string());
                Action::None
            }
        }
    }

    pub fn reply(&mut self, message: String) {
        if let Some(msg) = self.message.as_mut() {
            msg.push('\n');
            msg.push_str(&message);
        } else {
            self.message = Some(message);
        }
    }
}

#[derive(Debug, Snafu)]
pub enum ReplError {
    #[snafu(display("failed to initialize the console: {}", source))]
    Rustyline {
        source: rustyline::error::ReadlineError,
    },
}

/// Drive the console until the operator quits. Every action goes to the
/// watcher over the command channel and the answer is echoed back.
pub async fn start(mut repl: Repl, commands: mpsc::Sender<Command>) -> Result<(), ReplError> {
    tracing::info!("starting operator console");

    loop {
        match repl.prompt().await {
            Action::Exit => break,
            Action::None => continue,
            action => {
                let (tx, rx) = oneshot::channel();
                let command = Command { action, reply: tx };

                if commands.send(command).await.is_err() {
                    break;
                }

                match rx.await {
                    Ok(answer) => repl.reply(answer),
                    Err(_) => break,
                }
            }
        }
    }

    Ok(())
}
