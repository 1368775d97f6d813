use colored::*;
use rustyline::error::ReadlineError;
use rustyline::{Config, DefaultEditor, EditMode};
use tokio::sync::mpsc;

use crate::core::{LogEvent, LogSink, MarionetteError, MarionetteResult};
use crate::services::pipeline::{self, PipelineConfig};
use crate::services::PointerStrategy;

enum CommandInput {
    Run(String),
    Exit,
}

pub struct MarionetteTerminal {
    editor: DefaultEditor,
    pointer_strategy: PointerStrategy,
    countdown_secs: u32,
    // kept for the life of the process only, never written anywhere
    credential: Option<String>,
}

impl MarionetteTerminal {
    pub fn new(pointer_strategy: PointerStrategy, countdown_secs: u32) -> MarionetteResult<Self> {
        let config = Config::builder().edit_mode(EditMode::Emacs).build();
        let editor = DefaultEditor::with_config(config).map_err(|e| {
            MarionetteError::InputError(format!("Failed to initialise the line editor: {}", e))
        })?;
        Ok(Self {
            editor,
            pointer_strategy,
            countdown_secs,
            credential: None,
        })
    }

    pub fn display_welcome(&self) {
        println!(
            "{}",
            "=== Marionette - natural-language desktop automation ===".green().bold()
        );
        println!("{}", "How it works:".blue());
        println!("{}", " - Describe what to do in plain language".blue());
        println!("{}", " - A language model turns it into key and mouse actions".blue());
        println!("{}", " - The actions replay against the window that holds focus".blue());
        println!(
            "{}",
            "\nFocus the target application during the countdown. Type 'exit' or 'quit' to leave."
                .yellow()
        );
    }

    pub async fn run(&mut self) {
        self.display_welcome();

        // Absorb terminal control signals so a running sequence is not
        // killed from under the target application.
        let (tx, mut sig_rx) = tokio::sync::mpsc::channel(1);
        let tx_clone = tx.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigint = signal(SignalKind::interrupt()).unwrap();
            let mut sigtstp = signal(SignalKind::from_raw(libc::SIGTSTP)).unwrap();
            let mut sigcont = signal(SignalKind::from_raw(libc::SIGCONT)).unwrap();

            loop {
                tokio::select! {
                    _ = sigint.recv() => {
                        let _ = tx_clone.send("INT").await;
                    }
                    _ = sigtstp.recv() => {
                        let _ = tx_clone.send("TSTP").await;
                    }
                    _ = sigcont.recv() => {
                        let _ = tx_clone.send("CONT").await;
                    }
                }
            }
        });

        loop {
            match self.read_command() {
                Ok(CommandInput::Run(command)) if command.is_empty() => continue,
                Ok(CommandInput::Run(command)) => {
                    let credential = match self.obtain_credential() {
                        Ok(credential) => credential,
                        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => continue,
                        Err(err) => {
                            eprintln!("{} {}", "Error:".red(), err);
                            break;
                        }
                    };
                    // stale signals from the prompt must not leak into the session
                    while sig_rx.try_recv().is_ok() {}
                    self.run_session(credential, command, &mut sig_rx).await;
                }
                Ok(CommandInput::Exit) => {
                    println!("{}", "Goodbye!".green());
                    break;
                }
                Err(ReadlineError::Interrupted) => {
                    println!(
                        "{}",
                        "CTRL-C pressed. Use 'exit' or 'quit' to leave.".yellow()
                    );
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "Goodbye!".green());
                    break;
                }
                Err(err) => {
                    eprintln!("{} {}", "Error:".red(), err);
                    break;
                }
            }
        }
    }

    fn read_command(&mut self) -> Result<CommandInput, ReadlineError> {
        let line = self.editor.readline("marionette> ")?;
        let _ = self.editor.add_history_entry(line.as_str());
        let input = line.trim();
        if input == "exit" || input == "quit" {
            return Ok(CommandInput::Exit);
        }
        Ok(CommandInput::Run(input.to_string()))
    }

    fn obtain_credential(&mut self) -> Result<String, ReadlineError> {
        if let Some(credential) = &self.credential {
            return Ok(credential.clone());
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            let key = key.trim().to_string();
            if !key.is_empty() {
                println!("{}", "Using the API key from GEMINI_API_KEY.".blue());
                self.credential = Some(key.clone());
                return Ok(key);
            }
        }
        let line = self.editor.readline("Gemini API key: ")?;
        let key = line.trim().to_string();
        if !key.is_empty() {
            self.credential = Some(key.clone());
        }
        Ok(key)
    }

    /// The prompt stays disabled until the pipeline signals done; the
    /// foreground is the only writer of the interactive surface.
    async fn run_session(
        &mut self,
        credential: String,
        command: String,
        sig_rx: &mut mpsc::Receiver<&'static str>,
    ) {
        let (log, mut rx) = LogSink::channel();
        let config = PipelineConfig {
            pointer_strategy: self.pointer_strategy,
            countdown_secs: self.countdown_secs,
        };
        pipeline::spawn(credential, command, config, log);

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(LogEvent::Line(line)) => println!("{}", line),
                    Some(LogEvent::Fatal(message)) => {
                        eprintln!("{}", "=== Execution error ===".red().bold());
                        eprintln!("{}", message.red());
                    }
                    Some(LogEvent::Done) | None => break,
                },
                signal = sig_rx.recv() => {
                    match signal.unwrap_or_default() {
                        "INT" => {
                            println!(
                                "{}",
                                "\nA running sequence cannot be cancelled. Move focus away from the target window to regain control.".yellow()
                            );
                        }
                        "TSTP" => {
                            println!("{}", "\nCTRL-Z pressed. The session keeps running.".yellow());
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}
