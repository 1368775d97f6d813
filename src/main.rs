mod core;
mod services;
mod ui;

use clap::Parser;

use crate::services::PointerStrategy;
use crate::ui::MarionetteTerminal;

#[derive(Parser)]
#[command(name = "marionette")]
#[command(about = "Drive the focused application with natural-language commands")]
struct Cli {
    /// How move_mouse_relative reaches the target application
    #[arg(long, value_enum, default_value = "auto")]
    pointer_strategy: PointerStrategy,

    /// Seconds to switch focus to the target window before actions fire
    #[arg(long, default_value_t = 5)]
    countdown: u32,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mut terminal = match MarionetteTerminal::new(cli.pointer_strategy, cli.countdown) {
        Ok(terminal) => terminal,
        Err(error) => {
            eprintln!("{}", error);
            std::process::exit(1);
        }
    };

    terminal.run().await;
}
