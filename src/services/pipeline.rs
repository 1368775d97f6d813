use crate::core::{InputDriver, LogSink, MarionetteError, MarionetteResult, Session, Translator};
use crate::services::{
    ActionExecutor, EnigoDriver, ExecutionReport, GeminiTranslator, PointerStrategy,
};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub pointer_strategy: PointerStrategy,
    pub countdown_secs: u32,
}

/// Run one command session on a background task. Every failure is caught
/// here and turned into log output; the done signal fires regardless of
/// outcome so the surface can re-enable its trigger.
pub fn spawn(credential: String, command: String, config: PipelineConfig, log: LogSink) {
    tokio::spawn(async move {
        if let Err(error) = run(credential, command, config, &log).await {
            log.line(error.to_string());
            log.fatal(error.to_string());
        }
        log.done();
    });
}

pub async fn run(
    credential: String,
    command: String,
    config: PipelineConfig,
    log: &LogSink,
) -> MarionetteResult<()> {
    if credential.trim().is_empty() || command.trim().is_empty() {
        return Err(MarionetteError::InputError(
            "Please provide both an API key and a command.".to_string(),
        ));
    }

    let session = Session::new(command, log.clone());
    log.line("=".repeat(30));
    log.line(format!("Received command: '{}'", session.command()));
    log.line(format!(
        "Giving you {} seconds to switch to the target window...",
        config.countdown_secs
    ));
    log.line("IMPORTANT: make sure the target application has input focus!");
    for remaining in (1..=config.countdown_secs).rev() {
        log.line(format!("{}...", remaining));
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    log.line("Action starts now!");

    log.line("Contacting the Gemini API...");
    let translator = GeminiTranslator::with_default_base(credential, log.clone());
    let plan = translator.translate(session.command()).await?;
    log.line("Successfully received an action plan.");

    if plan.is_empty() {
        log.line("No actions found in the instructions.");
        return Ok(());
    }

    log.line("Executing actions...");
    let strategy = config.pointer_strategy;
    let executor_log = session.log().clone();
    let report = tokio::task::spawn_blocking(move || -> MarionetteResult<ExecutionReport> {
        let mut driver = EnigoDriver::new()?;
        match driver.position() {
            Ok((x, y)) => executor_log.line(format!("Mouse cursor is at: x={}, y={}", x, y)),
            Err(e) => executor_log.line(format!("Could not get mouse position: {}", e)),
        }
        let mut executor = ActionExecutor::new(driver, executor_log, strategy);
        Ok(executor.run(&plan))
    })
    .await
    .map_err(|e| MarionetteError::ExecutionError(format!("executor task failed: {}", e)))??;

    if report.errors.is_empty() {
        log.line(format!(
            "All actions completed successfully ({} performed, {} skipped).",
            report.performed, report.skipped
        ));
    } else {
        log.line(format!(
            "Sequence finished with {} error(s): {} performed, {} skipped.",
            report.failed(),
            report.performed,
            report.skipped
        ));
    }
    Ok(())
}
