use crate::core::{
    Action, ActionError, ActionPlan, DecodeError, InputDriver, LogSink, MarionetteError,
    MarionetteResult, TurnDirection,
};
use serde_json::Value;
use std::thread;
use std::time::Duration;

/// Breather after every action so the target application's input queue is
/// never overwhelmed.
const INTER_ACTION_DELAY: Duration = Duration::from_millis(200);
const PER_CHAR_DELAY: Duration = Duration::from_millis(50);
const MOVE_STEPS: i32 = 10;

/// How `move_mouse_relative` reaches the target application. Applications
/// that consume raw pointer deltas defeat some strategies, and the
/// executor cannot observe which one landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PointerStrategy {
    /// Degrading chain: drag, then stepped moves, then an absolute move,
    /// each stage only if the previous one failed.
    Auto,
    Drag,
    Stepped,
    Absolute,
    /// Legacy policy: all three strategies fire unconditionally.
    All,
}

#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub performed: usize,
    pub skipped: usize,
    pub errors: Vec<ActionError>,
}

impl ExecutionReport {
    pub fn failed(&self) -> usize {
        self.errors.len()
    }
}

enum StepOutcome {
    Performed,
    Skipped,
}

pub struct ActionExecutor<D: InputDriver> {
    driver: D,
    log: LogSink,
    strategy: PointerStrategy,
}

impl<D: InputDriver> ActionExecutor<D> {
    pub fn new(driver: D, log: LogSink, strategy: PointerStrategy) -> Self {
        Self {
            driver,
            log,
            strategy,
        }
    }

    /// Walk the plan in order. Execution is best-effort and independent per
    /// action: failures are collected, never propagated, and never abort
    /// the remaining sequence.
    pub fn run(&mut self, plan: &ActionPlan) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        if plan.is_empty() {
            self.log.line("No actions found in the instructions.");
            return report;
        }

        for raw in &plan.actions {
            self.log.line(format!(" > Executing: {}", raw));
            match self.step(raw) {
                Ok(StepOutcome::Performed) => report.performed += 1,
                Ok(StepOutcome::Skipped) => report.skipped += 1,
                Err(error) => {
                    self.log.line(format!("Error executing action {}: {}", raw, error));
                    report.errors.push(error);
                }
            }
            thread::sleep(INTER_ACTION_DELAY);
        }
        report
    }

    fn step(&mut self, raw: &Value) -> Result<StepOutcome, ActionError> {
        let action = match Action::decode(raw) {
            Ok(action) => action,
            Err(DecodeError::UnknownKind(kind)) => {
                self.log
                    .line(format!("Warning: unknown action type '{}', skipping.", kind));
                return Ok(StepOutcome::Skipped);
            }
            Err(DecodeError::Invalid(msg)) => return Err(ActionError::Invalid(msg)),
        };
        self.perform(&action)
            .map_err(|e| ActionError::Failed(e.to_string()))?;
        Ok(StepOutcome::Performed)
    }

    fn perform(&mut self, action: &Action) -> MarionetteResult<()> {
        match action {
            Action::PressKey { key, duration } => {
                self.driver.key_down(key)?;
                thread::sleep(secs(*duration));
                self.driver.key_up(key)
            }
            Action::TypeText { text } => self.driver.type_text(text, PER_CHAR_DELAY),
            Action::Click {
                button,
                clicks,
                interval,
            } => self.driver.click(*button, *clicks, secs(*interval)),
            Action::TurnWithKeys {
                direction,
                duration,
            } => {
                let key = match direction {
                    TurnDirection::Left => "left",
                    TurnDirection::Right => "right",
                };
                self.log
                    .line(format!("Turning {} with the keyboard for {}s", key, duration));
                self.driver.key_down(key)?;
                thread::sleep(secs(*duration));
                self.driver.key_up(key)
            }
            Action::MoveMouseRelative {
                x_offset,
                y_offset,
                duration,
            } => self.perform_pointer_move(*x_offset, *y_offset, secs(*duration)),
        }
    }

    fn perform_pointer_move(&mut self, dx: i32, dy: i32, duration: Duration) -> MarionetteResult<()> {
        self.log_position("Pointer before move");
        let result = match self.strategy {
            PointerStrategy::Drag => self.driver.drag_relative(dx, dy, duration),
            PointerStrategy::Stepped => self.stepped_move(dx, dy, duration),
            PointerStrategy::Absolute => self.absolute_move(dx, dy, duration),
            PointerStrategy::Auto => self.gated_chain(dx, dy, duration),
            PointerStrategy::All => self.fire_all(dx, dy, duration),
        };
        self.log_position("Pointer after move");
        result
    }

    fn gated_chain(&mut self, dx: i32, dy: i32, duration: Duration) -> MarionetteResult<()> {
        match self.driver.drag_relative(dx, dy, duration) {
            Ok(()) => return Ok(()),
            Err(e) => self
                .log
                .line(format!("Drag movement failed: {}. Trying stepped movement...", e)),
        }
        match self.stepped_move(dx, dy, duration) {
            Ok(()) => return Ok(()),
            Err(e) => self
                .log
                .line(format!("Stepped movement failed: {}. Trying absolute movement...", e)),
        }
        self.absolute_move(dx, dy, duration)
    }

    /// Legacy policy: every strategy fires whether or not the previous one
    /// landed, since the executor cannot observe whether the target
    /// application responded to pointer input.
    fn fire_all(&mut self, dx: i32, dy: i32, duration: Duration) -> MarionetteResult<()> {
        let mut succeeded = false;
        let mut last_error = None;

        match self.driver.drag_relative(dx, dy, duration) {
            Ok(()) => succeeded = true,
            Err(e) => {
                self.log.line(format!("Drag movement failed: {}", e));
                last_error = Some(e);
            }
        }
        self.log_position("Pointer after drag");

        match self.stepped_move(dx, dy, duration) {
            Ok(()) => succeeded = true,
            Err(e) => {
                self.log.line(format!("Stepped movement failed: {}", e));
                last_error = Some(e);
            }
        }
        self.log_position("Pointer after stepped moves");

        match self.absolute_move(dx, dy, duration) {
            Ok(()) => succeeded = true,
            Err(e) => {
                self.log.line(format!("Absolute movement failed: {}", e));
                last_error = Some(e);
            }
        }
        self.log_position("Pointer after absolute move");

        if succeeded {
            Ok(())
        } else {
            Err(last_error
                .unwrap_or_else(|| MarionetteError::ExecutionError("pointer movement failed".to_string())))
        }
    }

    /// The delta decomposed into sub-moves for smoother perceived motion;
    /// the final step absorbs the integer-division remainder.
    fn stepped_move(&mut self, dx: i32, dy: i32, duration: Duration) -> MarionetteResult<()> {
        let step_duration = duration / MOVE_STEPS as u32;
        let (qx, qy) = (dx / MOVE_STEPS, dy / MOVE_STEPS);
        for i in 0..MOVE_STEPS {
            let (mx, my) = if i == MOVE_STEPS - 1 {
                (dx - qx * (MOVE_STEPS - 1), dy - qy * (MOVE_STEPS - 1))
            } else {
                (qx, qy)
            };
            self.driver.move_relative(mx, my, step_duration)?;
        }
        Ok(())
    }

    fn absolute_move(&mut self, dx: i32, dy: i32, duration: Duration) -> MarionetteResult<()> {
        let (x, y) = self.driver.position()?;
        self.driver.move_absolute(x + dx, y + dy, duration)
    }

    fn log_position(&mut self, label: &str) {
        match self.driver.position() {
            Ok((x, y)) => self.log.line(format!("{}: x={}, y={}", label, x, y)),
            Err(e) => self.log.line(format!("Could not read pointer position: {}", e)),
        }
    }
}

fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LogEvent, MouseButton};
    use serde_json::json;
    use std::time::Instant;
    use tokio::sync::mpsc::UnboundedReceiver;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        KeyDown(String),
        KeyUp(String),
        TypeText(String),
        Click(MouseButton, u32),
        MoveRel(i32, i32),
        DragRel(i32, i32),
        MoveAbs(i32, i32),
        Position,
    }

    struct RecordingDriver {
        calls: Vec<(Call, Instant)>,
        fail_drag: bool,
        fail_move_rel: bool,
        position: (i32, i32),
    }

    impl RecordingDriver {
        fn new() -> Self {
            Self {
                calls: Vec::new(),
                fail_drag: false,
                fail_move_rel: false,
                position: (100, 200),
            }
        }

        fn record(&mut self, call: Call) {
            self.calls.push((call, Instant::now()));
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.iter().map(|(call, _)| call.clone()).collect()
        }

        fn effects(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|call| !matches!(call, Call::Position))
                .collect()
        }
    }

    impl InputDriver for RecordingDriver {
        fn key_down(&mut self, key: &str) -> MarionetteResult<()> {
            self.record(Call::KeyDown(key.to_string()));
            Ok(())
        }

        fn key_up(&mut self, key: &str) -> MarionetteResult<()> {
            self.record(Call::KeyUp(key.to_string()));
            Ok(())
        }

        fn type_text(&mut self, text: &str, _per_char_delay: Duration) -> MarionetteResult<()> {
            self.record(Call::TypeText(text.to_string()));
            Ok(())
        }

        fn click(&mut self, button: MouseButton, count: u32, _interval: Duration) -> MarionetteResult<()> {
            self.record(Call::Click(button, count));
            Ok(())
        }

        fn move_relative(&mut self, dx: i32, dy: i32, _duration: Duration) -> MarionetteResult<()> {
            self.record(Call::MoveRel(dx, dy));
            if self.fail_move_rel {
                return Err(MarionetteError::ExecutionError("relative move refused".to_string()));
            }
            Ok(())
        }

        fn drag_relative(&mut self, dx: i32, dy: i32, _duration: Duration) -> MarionetteResult<()> {
            self.record(Call::DragRel(dx, dy));
            if self.fail_drag {
                return Err(MarionetteError::ExecutionError("drag refused".to_string()));
            }
            Ok(())
        }

        fn move_absolute(&mut self, x: i32, y: i32, _duration: Duration) -> MarionetteResult<()> {
            self.record(Call::MoveAbs(x, y));
            Ok(())
        }

        fn position(&mut self) -> MarionetteResult<(i32, i32)> {
            self.record(Call::Position);
            Ok(self.position)
        }
    }

    fn executor_with(
        driver: RecordingDriver,
        strategy: PointerStrategy,
    ) -> (ActionExecutor<RecordingDriver>, UnboundedReceiver<LogEvent>) {
        let (log, rx) = LogSink::channel();
        (ActionExecutor::new(driver, log, strategy), rx)
    }

    fn lines(rx: &mut UnboundedReceiver<LogEvent>) -> Vec<String> {
        let mut collected = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let LogEvent::Line(line) = event {
                collected.push(line);
            }
        }
        collected
    }

    fn plan(actions: Vec<Value>) -> ActionPlan {
        ActionPlan { actions }
    }

    #[test]
    fn press_key_round_trip_holds_for_duration() {
        let (mut executor, _rx) = executor_with(RecordingDriver::new(), PointerStrategy::Auto);
        let report = executor.run(&plan(vec![
            json!({"type": "press_key", "key": "w", "duration": 1.0}),
        ]));
        assert_eq!(report.performed, 1);
        assert!(report.errors.is_empty());
        assert_eq!(
            executor.driver.effects(),
            vec![Call::KeyDown("w".to_string()), Call::KeyUp("w".to_string())]
        );
        let held = executor.driver.calls[1]
            .1
            .duration_since(executor.driver.calls[0].1);
        assert!(held >= Duration::from_secs_f64(1.0), "held only {:?}", held);
    }

    #[test]
    fn empty_plan_is_a_no_op() {
        let (mut executor, mut rx) = executor_with(RecordingDriver::new(), PointerStrategy::Auto);
        let report = executor.run(&ActionPlan::default());
        assert_eq!(report.performed, 0);
        assert_eq!(report.skipped, 0);
        assert!(report.errors.is_empty());
        assert!(executor.driver.calls().is_empty());
        assert!(lines(&mut rx)
            .iter()
            .any(|line| line.contains("No actions found")));
    }

    #[test]
    fn invalid_action_does_not_abort_the_rest() {
        let (mut executor, _rx) = executor_with(RecordingDriver::new(), PointerStrategy::Auto);
        let report = executor.run(&plan(vec![
            json!({"type": "press_key", "key": "w", "duration": 0.0}),
            json!({"type": "click", "clicks": 1, "interval": 0.0}),
            json!({"type": "type_text", "text": "/time set day"}),
        ]));
        assert_eq!(report.performed, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(report.errors[0], ActionError::Invalid(_)));
        assert_eq!(
            executor.driver.effects(),
            vec![
                Call::KeyDown("w".to_string()),
                Call::KeyUp("w".to_string()),
                Call::TypeText("/time set day".to_string()),
            ]
        );
    }

    #[test]
    fn unknown_kind_is_skipped_without_effects() {
        let (mut executor, mut rx) = executor_with(RecordingDriver::new(), PointerStrategy::Auto);
        let report = executor.run(&plan(vec![json!({"type": "warp_reality"})]));
        assert_eq!(report.performed, 0);
        assert_eq!(report.skipped, 1);
        assert!(report.errors.is_empty());
        assert!(executor.driver.calls().is_empty());
        assert!(lines(&mut rx)
            .iter()
            .any(|line| line.contains("unknown action type 'warp_reality'")));
    }

    #[test]
    fn each_kind_invokes_its_primitive_once() {
        let (mut executor, _rx) = executor_with(RecordingDriver::new(), PointerStrategy::Drag);
        let report = executor.run(&plan(vec![
            json!({"type": "press_key", "key": "space", "duration": 0.0}),
            json!({"type": "type_text", "text": "hello"}),
            json!({"type": "click", "button": "right", "clicks": 1, "interval": 0.0}),
            json!({"type": "turn_with_keys", "direction": "right", "duration": 0.0}),
            json!({"type": "move_mouse_relative", "x_offset": 10, "y_offset": -5, "duration": 0.0}),
        ]));
        assert_eq!(report.performed, 5);
        assert!(report.errors.is_empty());
        assert_eq!(
            executor.driver.effects(),
            vec![
                Call::KeyDown("space".to_string()),
                Call::KeyUp("space".to_string()),
                Call::TypeText("hello".to_string()),
                Call::Click(MouseButton::Right, 1),
                Call::KeyDown("right".to_string()),
                Call::KeyUp("right".to_string()),
                Call::DragRel(10, -5),
            ]
        );
    }

    #[test]
    fn click_count_reaches_the_driver() {
        let (mut executor, _rx) = executor_with(RecordingDriver::new(), PointerStrategy::Auto);
        executor.run(&plan(vec![
            json!({"type": "click", "button": "left", "clicks": 3, "interval": 0.0}),
        ]));
        assert_eq!(
            executor.driver.effects(),
            vec![Call::Click(MouseButton::Left, 3)]
        );
    }

    #[test]
    fn auto_strategy_stops_after_successful_drag() {
        let (mut executor, _rx) = executor_with(RecordingDriver::new(), PointerStrategy::Auto);
        let report = executor.run(&plan(vec![
            json!({"type": "move_mouse_relative", "x_offset": 100, "y_offset": 0, "duration": 0.0}),
        ]));
        assert_eq!(report.performed, 1);
        assert_eq!(executor.driver.effects(), vec![Call::DragRel(100, 0)]);
    }

    #[test]
    fn auto_strategy_falls_back_to_stepped_when_drag_fails() {
        let mut driver = RecordingDriver::new();
        driver.fail_drag = true;
        let (mut executor, mut rx) = executor_with(driver, PointerStrategy::Auto);
        let report = executor.run(&plan(vec![
            json!({"type": "move_mouse_relative", "x_offset": 100, "y_offset": 50, "duration": 0.0}),
        ]));
        assert_eq!(report.performed, 1);
        assert!(report.errors.is_empty());

        let effects = executor.driver.effects();
        assert_eq!(effects[0], Call::DragRel(100, 50));
        let steps: Vec<&Call> = effects
            .iter()
            .filter(|call| matches!(call, Call::MoveRel(_, _)))
            .collect();
        assert_eq!(steps.len(), MOVE_STEPS as usize);
        assert!(!effects.iter().any(|call| matches!(call, Call::MoveAbs(_, _))));
        assert!(lines(&mut rx)
            .iter()
            .any(|line| line.contains("Drag movement failed")));
    }

    #[test]
    fn auto_strategy_ends_with_absolute_move() {
        let mut driver = RecordingDriver::new();
        driver.fail_drag = true;
        driver.fail_move_rel = true;
        let (mut executor, _rx) = executor_with(driver, PointerStrategy::Auto);
        let report = executor.run(&plan(vec![
            json!({"type": "move_mouse_relative", "x_offset": 30, "y_offset": 40, "duration": 0.0}),
        ]));
        assert_eq!(report.performed, 1);
        // position starts at (100, 200); the absolute landing point adds the offset
        assert!(executor
            .driver
            .effects()
            .contains(&Call::MoveAbs(130, 240)));
    }

    #[test]
    fn all_strategy_fires_every_heuristic() {
        let (mut executor, _rx) = executor_with(RecordingDriver::new(), PointerStrategy::All);
        let report = executor.run(&plan(vec![
            json!({"type": "move_mouse_relative", "x_offset": 805, "y_offset": 0, "duration": 0.0}),
        ]));
        assert_eq!(report.performed, 1);

        let effects = executor.driver.effects();
        assert!(effects.contains(&Call::DragRel(805, 0)));
        let stepped_total: i32 = effects
            .iter()
            .filter_map(|call| match call {
                Call::MoveRel(dx, _) => Some(*dx),
                _ => None,
            })
            .sum();
        assert_eq!(stepped_total, 805, "stepped decomposition must cover the full delta");
        assert!(effects.contains(&Call::MoveAbs(905, 200)));
    }

    #[test]
    fn stepped_strategy_covers_negative_deltas() {
        let (mut executor, _rx) = executor_with(RecordingDriver::new(), PointerStrategy::Stepped);
        executor.run(&plan(vec![
            json!({"type": "move_mouse_relative", "x_offset": -23, "y_offset": 7, "duration": 0.0}),
        ]));
        let (sum_x, sum_y) = executor
            .driver
            .effects()
            .iter()
            .fold((0, 0), |(sx, sy), call| match call {
                Call::MoveRel(dx, dy) => (sx + dx, sy + dy),
                _ => (sx, sy),
            });
        assert_eq!((sum_x, sum_y), (-23, 7));
    }

    #[test]
    fn negative_duration_is_reported_not_performed() {
        let (mut executor, _rx) = executor_with(RecordingDriver::new(), PointerStrategy::Auto);
        let report = executor.run(&plan(vec![
            json!({"type": "press_key", "key": "w", "duration": -2.0}),
        ]));
        assert_eq!(report.performed, 0);
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(report.errors[0], ActionError::Invalid(_)));
        assert!(executor.driver.calls().is_empty());
    }
}
