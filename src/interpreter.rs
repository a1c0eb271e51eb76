//! The narrow contract the server and console use to drive a script engine,
//! and the embedded Rhai engine that implements it.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use rhai::{AST, Dynamic, Engine, EvalAltResult, Position, Scope};

/// Shared text sink that captures interpreter output.
#[derive(Clone, Default)]
pub struct OutputBuffer(Arc<Mutex<String>>);

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_str(&self, text: &str) {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_str(text);
    }

    /// Drain everything captured so far.
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretStatus {
    Success,
    Error,
}

impl InterpretStatus {
    pub fn is_error(self) -> bool {
        self == InterpretStatus::Error
    }
}

/// Notifications an interpreter sends back to whoever drives it.
pub trait InterpreterHooks: Send + Sync {
    /// The evaluated code asked for the host to shut down.
    fn on_quit(&self);

    /// One `interpret` call finished.
    fn on_post_command(&self);
}

/// Hooks that ignore every notification.
pub struct NoHooks;

impl InterpreterHooks for NoHooks {
    fn on_quit(&self) {}
    fn on_post_command(&self) {}
}

pub trait Interpreter {
    /// Send everything the script prints into `buffer`; `None` restores stdout.
    fn redirect_output(&mut self, buffer: Option<OutputBuffer>);

    fn interpret(&mut self, command: &str) -> InterpretStatus;

    /// Only meaningful right after `interpret` returned `Error`.
    fn last_error_message(&self) -> &str;

    /// Swallow progress reports instead of writing them to output.
    fn suppress_progress(&mut self) {}

    /// Write the value of every evaluated expression to output.
    fn set_print_results(&mut self, _enabled: bool) {}
}

/// Where printed text currently goes.
#[derive(Clone, Default)]
struct OutputTarget(Arc<Mutex<Option<OutputBuffer>>>);

impl OutputTarget {
    fn set(&self, buffer: Option<OutputBuffer>) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = buffer;
    }

    fn write(&self, text: &str) {
        match &*self.0.lock().unwrap_or_else(|e| e.into_inner()) {
            Some(buffer) => buffer.push_str(text),
            None => print!("{text}"),
        }
    }
}

/// Rhai engine with variables and functions that live across commands.
pub struct RhaiInterpreter {
    engine: Engine,
    scope: Scope<'static>,
    /// functions defined by earlier commands
    library: AST,
    output: OutputTarget,
    report_progress: Arc<AtomicBool>,
    quit_requested: Arc<AtomicBool>,
    print_results: bool,
    hooks: Arc<dyn InterpreterHooks>,
    last_error: String,
}

impl RhaiInterpreter {
    pub fn new(hooks: Arc<dyn InterpreterHooks>) -> Self {
        let mut engine = Engine::new();
        engine.set_max_call_levels(64);
        engine.set_max_expr_depths(64, 64);

        let output = OutputTarget::default();
        let report_progress = Arc::new(AtomicBool::new(true));
        let quit_requested = Arc::new(AtomicBool::new(false));

        let out = output.clone();
        engine.on_print(move |msg| {
            out.write(msg);
            out.write("\n");
        });
        engine.on_debug(|msg, source, pos| {
            log::debug!("script debug {}@{pos}: {msg}", source.unwrap_or("<command>"));
        });

        // progress(fraction)
        let out = output.clone();
        let report = report_progress.clone();
        engine.register_fn("progress", move |fraction: f64| {
            if report.load(Ordering::Relaxed) {
                out.write(&format!("progress: {:.0}%\n", fraction.clamp(0.0, 1.0) * 100.0));
            }
        });

        // quit() stops the current evaluation and tells the host to shut down
        let hook = hooks.clone();
        let requested = quit_requested.clone();
        engine.register_fn("quit", move || -> Result<(), Box<EvalAltResult>> {
            requested.store(true, Ordering::Relaxed);
            hook.on_quit();
            Err(Box::new(EvalAltResult::ErrorTerminated(
                Dynamic::UNIT,
                Position::NONE,
            )))
        });

        Self {
            engine,
            scope: Scope::new(),
            library: AST::empty(),
            output,
            report_progress,
            quit_requested,
            print_results: false,
            hooks,
            last_error: String::new(),
        }
    }

    fn evaluate(&mut self, command: &str) -> Result<Dynamic, Box<EvalAltResult>> {
        let ast = self.engine.compile_with_scope(&self.scope, command)?;
        let program = self.library.merge(&ast);
        let value = self.engine.eval_ast_with_scope::<Dynamic>(&mut self.scope, &program)?;
        self.library.combine(ast.clone_functions_only());
        Ok(value)
    }
}

impl Interpreter for RhaiInterpreter {
    fn redirect_output(&mut self, buffer: Option<OutputBuffer>) {
        self.output.set(buffer);
    }

    fn interpret(&mut self, command: &str) -> InterpretStatus {
        self.quit_requested.store(false, Ordering::Relaxed);

        let status = match self.evaluate(command) {
            Ok(value) => {
                if self.print_results && !value.is_unit() {
                    self.output.write(&format!("{value}\n"));
                }
                InterpretStatus::Success
            }
            // the termination raised by quit() may arrive wrapped in a call error
            Err(_) if self.quit_requested.load(Ordering::Relaxed) => InterpretStatus::Success,
            Err(e) => {
                self.last_error = e.to_string();
                InterpretStatus::Error
            }
        };
        log::debug!("interpret returned {status:?}");

        self.hooks.on_post_command();
        status
    }

    fn last_error_message(&self) -> &str {
        &self.last_error
    }

    fn suppress_progress(&mut self) {
        self.report_progress.store(false, Ordering::Relaxed);
    }

    fn set_print_results(&mut self, enabled: bool) {
        self.print_results = enabled;
    }
}
