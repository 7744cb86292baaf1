//! Script execution.
//!
//! The dispatcher only sees [`ScriptEngine::run`]: code goes in together with
//! the environment, captured output comes out. Whatever the script does to
//! the environment happens through that `&mut` borrow and nowhere else.

mod js;

pub use js::JsScriptEngine;

use crate::env::Environment;

/// Text captured during one script run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutput {
    pub stdout: String,
    pub stderr: String,
}

/// The capability to run host-supplied code against the environment.
///
/// Implementations never fail: exceptions raised by the script are reported
/// in [`ScriptOutput::stderr`] and the run still returns.
pub trait ScriptEngine {
    fn run(&mut self, code: &str, env: &mut Environment) -> ScriptOutput;
}
