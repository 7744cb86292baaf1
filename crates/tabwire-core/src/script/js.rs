//! Embedded JavaScript engine.
//!
//! One Boa context lives for the whole session, so functions defined by one
//! script are callable from the next. The environment and the context are
//! kept in step around each run:
//!
//! 1. every JSON entry of the environment is published as a global
//! 2. the script runs; `console.*`, `print` and `env.*` record into a
//!    thread-local session
//! 3. enumerable, non-function globals are read back into the environment
//! 4. queued `env.*` operations are applied
//!
//! Only global object properties take part in step 3. Top-level `let` and
//! `const` bindings persist in the context but are not exported.

use super::{ScriptEngine, ScriptOutput};
use crate::config::ScriptConfig;
use crate::env::{Environment, Value};
use crate::figure::Figure;
use crate::{Result, WorkerError};
use boa_engine::object::ObjectInitializer;
use boa_engine::property::Attribute;
use boa_engine::{
    js_string, Context, JsError, JsNativeError, JsResult, JsString, JsValue, NativeFunction,
    Source,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Largest side accepted by `env.figure`.
const MAX_FIGURE_SIDE: u32 = 16_384;

const GLOBAL_NAMES_SCRIPT: &str = "JSON.stringify(Object.getOwnPropertyNames(globalThis))";

// Non-finite numbers have no JSON form. They are reported instead of being
// coerced to null.
const HARVEST_SCRIPT: &str = r#"(() => {
  const values = {};
  const invalid = [];
  const finite = (key, value) => {
    if (typeof value === "number" && !Number.isFinite(value)) {
      throw new RangeError(String(value));
    }
    return value;
  };
  for (const key of Object.keys(globalThis)) {
    const value = globalThis[key];
    if (value === undefined || typeof value === "function" || typeof value === "symbol") {
      continue;
    }
    try {
      const text = JSON.stringify(value, finite);
      if (text !== undefined) {
        values[key] = text;
      }
    } catch (e) {
      if (e instanceof RangeError) {
        invalid.push([key, e.message]);
      }
    }
  }
  return JSON.stringify({ values, invalid });
})()"#;

/// Globals read back after a run.
#[derive(Deserialize)]
struct Harvest {
    /// JSON text per global.
    values: BTreeMap<String, String>,
    /// Globals holding a non-finite number, with its rendering.
    invalid: Vec<(String, String)>,
}

/// Environment change requested by a script, applied after it finishes.
enum EnvOp {
    Remove(String),
    Set(String, Value),
}

#[derive(Default)]
struct Session {
    stdout: String,
    stderr: String,
    ops: Vec<EnvOp>,
    /// `describe` output per entry, kept current as ops are queued.
    entries: BTreeMap<String, serde_json::Value>,
}

// Native functions are plain fn pointers and cannot capture state, so the
// per-run buffers live here. Script execution is single-threaded.
thread_local! {
    static SESSION: RefCell<Session> = RefCell::new(Session::default());
}

fn with_session<R>(f: impl FnOnce(&mut Session) -> R) -> R {
    SESSION.with(|session| f(&mut session.borrow_mut()))
}

fn join_args(args: &[JsValue], context: &mut Context) -> JsResult<String> {
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        if arg.is_string() {
            parts.push(arg.to_string(context)?.to_std_string_escaped());
        } else {
            parts.push(arg.display().to_string());
        }
    }
    Ok(parts.join(" "))
}

fn console_out(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let line = join_args(args, context)?;
    with_session(|s| {
        s.stdout.push_str(&line);
        s.stdout.push('\n');
    });
    Ok(JsValue::undefined())
}

fn console_err(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let line = join_args(args, context)?;
    with_session(|s| {
        s.stderr.push_str(&line);
        s.stderr.push('\n');
    });
    Ok(JsValue::undefined())
}

fn string_arg(
    args: &[JsValue],
    index: usize,
    what: &str,
    context: &mut Context,
) -> JsResult<String> {
    match args.get(index) {
        Some(value) if !value.is_undefined() => {
            Ok(value.to_string(context)?.to_std_string_escaped())
        }
        _ => Err(JsNativeError::typ()
            .with_message(format!("missing argument: {}", what))
            .into()),
    }
}

fn number_arg(args: &[JsValue], index: usize, context: &mut Context) -> JsResult<f64> {
    Ok(args
        .get(index)
        .map(|v| v.to_number(context))
        .transpose()?
        .unwrap_or(0.0))
}

fn env_names(_this: &JsValue, _args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let names: Vec<String> = with_session(|s| s.entries.keys().cloned().collect());
    JsValue::from_json(&json!(names), context)
}

fn env_describe(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let name = string_arg(args, 0, "name", context)?;
    match with_session(|s| s.entries.get(&name).cloned()) {
        Some(described) => JsValue::from_json(&described, context),
        None => Ok(JsValue::null()),
    }
}

fn env_remove(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let name = string_arg(args, 0, "name", context)?;
    let existed = with_session(|s| {
        let existed = s.entries.remove(&name).is_some();
        if existed {
            s.ops.push(EnvOp::Remove(name));
        }
        existed
    });
    Ok(JsValue::from(existed))
}

fn figure_side(value: f64) -> JsResult<u32> {
    if value.is_finite() && value >= 1.0 && value <= f64::from(MAX_FIGURE_SIDE) {
        Ok(value as u32)
    } else {
        Err(JsNativeError::range()
            .with_message(format!(
                "figure sides must be between 1 and {}, got {}",
                MAX_FIGURE_SIDE, value
            ))
            .into())
    }
}

fn figure_channel(value: f64) -> u8 {
    value.clamp(0.0, 255.0) as u8
}

fn env_figure(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let name = string_arg(args, 0, "name", context)?;
    let width = figure_side(number_arg(args, 1, context)?)?;
    let height = figure_side(number_arg(args, 2, context)?)?;
    let rgb = [
        figure_channel(number_arg(args, 3, context)?),
        figure_channel(number_arg(args, 4, context)?),
        figure_channel(number_arg(args, 5, context)?),
    ];
    let value = Value::from(Figure::solid(width, height, rgb));
    let described = value.describe(&name);
    with_session(|s| {
        s.entries.insert(name.clone(), described);
        s.ops.push(EnvOp::Set(name, value));
    });
    Ok(JsValue::undefined())
}

fn register_natives(context: &mut Context) -> JsResult<()> {
    // Non-enumerable, so the harvest step never reads them back.
    let hidden = Attribute::WRITABLE | Attribute::CONFIGURABLE;

    let console = ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(console_out), js_string!("log"), 0)
        .function(NativeFunction::from_fn_ptr(console_out), js_string!("info"), 0)
        .function(NativeFunction::from_fn_ptr(console_err), js_string!("warn"), 0)
        .function(NativeFunction::from_fn_ptr(console_err), js_string!("error"), 0)
        .build();
    context.register_global_property(js_string!("console"), console, hidden)?;

    let print = NativeFunction::from_fn_ptr(console_out).to_js_function(context.realm());
    context.register_global_property(js_string!("print"), print, hidden)?;

    let env = ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(env_names), js_string!("names"), 0)
        .function(NativeFunction::from_fn_ptr(env_describe), js_string!("describe"), 1)
        .function(NativeFunction::from_fn_ptr(env_remove), js_string!("remove"), 1)
        .function(NativeFunction::from_fn_ptr(env_figure), js_string!("figure"), 6)
        .build();
    context.register_global_property(js_string!("env"), env, hidden)?;

    Ok(())
}

fn js_failure(err: &JsError) -> WorkerError {
    WorkerError::Other(format!("script engine error: {}", err))
}

/// Evaluate `code`, which must produce a JSON string, and decode it.
fn eval_json<T: DeserializeOwned>(context: &mut Context, code: &str) -> Result<T> {
    let value = context
        .eval(Source::from_bytes(code.as_bytes()))
        .map_err(|e| js_failure(&e))?;
    let text = value
        .to_string(context)
        .map_err(|e| js_failure(&e))?
        .to_std_string_escaped();
    serde_json::from_str(&text)
        .map_err(|e| WorkerError::Other(format!("script engine returned invalid JSON: {}", e)))
}

/// [`ScriptEngine`] backed by the Boa JavaScript engine.
pub struct JsScriptEngine {
    context: Context,
    /// Globals present before any user code ran.
    reserved: HashSet<String>,
    /// Globals currently mirroring an environment entry.
    published: HashSet<String>,
}

impl JsScriptEngine {
    pub fn new() -> Result<Self> {
        let mut context = Context::default();
        register_natives(&mut context).map_err(|e| js_failure(&e))?;
        let reserved: Vec<String> = eval_json(&mut context, GLOBAL_NAMES_SCRIPT)?;
        debug!("Script engine ready with {} reserved globals", reserved.len());
        Ok(Self {
            context,
            reserved: reserved.into_iter().collect(),
            published: HashSet::new(),
        })
    }

    /// Remove a global so the next harvest skips it.
    fn clear_global(&mut self, name: &str) -> Result<()> {
        let global = self.context.global_object();
        let key = JsString::from(name);
        let deleted = global
            .delete_property_or_throw(key.clone(), &mut self.context)
            .unwrap_or(false);
        if !deleted {
            // `var` bindings cannot be deleted; undefined is never harvested.
            global
                .set(key, JsValue::undefined(), false, &mut self.context)
                .map_err(|e| js_failure(&e))?;
        }
        Ok(())
    }

    /// Mirror the JSON entries of `env` into the global object.
    fn publish(&mut self, env: &Environment) -> Result<()> {
        let global = self.context.global_object();

        // Drop mirrors whose entry is gone or is no longer plain data.
        for name in std::mem::take(&mut self.published) {
            if matches!(env.get(&name), Some(Value::Object(_))) {
                continue;
            }
            self.clear_global(&name)?;
        }

        for (name, value) in env.iter() {
            let Value::Object(object) = value else {
                continue;
            };
            if self.reserved.contains(name) {
                continue;
            }
            let js_value =
                JsValue::from_json(object, &mut self.context).map_err(|e| js_failure(&e))?;
            global
                .set(JsString::from(name.as_str()), js_value, false, &mut self.context)
                .map_err(|e| js_failure(&e))?;
            self.published.insert(name.clone());
        }
        Ok(())
    }

    /// Read enumerable globals back into `env`.
    ///
    /// Returns the globals that held a non-finite number. Those are cleared
    /// from the context and left out of `env`.
    fn harvest(&mut self, env: &mut Environment) -> Result<Vec<(String, String)>> {
        let Harvest { values, invalid } = eval_json(&mut self.context, HARVEST_SCRIPT)?;
        let mut harvested = HashSet::new();
        for (name, text) in values {
            if self.reserved.contains(&name) {
                continue;
            }
            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(value) => {
                    env.set(name.clone(), value);
                    harvested.insert(name);
                }
                Err(e) => warn!("Skipping global {}: {}", name, e),
            }
        }

        let invalid: Vec<(String, String)> = invalid
            .into_iter()
            .filter(|(name, _)| !self.reserved.contains(name))
            .collect();
        for (name, _) in &invalid {
            self.clear_global(name)?;
        }

        // Mirrors the script deleted, or turned into functions.
        for name in self.published.difference(&harvested) {
            if matches!(env.get(name), Some(Value::Object(_))) {
                env.remove(name);
            }
        }
        self.published = harvested;
        Ok(invalid)
    }

    fn exception_text(&mut self, err: &JsError) -> String {
        match err.try_native(&mut self.context) {
            Ok(native) => native.to_string(),
            Err(_) => err.to_string(),
        }
    }
}

impl ScriptEngine for JsScriptEngine {
    fn run(&mut self, code: &str, env: &mut Environment) -> ScriptOutput {
        let entries = env
            .iter()
            .map(|(name, value)| (name.clone(), value.describe(name)))
            .collect();
        with_session(|s| {
            *s = Session {
                entries,
                ..Session::default()
            }
        });

        if let Err(e) = self.publish(env) {
            warn!("Failed to publish environment to script: {}", e);
            with_session(|s| s.stderr.push_str(&format!("{}\n", e)));
        }

        let mut raised = false;
        if let Err(err) = self.context.eval(Source::from_bytes(code.as_bytes())) {
            let text = self.exception_text(&err);
            debug!("Script raised: {}", text);
            raised = true;
            with_session(|s| {
                s.stdout.push_str(ScriptConfig::EXCEPTION_MARKER);
                s.stdout.push('\n');
                s.stderr.push_str(&text);
                s.stderr.push('\n');
            });
        }

        match self.harvest(env) {
            Ok(invalid) => {
                for (name, value) in invalid {
                    debug!("Script left {} = {}", name, value);
                    with_session(|s| {
                        if !raised {
                            s.stdout.push_str(ScriptConfig::EXCEPTION_MARKER);
                            s.stdout.push('\n');
                            raised = true;
                        }
                        s.stderr.push_str(&format!(
                            "RangeError: {} is not a finite number ({})\n",
                            name, value
                        ));
                    });
                }
            }
            Err(e) => {
                warn!("Failed to read script globals: {}", e);
                with_session(|s| s.stderr.push_str(&format!("{}\n", e)));
            }
        }

        let session = with_session(std::mem::take);
        for op in session.ops {
            match op {
                EnvOp::Remove(name) => {
                    env.remove(&name);
                }
                EnvOp::Set(name, value) => env.set(name, value),
            }
        }

        ScriptOutput {
            stdout: session.stdout,
            stderr: session.stderr,
        }
    }
}
