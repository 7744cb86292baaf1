//! The command loop.
//!
//! A [`Worker`] owns the connection and all session state. It announces
//! itself with a `pid_response`, then reads one control message at a time
//! and hands it to the matching handler. The next frame is not read until
//! the handler has sent everything it is going to send.
//!
//! # Error handling
//!
//! - Recoverable handler errors become one `error` response.
//! - Fatal errors (see [`crate::WorkerError::is_fatal`]) close the connection and
//!   end [`Worker::run`] with the error.
//! - Messages without a `command`, and unknown commands, get no response.

mod handlers;

use crate::debug::DebugBuffer;
use crate::env::{Environment, Value};
use crate::protocol::{Command, ControlMessage, Response};
use crate::script::{JsScriptEngine, ScriptEngine};
use crate::shm::{default_broker, HandleSlot, MemoryBroker};
use crate::transport::Connection;
use crate::Result;
use tracing::{debug, error, info, warn};

/// Whether the loop keeps going after a command.
pub(crate) enum Flow {
    Continue,
    Shutdown,
}

/// Everything a handler may read or change.
pub(crate) struct WorkerState {
    pub(crate) env: Environment,
    pub(crate) handle: HandleSlot,
    pub(crate) engine: Box<dyn ScriptEngine>,
    pub(crate) broker: Box<dyn MemoryBroker>,
    pub(crate) debug: DebugBuffer,
    pub(crate) startup_debug: bool,
}

impl WorkerState {
    /// Write to the debug buffer when `enabled`.
    pub(crate) fn trace(&self, enabled: bool, text: &str) {
        if enabled {
            self.debug.write_out(text);
        }
    }
}

/// Builder for a [`Worker`].
///
/// ```rust,ignore
/// let conn = Connection::connect("localhost", port).await?;
/// let worker = Worker::builder()
///     .debug(true)
///     .with_variable("cluster", serde_json::json!({"workers": 4}))
///     .build(conn)?;
/// worker.run().await?;
/// ```
#[derive(Default)]
pub struct WorkerBuilder {
    engine: Option<Box<dyn ScriptEngine>>,
    broker: Option<Box<dyn MemoryBroker>>,
    debug_buffer: Option<DebugBuffer>,
    startup_debug: bool,
    variables: Vec<(String, Value)>,
}

impl WorkerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom script engine.
    ///
    /// Default: [`JsScriptEngine`]
    pub fn with_script_engine(mut self, engine: impl ScriptEngine + 'static) -> Self {
        self.engine = Some(Box::new(engine));
        self
    }

    /// Use a custom broker for `share_instances`.
    ///
    /// Default: POSIX shared memory on Unix, an empty in-memory broker
    /// elsewhere.
    pub fn with_memory_broker(mut self, broker: impl MemoryBroker + 'static) -> Self {
        self.broker = Some(Box::new(broker));
        self
    }

    /// Share a debug buffer with the caller, typically so the log
    /// subscriber can write into it.
    pub fn with_debug_buffer(mut self, buffer: DebugBuffer) -> Self {
        self.debug_buffer = Some(buffer);
        self
    }

    /// Register an entry before the command loop starts.
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.push((name.into(), value.into()));
        self
    }

    /// Startup debug mode: lifecycle messages go to the debug buffer.
    pub fn debug(mut self, enable: bool) -> Self {
        self.startup_debug = enable;
        self
    }

    pub fn build(self, conn: Connection) -> Result<Worker> {
        let engine: Box<dyn ScriptEngine> = match self.engine {
            Some(engine) => engine,
            None => Box::new(JsScriptEngine::new()?),
        };
        let mut env = Environment::new();
        for (name, value) in self.variables {
            debug!("Registering bootstrap variable {}", name);
            env.set(name, value);
        }

        Ok(Worker {
            conn,
            state: WorkerState {
                env,
                handle: HandleSlot::new(),
                engine,
                broker: self.broker.unwrap_or_else(default_broker),
                debug: self.debug_buffer.unwrap_or_default(),
                startup_debug: self.startup_debug,
            },
        })
    }
}

/// A single-connection command worker.
pub struct Worker {
    conn: Connection,
    state: WorkerState,
}

impl Worker {
    pub fn builder() -> WorkerBuilder {
        WorkerBuilder::new()
    }

    pub fn debug_buffer(&self) -> &DebugBuffer {
        &self.state.debug
    }

    pub fn environment(&self) -> &Environment {
        &self.state.env
    }

    /// Serve commands until `shutdown` or a fatal error.
    ///
    /// The connection is closed on return either way.
    pub async fn run(mut self) -> Result<()> {
        let result = self.serve().await;
        if let Err(e) = self.conn.close().await {
            debug!("Error closing connection: {}", e);
        }
        result
    }

    async fn serve(&mut self) -> Result<()> {
        let pid = std::process::id();
        self.state.trace(self.state.startup_debug, "Worker starting...\n");
        self.conn.send_json(&Response::pid(pid)).await?;
        info!("Worker {} connected", pid);

        loop {
            let message = ControlMessage::from_value(self.conn.receive_json().await?);

            let Some(name) = message.command() else {
                warn!("Control message did not contain a command field");
                self.state.trace(
                    self.state.startup_debug,
                    "message did not contain a command field!\n",
                );
                continue;
            };
            let Some(command) = Command::parse(name) else {
                warn!("Ignoring unknown command {}", name);
                continue;
            };

            debug!("Dispatching {}", command.as_str());
            match handlers::dispatch(command, &mut self.conn, &mut self.state, &message).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Shutdown) => {
                    info!("Shutdown requested");
                    return Ok(());
                }
                Err(e) if e.is_fatal() => {
                    error!("Fatal error in {}: {}", command.as_str(), e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("{} failed: {}", command.as_str(), e);
                    self.conn.send_json(&Response::error(e.to_string())).await?;
                }
            }
        }
    }
}
