//! Tabwire Core - headless command worker for a controlling host.
//!
//! A worker connects back to its host over TCP, announces its process id,
//! and then serves length-prefixed JSON control messages one at a time.
//! Commands move tabular datasets in and out of a named variable
//! environment, run scripts against that environment, map shared-memory
//! arrays and render figures.
//!
//! # Example
//!
//! ```rust,ignore
//! use tabwire_core::{Connection, Worker};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> tabwire_core::Result<()> {
//!     let conn = Connection::connect("localhost", 9001).await?;
//!     Worker::builder().build(conn)?.run().await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod dataset;
pub mod debug;
pub mod dispatch;
pub mod env;
pub mod error;
pub mod figure;
pub mod protocol;
pub mod script;
pub mod shm;
pub mod transport;

// Re-export commonly used types
pub use codec::VariableEncoding;
pub use config::{DatasetConfig, ProtocolConfig, ScriptConfig, SharedMemoryConfig};
pub use dataset::{Dataset, InstancesHeader};
pub use debug::DebugBuffer;
pub use dispatch::{Worker, WorkerBuilder};
pub use env::{Environment, Value, VariableInfo};
pub use error::{Result, WorkerError};
pub use figure::Figure;
pub use protocol::{Command, ControlMessage, Response};
pub use script::{JsScriptEngine, ScriptEngine, ScriptOutput};
pub use shm::{ArrayView, DType, InMemoryBroker, MemoryBroker, SharedRegion};
pub use transport::Connection;
