//! XPC interception agent
//!
//! Hooks the libxpc send and receive entry points inside a target, filters
//! calls by connection name, describes the connection and message objects and
//! decodes binary property lists embedded in message payloads. Records are
//! streamed to the controlling host through an [`EventSink`].
//!
//! The instrumentation toolkit itself stays outside this crate: it is reached
//! through the [`SymbolResolver`], [`Interceptor`] and [`TargetRuntime`]
//! traits. [`simulate`] provides an in-memory implementation of all three.

pub mod config;
pub mod decoder;
pub mod emitter;
pub mod error;
pub mod filter;
pub mod formatter;
pub mod handler;
pub mod hooks;
pub mod runtime;
pub mod session;
pub mod simulate;

pub use config::Config;
pub use decoder::{decode_dictionary, DecodeError};
pub use emitter::{ChannelSink, EventSink, LineSink, MemorySink};
pub use error::AgentError;
pub use filter::ChannelMatcher;
pub use handler::{CallArgs, CallHandler};
pub use hooks::{HookDescriptor, HookRegistry, Interceptor, Probe, SymbolResolver};
pub use runtime::{classify, Handle, Kind, TargetRuntime};
pub use session::InstrumentationSession;
