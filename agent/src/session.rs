//! Instrumentation session
//!
//! Built once per target: resolves the hook table, then installs one probe per
//! applicable entry point. Everything a probe needs is captured immutably at
//! installation.

use std::sync::Arc;

use tracing::{debug, info};
use xpcspy_shared::types::filter::Filter;

use crate::emitter::EventSink;
use crate::error::AgentError;
use crate::filter::ChannelMatcher;
use crate::handler::{CallHandler, HookProbe};
use crate::hooks::{HookRegistry, Interceptor, SymbolResolver};
use crate::runtime::TargetRuntime;

pub struct InstrumentationSession {
    registry: HookRegistry,
    runtime: Arc<dyn TargetRuntime>,
    sink: Arc<dyn EventSink>,
}

impl InstrumentationSession {
    /// Resolve every hook up front; an unresolvable symbol aborts startup.
    pub fn init(
        resolver: &(impl SymbolResolver + ?Sized),
        runtime: Arc<dyn TargetRuntime>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, AgentError> {
        let registry = HookRegistry::resolve(resolver)?;
        debug!("Resolved {} hooks", registry.len());
        Ok(Self {
            registry,
            runtime,
            sink,
        })
    }

    /// Attach a probe to every hook matching `filter.direction`, then announce
    /// installation to the host.
    ///
    /// Returns the installed symbols in installation order. Calling this twice
    /// installs a second set of probes.
    pub fn install_hooks(
        &self,
        interceptor: &(impl Interceptor + ?Sized),
        filter: &Filter,
        should_decode: bool,
    ) -> Result<Vec<&'static str>, AgentError> {
        let matcher = ChannelMatcher::new(&filter.channel_pattern)?;
        let handler = Arc::new(CallHandler::new(
            Arc::clone(&self.runtime),
            Arc::clone(&self.sink),
            matcher,
            should_decode,
        ));

        let mut installed = Vec::new();
        for hook in self.registry.list_hooks(filter.direction) {
            let probe = Arc::new(HookProbe::new(hook.symbol_name, Arc::clone(&handler)));
            interceptor.attach(hook, probe)?;
            debug!("Attached {} at {:#x}", hook.symbol_name, hook.entry_address);
            installed.push(hook.symbol_name);
        }

        info!(
            "Installed {} hooks (direction: {}, pattern: {}, decode: {})",
            installed.len(),
            filter.direction,
            filter.channel_pattern,
            should_decode
        );
        self.sink.emit_hooks_installed();

        Ok(installed)
    }
}
