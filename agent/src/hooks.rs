//! Hook registry
//!
//! The fixed table of XPC entry points the agent can intercept, resolved once
//! against the target. A missing symbol is fatal: without every entry point the
//! agent would silently miss traffic.

use std::sync::Arc;

use tracing::debug;
use xpcspy_shared::types::filter::Direction;

use crate::error::AgentError;

/// Module exporting the public XPC entry points
pub const LIBXPC: &str = "libxpc.dylib";

/// Argument layout of an intercepted entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallingConvention {
    /// `(connection, message)`
    ConnectionMessage,
    /// `(connection, message, queue, handler)`
    ConnectionMessageReply,
}

impl CallingConvention {
    pub fn arg_count(self) -> usize {
        match self {
            CallingConvention::ConnectionMessage => 2,
            CallingConvention::ConnectionMessageReply => 4,
        }
    }
}

/// Where a symbol's address comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolSource {
    /// Public export of a module
    Export { module: &'static str },
    /// Private symbol found through debug symbols
    DebugSymbol,
}

/// Looks up symbol addresses in the target
pub trait SymbolResolver {
    fn find_export(&self, module: &str, name: &str) -> Option<u64>;
    fn find_debug_symbol(&self, name: &str) -> Option<u64>;

    fn resolve(&self, source: SymbolSource, name: &str) -> Option<u64> {
        match source {
            SymbolSource::Export { module } => self.find_export(module, name),
            SymbolSource::DebugSymbol => self.find_debug_symbol(name),
        }
    }
}

/// Logic run synchronously before an intercepted function body executes
pub trait Probe: Send + Sync {
    /// `args` are the raw argument registers of the intercepted call.
    fn on_enter(&self, args: &[u64]);
}

/// Function-interception primitive provided by the instrumentation host
pub trait Interceptor {
    fn attach(&self, hook: &HookDescriptor, probe: Arc<dyn Probe>) -> Result<(), AgentError>;
}

/// A resolved, interceptable entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookDescriptor {
    pub symbol_name: &'static str,
    pub entry_address: u64,
    pub calling_convention: CallingConvention,
    pub source: SymbolSource,
    /// `Outgoing` or `Incoming`, never `All`
    pub direction: Direction,
}

struct HookSpec {
    name: &'static str,
    source: SymbolSource,
    convention: CallingConvention,
    direction: Direction,
}

const EXPORT: SymbolSource = SymbolSource::Export { module: LIBXPC };

/// Outgoing sends first, then the incoming event handler.
static HOOK_TABLE: [HookSpec; 5] = [
    HookSpec {
        name: "xpc_connection_send_message",
        source: EXPORT,
        convention: CallingConvention::ConnectionMessage,
        direction: Direction::Outgoing,
    },
    HookSpec {
        name: "xpc_connection_send_message_with_reply",
        source: EXPORT,
        convention: CallingConvention::ConnectionMessageReply,
        direction: Direction::Outgoing,
    },
    HookSpec {
        name: "xpc_connection_send_message_with_reply_sync",
        source: EXPORT,
        convention: CallingConvention::ConnectionMessage,
        direction: Direction::Outgoing,
    },
    HookSpec {
        name: "xpc_connection_send_notification",
        source: EXPORT,
        convention: CallingConvention::ConnectionMessage,
        direction: Direction::Outgoing,
    },
    HookSpec {
        name: "_xpc_connection_call_event_handler",
        source: SymbolSource::DebugSymbol,
        convention: CallingConvention::ConnectionMessage,
        direction: Direction::Incoming,
    },
];

/// Symbol names in table order
pub fn hook_symbols() -> impl Iterator<Item = (&'static str, Direction)> {
    HOOK_TABLE.iter().map(|spec| (spec.name, spec.direction))
}

/// Symbols that would be installed for `direction`, in installation order,
/// without resolving anything.
pub fn planned_hooks(direction: Direction) -> Vec<(&'static str, Direction)> {
    installation_order(&HOOK_TABLE, direction, |spec| spec.direction)
        .into_iter()
        .map(|spec| (spec.name, spec.direction))
        .collect()
}

/// Outgoing entries before incoming ones, each kept in table order.
fn installation_order<T>(
    items: &[T],
    direction: Direction,
    direction_of: impl Fn(&T) -> Direction,
) -> Vec<&T> {
    let outgoing = items
        .iter()
        .filter(|item| direction_of(*item) == Direction::Outgoing && direction.includes_outgoing());
    let incoming = items
        .iter()
        .filter(|item| direction_of(*item) == Direction::Incoming && direction.includes_incoming());
    outgoing.chain(incoming).collect()
}

/// Resolved hook table; immutable once built
#[derive(Debug, Clone)]
pub struct HookRegistry {
    hooks: Vec<HookDescriptor>,
}

impl HookRegistry {
    /// Resolve every entry point, failing on the first missing symbol.
    pub fn resolve(resolver: &(impl SymbolResolver + ?Sized)) -> Result<Self, AgentError> {
        let hooks = HOOK_TABLE
            .iter()
            .map(|spec| -> Result<HookDescriptor, AgentError> {
                let entry_address = resolver
                    .resolve(spec.source, spec.name)
                    .ok_or(AgentError::UnresolvedSymbol { symbol: spec.name })?;
                debug!("Resolved {} at {:#x}", spec.name, entry_address);
                Ok(HookDescriptor {
                    symbol_name: spec.name,
                    entry_address,
                    calling_convention: spec.convention,
                    source: spec.source,
                    direction: spec.direction,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { hooks })
    }

    /// Descriptors applicable to `direction`, outgoing before incoming.
    pub fn list_hooks(&self, direction: Direction) -> Vec<&HookDescriptor> {
        installation_order(&self.hooks, direction, |h| h.direction)
    }

    pub fn get(&self, symbol_name: &str) -> Option<&HookDescriptor> {
        self.hooks.iter().find(|h| h.symbol_name == symbol_name)
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct TableResolver {
        exports: HashMap<String, u64>,
        debug: HashMap<String, u64>,
    }

    impl SymbolResolver for TableResolver {
        fn find_export(&self, module: &str, name: &str) -> Option<u64> {
            assert_eq!(module, LIBXPC);
            self.exports.get(name).copied()
        }

        fn find_debug_symbol(&self, name: &str) -> Option<u64> {
            self.debug.get(name).copied()
        }
    }

    fn full_resolver() -> TableResolver {
        let mut resolver = TableResolver::default();
        for (i, (name, direction)) in hook_symbols().enumerate() {
            let addr = 0x1000 + i as u64 * 0x100;
            match direction {
                Direction::Incoming => resolver.debug.insert(name.to_string(), addr),
                _ => resolver.exports.insert(name.to_string(), addr),
            };
        }
        resolver
    }

    fn names(hooks: &[&HookDescriptor]) -> Vec<&'static str> {
        hooks.iter().map(|h| h.symbol_name).collect()
    }

    #[test]
    fn test_list_by_direction() {
        let registry = HookRegistry::resolve(&full_resolver()).unwrap();
        assert_eq!(registry.len(), 5);

        let outgoing = registry.list_hooks(Direction::Outgoing);
        assert_eq!(
            names(&outgoing),
            vec![
                "xpc_connection_send_message",
                "xpc_connection_send_message_with_reply",
                "xpc_connection_send_message_with_reply_sync",
                "xpc_connection_send_notification",
            ]
        );

        let incoming = registry.list_hooks(Direction::Incoming);
        assert_eq!(names(&incoming), vec!["_xpc_connection_call_event_handler"]);

        let all = registry.list_hooks(Direction::All);
        assert_eq!(all.len(), 5);
        assert_eq!(all[4].symbol_name, "_xpc_connection_call_event_handler");
    }

    #[test]
    fn test_listing_is_deterministic() {
        let registry = HookRegistry::resolve(&full_resolver()).unwrap();
        assert_eq!(
            registry.list_hooks(Direction::All),
            registry.list_hooks(Direction::All)
        );
    }

    #[test]
    fn test_planned_hooks_follow_registry_order() {
        let registry = HookRegistry::resolve(&full_resolver()).unwrap();
        for direction in [Direction::All, Direction::Outgoing, Direction::Incoming] {
            let resolved: Vec<_> = registry
                .list_hooks(direction)
                .iter()
                .map(|h| (h.symbol_name, h.direction))
                .collect();
            assert_eq!(planned_hooks(direction), resolved);
        }
        assert_eq!(
            planned_hooks(Direction::Incoming),
            vec![("_xpc_connection_call_event_handler", Direction::Incoming)]
        );
    }

    #[test]
    fn test_missing_private_symbol_is_fatal() {
        let mut resolver = full_resolver();
        resolver.debug.clear();

        match HookRegistry::resolve(&resolver) {
            Err(AgentError::UnresolvedSymbol { symbol }) => {
                assert_eq!(symbol, "_xpc_connection_call_event_handler")
            }
            other => panic!("expected UnresolvedSymbol, got {:?}", other),
        }
    }

    #[test]
    fn test_descriptor_details() {
        let registry = HookRegistry::resolve(&full_resolver()).unwrap();
        let reply = registry.get("xpc_connection_send_message_with_reply").unwrap();
        assert_eq!(reply.calling_convention.arg_count(), 4);
        assert_eq!(reply.entry_address, 0x1100);
        assert_eq!(reply.source, SymbolSource::Export { module: LIBXPC });
    }
}
