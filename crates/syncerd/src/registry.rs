//! Reporter and receiver registry
//!
//! Fixed-size table with one optional reporter and one optional receiver
//! per component, populated at startup by local subsystems.

use parking_lot::RwLock;
use statemesh_core::{ComponentId, SyncMessage, COMPONENT_COUNT};
use std::sync::Arc;

/// Local snapshot source for one component.
///
/// `snapshot` is called at most once per tick per peer stream. It must be
/// cheap and non-blocking; the store discards snapshots whose version does
/// not advance.
pub trait Reporter: Send + Sync {
    fn snapshot(&self) -> SyncMessage;
}

/// Local consumer of remote updates for one component.
///
/// Invoked once per accepted ingest. Must not block; errors are logged and
/// the update is not retried.
pub trait Receiver: Send + Sync {
    fn update(&self, message: &SyncMessage) -> anyhow::Result<()>;
}

#[derive(Clone, Default)]
struct Slot {
    reporter: Option<Arc<dyn Reporter>>,
    receiver: Option<Arc<dyn Receiver>>,
}

/// Per-component reporter/receiver table.
///
/// Re-registration atomically replaces both handles; an update already in
/// flight completes against whichever binding it loaded.
pub struct ComponentRegistry {
    slots: RwLock<[Slot; COMPONENT_COUNT]>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(std::array::from_fn(|_| Slot::default())),
        }
    }

    /// Bind a reporter and receiver to a component slot, replacing any
    /// previous binding
    pub fn register(
        &self,
        component_id: ComponentId,
        reporter: Option<Arc<dyn Reporter>>,
        receiver: Option<Arc<dyn Receiver>>,
    ) {
        let mut slots = self.slots.write();
        slots[component_id.index()] = Slot { reporter, receiver };
    }

    /// Reporter bound to a component, if any
    pub fn reporter(&self, component_id: ComponentId) -> Option<Arc<dyn Reporter>> {
        self.slots.read()[component_id.index()].reporter.clone()
    }

    /// Receiver bound to a component, if any
    pub fn receiver(&self, component_id: ComponentId) -> Option<Arc<dyn Receiver>> {
        self.slots.read()[component_id.index()].receiver.clone()
    }

    /// All bound reporters, in slot order
    pub fn reporters(&self) -> Vec<(ComponentId, Arc<dyn Reporter>)> {
        let slots = self.slots.read();
        ComponentId::ALL
            .into_iter()
            .filter_map(|id| slots[id.index()].reporter.clone().map(|r| (id, r)))
            .collect()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statemesh_core::NodeId;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingReporter {
        version: AtomicU64,
    }

    impl Reporter for CountingReporter {
        fn snapshot(&self) -> SyncMessage {
            SyncMessage {
                node_id: NodeId::from("local"),
                component_id: ComponentId::ResourceView,
                version: self.version.fetch_add(1, Ordering::SeqCst),
                payload: vec![],
            }
        }
    }

    struct NullReceiver;

    impl Receiver for NullReceiver {
        fn update(&self, _message: &SyncMessage) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_unset_slots_are_empty() {
        let registry = ComponentRegistry::new();
        for id in ComponentId::ALL {
            assert!(registry.reporter(id).is_none());
            assert!(registry.receiver(id).is_none());
        }
        assert!(registry.reporters().is_empty());
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ComponentRegistry::new();
        let reporter = Arc::new(CountingReporter {
            version: AtomicU64::new(1),
        });

        registry.register(
            ComponentId::ResourceView,
            Some(reporter),
            Some(Arc::new(NullReceiver)),
        );

        assert!(registry.reporter(ComponentId::ResourceView).is_some());
        assert!(registry.receiver(ComponentId::ResourceView).is_some());
        assert!(registry.reporter(ComponentId::Membership).is_none());
        assert_eq!(registry.reporters().len(), 1);
    }

    #[test]
    fn test_reregistration_replaces_both_handles() {
        let registry = ComponentRegistry::new();
        registry.register(
            ComponentId::ResourceView,
            Some(Arc::new(CountingReporter {
                version: AtomicU64::new(1),
            })),
            Some(Arc::new(NullReceiver)),
        );

        // Re-register with only a reporter; the receiver binding is dropped
        registry.register(
            ComponentId::ResourceView,
            Some(Arc::new(CountingReporter {
                version: AtomicU64::new(100),
            })),
            None,
        );

        let reporter = registry.reporter(ComponentId::ResourceView).unwrap();
        assert_eq!(reporter.snapshot().version, 100);
        assert!(registry.receiver(ComponentId::ResourceView).is_none());
    }
}
