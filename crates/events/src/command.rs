use ledgerkit_core::AggregateId;

/// A command targets a specific aggregate.
///
/// Commands represent **intent** - a request to perform an action. They are
/// transient (not persisted) and are transformed into events (which are).
/// A rejected command produces no events; an accepted one produces facts.
///
/// `target_aggregate_id()` lets infrastructure route a command to the right
/// stream without inspecting the payload.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> AggregateId;
}
