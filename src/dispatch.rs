use crate::observer::Observation;
use std::collections::HashMap;
use std::fmt;

pub type Handler<'h> = Box<dyn FnMut(&Observation<'_>) + 'h>;

/// Handlers keyed by resource type name, kept in registration order.
#[derive(Default)]
pub struct Dispatch<'h> {
    handlers: HashMap<String, Vec<Handler<'h>>>,
}

impl<'h> Dispatch<'h> {
    pub fn register(&mut self, kind: impl Into<String>, handler: Handler<'h>) {
        self.handlers.entry(kind.into()).or_default().push(handler);
    }

    pub fn handler_count(&self, kind: &str) -> usize {
        self.handlers.get(kind).map_or(0, Vec::len)
    }

    /// Runs the handlers of the observation's type. Returns how many ran.
    pub fn dispatch(&mut self, observation: &Observation<'_>) -> usize {
        let Some(handlers) = self.handlers.get_mut(observation.resource_type().name()) else {
            return 0;
        };
        for handler in handlers.iter_mut() {
            handler(observation);
        }
        tracing::trace!(
            path = %observation.path().to_string_lossy(),
            handlers = handlers.len(),
            "dispatched observation"
        );
        handlers.len()
    }
}

impl fmt::Debug for Dispatch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.handlers.iter().map(|(kind, handlers)| (kind, handlers.len())))
            .finish()
    }
}
