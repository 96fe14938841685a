//! Operation callback table
//!
//! Maps each wire operation to its handler. The table is built once when
//! the coordinator starts and is never mutated afterwards, so lookups need
//! no lock. Handlers are plain function values owned by the table; nothing
//! holds a reference back into a session.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;

use tether_core::{OperationCode, SignalMessage};

use crate::error::{Result, SignalingError};
use crate::session::Session;

/// Handler invoked for one decoded signaling operation. The state check and
/// any engine work happen inside the handler, serialized by the session's
/// dispatch queue.
pub type SignalHandler =
    Arc<dyn Fn(Arc<Session>, SignalMessage) -> BoxFuture<'static, Result<()>> + Send + Sync>;

#[derive(Default)]
pub struct CallbackTable {
    handlers: HashMap<OperationCode, SignalHandler>,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for one operation. A second registration for
    /// the same code is refused; overwriting a handler is always a bug.
    pub fn add_callback(&mut self, op: OperationCode, handler: SignalHandler) -> Result<()> {
        if self.handlers.contains_key(&op) {
            return Err(SignalingError::HandlerExists(op));
        }
        self.handlers.insert(op, handler);
        Ok(())
    }

    pub fn lookup(&self, op: OperationCode) -> Option<&SignalHandler> {
        self.handlers.get(&op)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_handler() -> SignalHandler {
        Arc::new(|_, _| Box::pin(async { Ok(()) }))
    }

    #[test]
    fn duplicate_registration_is_refused() {
        let mut table = CallbackTable::new();
        table
            .add_callback(OperationCode::Ping, noop_handler())
            .unwrap();

        let err = table
            .add_callback(OperationCode::Ping, noop_handler())
            .unwrap_err();
        assert!(matches!(
            err,
            SignalingError::HandlerExists(OperationCode::Ping)
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn unregistered_codes_miss() {
        let mut table = CallbackTable::new();
        table
            .add_callback(OperationCode::Offer, noop_handler())
            .unwrap();
        assert!(table.lookup(OperationCode::Candidate).is_none());
        assert!(table.lookup(OperationCode::Offer).is_some());
    }
}
