use crate::error::{ModuleError, Result};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque state passed back to the callback it was registered with
pub type AckState = Arc<dyn Any + Send + Sync>;

/// A one-shot acknowledgement callback together with its state
pub struct AckCallback {
    func: Box<dyn FnOnce(AckState) + Send>,
    state: AckState,
}

impl AckCallback {
    pub fn new<F>(state: AckState, func: F) -> Self
    where
        F: FnOnce(AckState) + Send + 'static,
    {
        Self {
            func: Box::new(func),
            state,
        }
    }

    /// A callback that carries no state of interest
    pub fn from_fn<F>(func: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(Arc::new(()), move |_| func())
    }

    /// Consumes the callback, handing its state back
    pub fn invoke(self) {
        (self.func)(self.state)
    }
}

impl fmt::Debug for AckCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckCallback").finish_non_exhaustive()
    }
}

/// The accepted/completed pair a stage owes its upstream caller for one batch.
///
/// Each callback carries an opaque state value that is handed back unchanged.
/// The receiving stage consumes the obligation exactly once, either directly or
/// through an [`AcceptHook`] fired when its own output has been accepted
/// downstream.
#[derive(Debug)]
pub struct Obligation {
    accepted: AckCallback,
    completed: AckCallback,
}

impl Obligation {
    pub fn new(accepted: AckCallback, completed: AckCallback) -> Self {
        Self {
            accepted,
            completed,
        }
    }

    /// Pairs the callbacks of a delivery. Both absent means no acknowledgement
    /// was requested; exactly one present is a caller contract violation.
    pub fn pair(
        accepted: Option<AckCallback>,
        completed: Option<AckCallback>,
    ) -> Result<Option<Self>> {
        match (accepted, completed) {
            (Some(accepted), Some(completed)) => Ok(Some(Self::new(accepted, completed))),
            (None, None) => Ok(None),
            (accepted, completed) => Err(ModuleError::UnpairedAcknowledgement {
                accepted: accepted.is_some(),
                completed: completed.is_some(),
            }),
        }
    }

    /// Invokes both callbacks, accepted first
    pub fn fulfil(self) {
        self.accepted.invoke();
        self.completed.invoke();
    }
}

/// Continuation the host fires once downstream has accepted a posted batch
pub struct AcceptHook(Box<dyn FnOnce() + Send>);

impl AcceptHook {
    pub fn new<F>(func: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(func))
    }

    pub fn accept(self) {
        (self.0)()
    }
}

impl fmt::Debug for AcceptHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcceptHook").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_state_is_passed_back_unchanged() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let callback = AckCallback::new(Arc::new(42u32), move |state| {
            *sink.lock() = state.downcast_ref::<u32>().copied();
        });
        callback.invoke();
        assert_eq!(*seen.lock(), Some(42));
    }

    #[test]
    fn test_pairing_rules() {
        assert!(Obligation::pair(None, None).unwrap().is_none());
        assert!(
            Obligation::pair(Some(AckCallback::from_fn(|| {})), Some(AckCallback::from_fn(|| {})))
                .unwrap()
                .is_some()
        );
        let err = Obligation::pair(Some(AckCallback::from_fn(|| {})), None).unwrap_err();
        assert!(matches!(
            err,
            ModuleError::UnpairedAcknowledgement {
                accepted: true,
                completed: false
            }
        ));
        assert!(Obligation::pair(None, Some(AckCallback::from_fn(|| {}))).is_err());
    }

    #[test]
    fn test_fulfil_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (a, c) = (Arc::clone(&order), Arc::clone(&order));
        let obligation = Obligation::new(
            AckCallback::from_fn(move || a.lock().push("accepted")),
            AckCallback::from_fn(move || c.lock().push("completed")),
        );
        obligation.fulfil();
        assert_eq!(*order.lock(), vec!["accepted", "completed"]);
    }
}
