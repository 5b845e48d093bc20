//! The `Driver` / `DriverFactory` capability.
//!
//! A driver is a handle to an automated web session: a scarce resource
//! owned by exactly one worker for the lifetime of that worker (spec
//! Glossary, §4.5, §9 "scoped driver acquisition"). The concrete browser
//! automation implementation is an external collaborator (spec §1); only
//! the trait boundary and an in-memory test double live here.

use async_trait::async_trait;
use std::fmt;

/// Opaque handle to an automated web session.
///
/// Intentionally empty: the core kernel never inspects a driver, it only
/// holds it for the duration of a worker's lifetime and passes it to the
/// [`crate::stage::StageProcessor`]. Concrete implementations attach
/// whatever browser/session state they need and release it in their
/// `Drop` impl.
pub trait Driver: Send + Sync {}

/// Error returned when a driver cannot be acquired (e.g. no browser slot
/// available, launch failure).
#[derive(Debug, thiserror::Error)]
#[error("failed to acquire driver: {0}")]
pub struct DriverError(pub String);

/// Produces fresh driver handles for worker loops.
///
/// Spec §4.5: "Launching a worker acquires a fresh driver; stopping
/// releases it. A driver handle is never shared between workers." Each
/// worker calls [`DriverFactory::acquire`] exactly once on entry and
/// drops the handle on every exit path (success, stop, panic-unwind via
/// `Drop`).
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Acquires a fresh, exclusively-owned driver handle.
    async fn acquire(&self) -> Result<Box<dyn Driver>, DriverError>;
}

impl fmt::Debug for dyn Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Driver(..)")
    }
}

/// A driver that does nothing -- used by tests and by [`crate::stage::ScriptedStageProcessor`].
#[derive(Debug, Default)]
pub struct NullDriver;

impl Driver for NullDriver {}

/// Always succeeds with a fresh [`NullDriver`]. Used by tests and by any
/// deployment that has not wired in a real browser-automation backend.
#[derive(Debug, Default)]
pub struct NullDriverFactory;

#[async_trait]
impl DriverFactory for NullDriverFactory {
    async fn acquire(&self) -> Result<Box<dyn Driver>, DriverError> {
        Ok(Box::new(NullDriver))
    }
}
