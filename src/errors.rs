//! Error kinds and the installable error handler.
//!
//! A plain enum with a manual `fmt::Display` and `std::error::Error` impl,
//! rather than a derive-macro crate.

use std::fmt;
use std::sync::Mutex;

use lazy_static::lazy_static;

/// The kinds of errors the fluxmeter can raise.
#[derive(Debug, Clone, PartialEq)]
pub enum FluxmeterError {
    /// Non-positive kinetic energy or another caller-supplied value that
    /// cannot be physical.
    BadInput(String),
    /// A file (physics table, DEM, reference table, geomagnet coefficients)
    /// could not be opened or read.
    Io(String),
    /// A binary or text file was readable but its contents were internally
    /// inconsistent (header/body mismatch, wrong magic, short read).
    Format(String),
    /// An allocation or capacity-bound construction failed.
    Resource(String),
    /// A material name or physics-file setup was rejected by the transport
    /// driver.
    PhysicsSetup(String),
}

impl fmt::Display for FluxmeterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FluxmeterError::BadInput(msg) => write!(f, "bad input: {}", msg),
            FluxmeterError::Io(msg) => write!(f, "I/O error: {}", msg),
            FluxmeterError::Format(msg) => write!(f, "format error: {}", msg),
            FluxmeterError::Resource(msg) => write!(f, "resource error: {}", msg),
            FluxmeterError::PhysicsSetup(msg) => write!(f, "physics setup error: {}", msg),
        }
    }
}

impl std::error::Error for FluxmeterError {}

type Handler = dyn Fn(&FluxmeterError) + Send + Sync;

lazy_static! {
    static ref ERROR_HANDLER: Mutex<Option<Box<Handler>>> = Mutex::new(None);
}

/// Installs a process-global error handler, returning the previous one so it
/// can be restored later. `BadInput` and `PhysicsSetup` errors raised during
/// a `flux`/`intersect`/`grammage` call are routed here instead of returning
/// an `Err`; the call itself still yields a zero/sentinel result.
pub fn set_error_handler<F>(handler: F) -> Option<Box<Handler>>
where
    F: Fn(&FluxmeterError) + Send + Sync + 'static,
{
    let mut slot = ERROR_HANDLER.lock().unwrap();
    slot.replace(Box::new(handler))
}

/// Restores whatever handler was installed before, or clears it entirely.
pub fn restore_error_handler(previous: Option<Box<Handler>>) {
    let mut slot = ERROR_HANDLER.lock().unwrap();
    *slot = previous;
}

/// Removes any installed handler.
pub fn clear_error_handler() {
    let mut slot = ERROR_HANDLER.lock().unwrap();
    *slot = None;
}

/// Consults the installed handler, if any, and always logs at `error!`.
/// This is the single choke point every `BadInput`/`PhysicsSetup` signal in
/// the crate passes through, matching the design note that host errors
/// (transport driver, geometry-tracing library) should be redirected here
/// rather than through their own defaults.
pub fn signal(err: FluxmeterError) {
    log::error!("{}", err);
    let slot = ERROR_HANDLER.lock().unwrap();
    if let Some(handler) = slot.as_ref() {
        handler(&err);
    }
}
