//! Failure boundary around handler invocation.
//!
//! Handlers may return `Err` or panic. Neither escapes into the transport:
//! both become a 500 response, with the failure trace in the body only when
//! the router runs in debug mode. The failure is always logged server-side.
//!
//! Panic traces are recorded by a process-wide panic hook, installed on first
//! use, while the panicking frames are still on the stack. The hook chains to
//! the previously installed one.

use crate::message::{Request, Response};
use crate::router::Handler;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;
use tracing::error;

/// Body of a 500 response outside debug mode.
pub const INTERNAL_ERROR_BODY: &str = "500 Internal Server Error";

/// Where a handler panicked, captured inside the panic hook.
#[derive(Debug)]
struct PanicTrace {
    location: Option<String>,
    backtrace: Backtrace,
}

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
    static LAST_PANIC: RefCell<Option<PanicTrace>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CAPTURING.with(Cell::get) {
                let trace = PanicTrace {
                    location: info.location().map(ToString::to_string),
                    backtrace: Backtrace::force_capture(),
                };
                LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(trace));
            }
            previous(info);
        }));
    });
}

/// Run `handler` for `request`, converting failures into a 500 response.
pub fn invoke(handler: &Handler, request: &Request, debug: bool) -> Response {
    install_panic_hook();
    let outer = CAPTURING.with(|c| c.replace(true));
    LAST_PANIC.with(|slot| slot.borrow_mut().take());
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(request)));
    CAPTURING.with(|c| c.set(outer));

    match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => {
            let trace = format!("{err:?}");
            error!(
                method = %request.method,
                path = %request.path,
                error = %err,
                trace = %trace,
                "Handler returned an error"
            );
            failure_response(trace, debug)
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            let trace = LAST_PANIC.with(|slot| slot.borrow_mut().take());
            let (location, backtrace) = match trace {
                Some(trace) => (
                    trace.location.unwrap_or_else(|| "<unknown>".to_string()),
                    trace.backtrace,
                ),
                None => ("<unknown>".to_string(), Backtrace::force_capture()),
            };
            error!(
                method = %request.method,
                path = %request.path,
                panic_message = %message,
                location = %location,
                backtrace = %backtrace,
                "Handler panicked"
            );
            failure_response(
                format!("Handler panicked at {location}: {message}\n\n{backtrace}"),
                debug,
            )
        }
    }
}

fn failure_response(trace: String, debug: bool) -> Response {
    let body = if debug {
        trace
    } else {
        INTERNAL_ERROR_BODY.to_string()
    };
    Response::text(body).with_status(500)
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
