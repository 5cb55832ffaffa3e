//! C ABI entry points.
//!
//! Conventions shared by every function here:
//! - Input strings are NUL-terminated UTF-8 owned by the caller.
//! - Every returned `char*` is allocated by this library and must be released
//!   with [`describe_free_string`]. Never pass it to `free()`.
//! - Text results that represent failures start with
//!   [`BOUNDARY_ERROR_PREFIX`](crate::error::BOUNDARY_ERROR_PREFIX).
//! - `NULL` from a read means "no new content", which is distinct from an
//!   empty string.
//! - Session handle `0` means creation failed.
//! - Panics never unwind into the caller; they become the failure value.
//!
//! The engine is process-wide and installed once with [`install`]. Calls made
//! before installation fail with the conventions above.

use std::ffi::{CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::ptr;

use libc::{c_char, c_int, c_ulonglong};
use once_cell::sync::OnceCell;
use tracing::{debug, error, warn};

use crate::backend::DrainOptions;
use crate::drain::DrainRequest;
use crate::engine::DescribeEngine;
use crate::error::{DescribeError, DrainError, BOUNDARY_ERROR_PREFIX};
use crate::logging;
use crate::storage::StorageConfig;
use crate::types::{DescribeRequest, ResourceType, INVALID_SESSION_ID};

static ENGINE: OnceCell<DescribeEngine> = OnceCell::new();

/// Installs the process-wide engine. Returns the engine back if one is
/// already installed.
pub fn install(engine: DescribeEngine) -> Result<(), DescribeEngine> {
    ENGINE.set(engine)
}

fn engine() -> Result<&'static DescribeEngine, DescribeError> {
    ENGINE.get().ok_or(DescribeError::NotInstalled)
}

// ─────────────────────────────────────────────────────────────────────────────
// Marshalling
// ─────────────────────────────────────────────────────────────────────────────

struct BadArgument {
    name: &'static str,
    reason: String,
}

impl From<BadArgument> for DescribeError {
    fn from(arg: BadArgument) -> Self {
        DescribeError::InvalidArgument {
            name: arg.name,
            reason: arg.reason,
        }
    }
}

impl From<BadArgument> for DrainError {
    fn from(arg: BadArgument) -> Self {
        DrainError::InvalidArgument {
            name: arg.name,
            reason: arg.reason,
        }
    }
}

/// # Safety
/// `ptr` must be null or point to a NUL-terminated string valid for the call.
unsafe fn read_arg(ptr: *const c_char, name: &'static str) -> Result<String, BadArgument> {
    if ptr.is_null() {
        return Err(BadArgument {
            name,
            reason: "null pointer".to_string(),
        });
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(str::to_string)
        .map_err(|err| BadArgument {
            name,
            reason: err.to_string(),
        })
}

/// Hands `text` to the caller. Interior NULs cannot cross a C string and are dropped.
fn into_raw(text: String) -> *mut c_char {
    let text = if text.contains('\0') {
        let stripped = text.matches('\0').count();
        debug!(stripped, len = text.len(), "Stripping interior NULs from returned text");
        text.replace('\0', "")
    } else {
        text
    };
    CString::new(text).unwrap_or_default().into_raw()
}

fn panic_text() -> *mut c_char {
    into_raw(format!("{BOUNDARY_ERROR_PREFIX}internal panic"))
}

/// Runs `body`, converting a panic into `fallback()`.
fn guard<T>(call: &'static str, fallback: impl FnOnce() -> T, body: impl FnOnce() -> T) -> T {
    catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|_| {
        error!(call, "Panic caught at C boundary");
        fallback()
    })
}

/// # Safety
/// Every pointer must satisfy [`read_arg`]'s contract.
unsafe fn request_from_raw(
    group: *const c_char,
    version: *const c_char,
    resource: *const c_char,
    namespace: *const c_char,
    name: *const c_char,
    context: *const c_char,
) -> Result<DescribeRequest, DescribeError> {
    Ok(DescribeRequest {
        resource_type: ResourceType {
            group: read_arg(group, "group")?,
            version: read_arg(version, "version")?,
            resource: read_arg(resource, "resource")?,
        },
        namespace: read_arg(namespace, "namespace")?,
        name: read_arg(name, "name")?,
        context: read_arg(context, "context")?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Describe
// ─────────────────────────────────────────────────────────────────────────────

/// One-shot describe. Always returns text; failures carry the error prefix.
///
/// # Safety
/// All arguments must be null or valid NUL-terminated strings. The result must
/// be freed with [`describe_free_string`].
#[no_mangle]
pub unsafe extern "C" fn describe_resource(
    group: *const c_char,
    version: *const c_char,
    resource: *const c_char,
    namespace: *const c_char,
    name: *const c_char,
    context: *const c_char,
) -> *mut c_char {
    guard("describe_resource", panic_text, || {
        let text = request_from_raw(group, version, resource, namespace, name, context)
            .and_then(|request| engine().map(|engine| engine.describe_text(&request)))
            .unwrap_or_else(|err| err.to_boundary_text());
        into_raw(text)
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────────────────────────────────────

/// Starts an auto-refreshing session. Returns `0` on failure; callers wanting
/// the reason can retry with [`describe_resource`].
///
/// # Safety
/// All arguments must be null or valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn create_describe_session(
    group: *const c_char,
    version: *const c_char,
    resource: *const c_char,
    namespace: *const c_char,
    name: *const c_char,
    context: *const c_char,
) -> c_ulonglong {
    guard("create_describe_session", || INVALID_SESSION_ID, || {
        let result = request_from_raw(group, version, resource, namespace, name, context)
            .and_then(|request| engine()?.create_session(&request));
        match result {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, "Describe session creation failed");
                INVALID_SESSION_ID
            }
        }
    })
}

/// Takes the session's pending render, or returns `NULL` when there is none.
/// Unknown and closed handles return `NULL`.
#[no_mangle]
pub extern "C" fn describe_session_read(session_id: c_ulonglong) -> *mut c_char {
    guard("describe_session_read", ptr::null_mut, || {
        engine()
            .ok()
            .and_then(|engine| engine.read_session(session_id))
            .map_or(ptr::null_mut(), into_raw)
    })
}

/// `1` while the session is open, `0` once closed or unknown.
#[no_mangle]
pub extern "C" fn describe_session_is_open(session_id: c_ulonglong) -> c_int {
    guard("describe_session_is_open", || 0, || {
        let open = engine()
            .map(|engine| engine.session_is_open(session_id))
            .unwrap_or(false);
        c_int::from(open)
    })
}

/// Closes the session. Idempotent; unknown handles are ignored.
#[no_mangle]
pub extern "C" fn describe_session_close(session_id: c_ulonglong) {
    guard("describe_session_close", || (), || {
        if let Ok(engine) = engine() {
            engine.close_session(session_id);
        }
    })
}

/// JSON snapshot of a session, or `NULL` for unknown handles.
#[no_mangle]
pub extern "C" fn describe_session_info(session_id: c_ulonglong) -> *mut c_char {
    guard("describe_session_info", ptr::null_mut, || {
        engine()
            .ok()
            .and_then(|engine| engine.session_info(session_id))
            .and_then(|info| serde_json::to_string(&info).ok())
            .map_or(ptr::null_mut(), into_raw)
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Node Drain
// ─────────────────────────────────────────────────────────────────────────────

/// Cordons and drains a node, returning the transcript or error text.
///
/// Integer flags are booleans (non-zero = true). A negative grace period uses
/// each pod's own; a non-positive timeout waits forever.
///
/// # Safety
/// `node` and `context` must be null or valid NUL-terminated strings. The
/// result must be freed with [`describe_free_string`].
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn drain_node(
    node: *const c_char,
    context: *const c_char,
    grace_period_seconds: c_int,
    timeout_seconds: c_int,
    ignore_daemonsets: c_int,
    delete_emptydir_data: c_int,
    force: c_int,
    dry_run: c_int,
) -> *mut c_char {
    guard("drain_node", panic_text, || {
        let result = (|| -> Result<String, DrainError> {
            let request = DrainRequest {
                node: read_arg(node, "node")?,
                context: read_arg(context, "context")?,
                options: DrainOptions {
                    grace_period_seconds: i64::from(grace_period_seconds.max(-1)),
                    timeout_seconds: u64::try_from(timeout_seconds).unwrap_or(0),
                    ignore_daemonsets: ignore_daemonsets != 0,
                    delete_emptydir_data: delete_emptydir_data != 0,
                    force: force != 0,
                    dry_run: dry_run != 0,
                },
            };
            ENGINE
                .get()
                .ok_or(DrainError::NotInstalled)?
                .drain_node(&request)
        })();
        into_raw(result.unwrap_or_else(|err| err.to_boundary_text()))
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory & Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Releases a string returned by this library. `NULL` is ignored.
///
/// # Safety
/// `ptr` must be null or a pointer previously returned by this library and not
/// yet freed.
#[no_mangle]
pub unsafe extern "C" fn describe_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

/// Starts file logging under `log_dir` (or the default log dir when `NULL`).
/// Returns `1` on success, `0` on failure.
///
/// # Safety
/// `log_dir` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn describe_init_logging(log_dir: *const c_char) -> c_int {
    guard("describe_init_logging", || 0, || {
        let dir = if log_dir.is_null() {
            StorageConfig::default().log_dir()
        } else {
            match read_arg(log_dir, "log_dir") {
                Ok(dir) => PathBuf::from(dir),
                Err(_) => return 0,
            }
        };
        c_int::from(logging::init(&dir).is_ok())
    })
}
