//! Logging helpers for the bridge internals.
//!
//! User-visible failures go through [`crate::host::EditorHost::message`];
//! these macros are for internal diagnostics only.

/// Transforms a `Result` into an `Option` and logs the error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!(target: "bridge", "{:#}", e);
                None
            }
        }
    };
    ($res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!(target: "bridge", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}
