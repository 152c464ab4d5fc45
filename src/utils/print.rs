//! Helper macros for logging (console printing).
//!
//! Server-side messages carry a `(gid:replica)` prefix so interleaved output
//! from multiple groups in one process stays attributable. Prefix-less forms
//! exist for contexts outside any replica (e.g. the client clerk).

/// Log TRACE message, optionally with a `(gid:replica)` prefix.
///
/// Example:
/// ```no_run
/// pf_trace!(gid, me; "got {} to print", msg);
/// ```
#[macro_export]
macro_rules! pf_trace {
    ($gid:expr, $me:expr; $fmt_str:literal) => {
        log::trace!(concat!("({}:{}) ", $fmt_str), $gid, $me)
    };

    ($gid:expr, $me:expr; $fmt_str:literal, $($fmt_arg:tt)*) => {
        log::trace!(concat!("({}:{}) ", $fmt_str), $gid, $me, $($fmt_arg)*)
    };

    ($fmt_str:literal) => {
        log::trace!($fmt_str)
    };

    ($fmt_str:literal, $($fmt_arg:tt)*) => {
        log::trace!($fmt_str, $($fmt_arg)*)
    };
}

/// Log DEBUG message, optionally with a `(gid:replica)` prefix.
///
/// Example:
/// ```no_run
/// pf_debug!(gid, me; "got {} to print", msg);
/// ```
#[macro_export]
macro_rules! pf_debug {
    ($gid:expr, $me:expr; $fmt_str:literal) => {
        log::debug!(concat!("({}:{}) ", $fmt_str), $gid, $me)
    };

    ($gid:expr, $me:expr; $fmt_str:literal, $($fmt_arg:tt)*) => {
        log::debug!(concat!("({}:{}) ", $fmt_str), $gid, $me, $($fmt_arg)*)
    };

    ($fmt_str:literal) => {
        log::debug!($fmt_str)
    };

    ($fmt_str:literal, $($fmt_arg:tt)*) => {
        log::debug!($fmt_str, $($fmt_arg)*)
    };
}

/// Log INFO message, optionally with a `(gid:replica)` prefix.
///
/// Example:
/// ```no_run
/// pf_info!(gid, me; "got {} to print", msg);
/// ```
#[macro_export]
macro_rules! pf_info {
    ($gid:expr, $me:expr; $fmt_str:literal) => {
        log::info!(concat!("({}:{}) ", $fmt_str), $gid, $me)
    };

    ($gid:expr, $me:expr; $fmt_str:literal, $($fmt_arg:tt)*) => {
        log::info!(concat!("({}:{}) ", $fmt_str), $gid, $me, $($fmt_arg)*)
    };

    ($fmt_str:literal) => {
        log::info!($fmt_str)
    };

    ($fmt_str:literal, $($fmt_arg:tt)*) => {
        log::info!($fmt_str, $($fmt_arg)*)
    };
}

/// Log WARN message, optionally with a `(gid:replica)` prefix.
///
/// Example:
/// ```no_run
/// pf_warn!(gid, me; "got {} to print", msg);
/// ```
#[macro_export]
macro_rules! pf_warn {
    ($gid:expr, $me:expr; $fmt_str:literal) => {
        log::warn!(concat!("({}:{}) ", $fmt_str), $gid, $me)
    };

    ($gid:expr, $me:expr; $fmt_str:literal, $($fmt_arg:tt)*) => {
        log::warn!(concat!("({}:{}) ", $fmt_str), $gid, $me, $($fmt_arg)*)
    };

    ($fmt_str:literal) => {
        log::warn!($fmt_str)
    };

    ($fmt_str:literal, $($fmt_arg:tt)*) => {
        log::warn!($fmt_str, $($fmt_arg)*)
    };
}

/// Log ERROR message, optionally with a `(gid:replica)` prefix.
///
/// Example:
/// ```no_run
/// pf_error!(gid, me; "got {} to print", msg);
/// ```
#[macro_export]
macro_rules! pf_error {
    ($gid:expr, $me:expr; $fmt_str:literal) => {
        log::error!(concat!("({}:{}) ", $fmt_str), $gid, $me)
    };

    ($gid:expr, $me:expr; $fmt_str:literal, $($fmt_arg:tt)*) => {
        log::error!(concat!("({}:{}) ", $fmt_str), $gid, $me, $($fmt_arg)*)
    };

    ($fmt_str:literal) => {
        log::error!($fmt_str)
    };

    ($fmt_str:literal, $($fmt_arg:tt)*) => {
        log::error!($fmt_str, $($fmt_arg)*)
    };
}

/// Log an error string to logger and then return a `ShardsetError`
/// containing the string.
///
/// Example:
/// ```no_run
/// let e = logged_err!(gid, me; "got {} to print", msg);
/// ```
#[macro_export]
macro_rules! logged_err {
    ($gid:expr, $me:expr; $fmt_str:literal $(, $fmt_arg:expr)*) => {{
        pf_error!($gid, $me; $fmt_str $(, $fmt_arg)*);
        Err($crate::ShardsetError(format!(
            concat!("({}:{}) ", $fmt_str),
            $gid, $me $(, $fmt_arg)*
        )))
    }};

    ($fmt_str:literal $(, $fmt_arg:expr)*) => {{
        pf_error!($fmt_str $(, $fmt_arg)*);
        Err($crate::ShardsetError(format!($fmt_str $(, $fmt_arg)*)))
    }};
}
