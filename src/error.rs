// Broken invariants are reported, never panicked on: the client must outlive its own bugs.

#[macro_export]
macro_rules! internal_error_message {
    () => {
        format!("Internal error at {}:{}", file!(), line!())
    };
    ($($arg:tt)+) => {
        format!("Internal error at {}:{}: {}", file!(), line!(), format_args!($($arg)+))
    };
}

// Logs an internal error and evaluates to its message.
#[macro_export]
macro_rules! log_internal_error {
    ($($arg:tt)*) => {{
        let message = $crate::internal_error_message!($($arg)*);
        log::error!("{message}");
        message
    }};
}
