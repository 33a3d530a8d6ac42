/// Helper macro to log an event within a span that is not currently entered.
macro_rules! span_scoped {
    ($span:expr, $level:ident!($($arg:tt)*)) => {
        $span.in_scope(|| {
            ::tracing::$level!($($arg)*);
        })
    };
}

/// Helper macro to log a debug event within a span that is not currently
/// entered.
macro_rules! span_debug {
    ($span:expr, $($arg:tt)*) => {
        span_scoped!($span, debug!($($arg)*))
    };
}

/// Helper macro to log an error event within a span that is not currently
/// entered.
macro_rules! span_error {
    ($span:expr, $($arg:tt)*) => {
        span_scoped!($span, error!($($arg)*))
    };
}

/// Helper macro to unwrap an option or continue the loop with a tracing event.
macro_rules! opt_unwrap_or_continue {
    ($option:expr, $span:expr, $level:ident!($($arg:tt)*)) => {
        match $option {
            Some(value) => value,
            None => {
                span_scoped!($span, $level!($($arg)*));
                continue;
            }
        }
    };
}
