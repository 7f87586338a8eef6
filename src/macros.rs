/// Writes a line to the given logger. Compiled out with the `no_logging`
/// feature.
#[cfg(not(feature = "no_logging"))]
macro_rules! log {
    ($logger:expr, $($arg:tt)*) => {{
        if let Some(w) = $logger.line_writer() {
            let _ = writeln!(w, $($arg)*);
        }
    }};
}
#[cfg(feature = "no_logging")]
macro_rules! log {
    ($logger:expr, $($arg:tt)*) => {{
        let _ = &$logger;
    }};
}

/// Debug printing that can be switched on per module by flipping the first
/// argument. Arguments are not evaluated when disabled.
macro_rules! enabled_debug_print {
    (false, $name:literal, $format:literal) => {};
    (false, $name:literal, $format:literal, $($args:expr),*) => {};
    (true, $name:literal, $format:literal) => {
        println!("[{}] {}", $name, $format)
    };
    (true, $name:literal, $format:literal, $($args:expr),*) => {
        println!("[{}] {}", $name, format!($format, $($args),*))
    };
}
