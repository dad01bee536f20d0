//! Custom macros for reducing code repetition in lowview

/// Log an error and continue execution (non-fatal error handling)
///
/// # Example
/// ```ignore
/// log_and_continue!(handle.dispose(), "remove scratch file");
/// ```
#[macro_export]
macro_rules! log_and_continue {
    ($expr:expr, $context:expr) => {
        if let Err(e) = $expr {
            log::warn!("Failed to {}: {}", $context, e);
        }
    };
}

/// Validate an enum-like string value
///
/// # Example
/// ```ignore
/// validate_enum!(sink, "spi", "preview", "null");
/// ```
#[macro_export]
macro_rules! validate_enum {
    ($value:expr, $($variant:expr),+) => {
        match $value {
            $($variant)|+ => Ok(()),
            _ => anyhow::bail!(
                "Invalid value: {} (expected one of: {})",
                $value,
                [$($variant),+].join(", ")
            ),
        }
    };
}

/// Bail out of config validation when a numeric setting is out of range
///
/// # Example
/// ```ignore
/// ensure_range!(self.queue.capacity, 1..=1024, "queue.capacity");
/// ```
#[macro_export]
macro_rules! ensure_range {
    ($value:expr, $range:expr, $name:expr) => {
        if !($range).contains(&$value) {
            anyhow::bail!("Invalid {}: {} (expected {:?})", $name, $value, $range);
        }
    };
}
