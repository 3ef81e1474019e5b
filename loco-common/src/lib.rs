pub mod config;
pub mod db;
pub mod metrics;
pub mod model;
pub mod paging;
pub mod repo;
pub mod tracing;

/// Rendering of values that may be shown to API clients or written to
/// multi-tenant logs. Implementations must not leak credentials, connection
/// strings or other internal detail.
pub trait SafeDisplay {
    fn to_safe_string(&self) -> String;

    fn to_safe_string_indented(&self) -> String {
        self.to_safe_string()
            .lines()
            .map(|line| format!("  {line}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
