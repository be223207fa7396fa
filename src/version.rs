const fn unwrap_or_cargo_version(opt: Option<&'static str>) -> &'static str {
    match opt {
        Some(val) => val,
        None => env!("CARGO_PKG_VERSION"),
    }
}

/// Build version; `LEASEWATCH_VERSION` at compile time overrides the package version.
pub const VERSION: &str = unwrap_or_cargo_version(option_env!("LEASEWATCH_VERSION"));
