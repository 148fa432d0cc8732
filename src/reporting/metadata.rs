/// Build information stamped into every report.
pub fn tool_version() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) => format!("{} ({})", version, hash),
        None => version.to_string(),
    }
}

pub fn build_timestamp() -> &'static str {
    option_env!("BUILD_TIMESTAMP").unwrap_or("unknown")
}
