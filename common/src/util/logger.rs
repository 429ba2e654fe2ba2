use env_logger::Env;

/// Initialize the process-wide logger. Call once, from the binary only.
/// `RUST_LOG` overrides the `info` default.
pub fn init() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .try_init();
}
