use tracing_subscriber::{EnvFilter, fmt};

fn set_default_env(key: &str, value: &str) {
    if std::env::var_os(key).is_none() {
        // SAFETY: Used as an early-run default, before any thread is spawned.
        unsafe {
            std::env::set_var(key, value);
        }
    }
}

pub fn init_logging_defaults() {
    set_default_env("RUST_LOG", "info");
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
