pub mod defaults;
pub mod env;

pub use defaults::{init_logging_defaults, init_tracing};
pub use env::{read_env_any, read_env_string};
