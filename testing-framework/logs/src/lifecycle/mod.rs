pub mod capture;
pub mod dump;
pub mod monitor;
pub mod pool;
pub mod stream;
