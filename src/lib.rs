pub mod cdn;
pub mod cli;
pub mod config;
pub mod error;
pub mod interactive;
pub mod pipeline;
pub mod rate_limiter;
pub mod remote;
pub mod scanner;
pub mod server;
pub mod session;
