mod common;

mod config;
mod scheduler;
mod transport;
mod wire;
