pub mod checkpoint;
pub mod components;
pub mod config;
pub mod model;
pub mod runtime;
pub mod sim;
pub mod sync;
pub mod transport;

#[cfg(test)]
mod test;
