pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod model;
pub mod reconciler;
pub mod session;

#[cfg(test)]
mod tests;

pub use config::CONFIG;
