pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod interfaces;
pub mod models;
pub mod repositories;
pub mod services;
pub mod state;

#[cfg(test)]
mod test_support;
