pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;

#[cfg(test)]
pub(crate) mod test_support;
