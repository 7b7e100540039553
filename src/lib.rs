pub mod app;
pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod notify;
pub mod profile;
pub mod response;
pub mod state;
pub mod users;
