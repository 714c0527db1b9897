//! SmartShopper: product comparison backend and the session-aware API client
//! that drives its front end.

pub mod app;
pub mod auth;
pub mod catalog;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod reviews;
pub mod state;
pub mod user;
