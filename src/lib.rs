pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod retry;
pub mod routes;
pub mod schedule;
pub mod services;
pub mod state;
