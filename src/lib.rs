pub mod analytics;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod generation;
pub mod handlers;
pub mod middleware;
pub mod migrations;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod runner;
pub mod version;
