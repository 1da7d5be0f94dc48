pub mod analytics;
pub mod health;
pub mod profile;
pub mod sessions;
