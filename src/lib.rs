//! Library lending server
//!
//! REST JSON API for a small lending library: a book catalogue, its members,
//! and the lending and viewing workflow. Every request carries a signed bearer
//! token, and every operation passes through a role-based access guard.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
