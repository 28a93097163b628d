//! Pontos Server - PIX points purchase API
//!
//! This crate provides the REST API server for Pontos: users buy internal
//! points with real money through the Alfred PIX gateway, and the points
//! are credited once payment is confirmed via webhook push or status poll.

pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod repository;
pub mod routes;
pub mod services;
pub mod state;

pub use config::AppConfig;
pub use error::AppError;
pub use routes::create_router;
pub use state::AppState;
