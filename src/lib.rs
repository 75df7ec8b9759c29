pub mod config;
pub mod embedding;
pub mod llm;
pub mod modules;
pub mod utils;
pub mod web;

pub use config::AppConfig;
pub use web::AppState;
