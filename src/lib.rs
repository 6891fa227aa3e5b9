pub mod api;
pub mod app;
pub mod audio;
pub mod config;
pub mod db;
pub mod global;
pub mod retrieval;
pub mod session;
pub mod synthesis;
pub mod transcription;
