pub mod config;
pub mod console;
pub mod error;
pub mod form;
pub mod models;
pub mod output;
pub mod service;
pub mod session;
pub mod sse;
pub mod state;
