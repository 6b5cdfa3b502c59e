// Public API for integration tests and potential library usage

pub mod actors;
pub mod api;
pub mod catalog;
pub mod decision;
pub mod embedding;
pub mod protocol;
pub mod scoring;
pub mod state;
pub mod store;
pub mod types;
pub mod words;
pub mod ws;
