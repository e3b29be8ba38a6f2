pub mod clients;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod sync;

pub use state::AppState;
