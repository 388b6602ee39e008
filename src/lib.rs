pub mod chunk_store;
pub mod config;
pub mod constants;
pub mod effects;
pub mod engine;
pub mod error;
pub mod players;
pub mod proximity;
pub mod reveal;
pub mod rng;
pub mod server_protocol;
pub mod server_utils;
pub mod session;
pub mod timers;
pub mod types;
pub mod world;

pub use config::GameConfig;
pub use engine::GameEngine;
pub use error::{EngineError, Result};
