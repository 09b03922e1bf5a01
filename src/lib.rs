pub mod app;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod journal;
pub mod mirror;
pub mod models;
pub mod progress;
pub mod state;
pub mod stats;
pub mod storage;
pub mod sync;
pub mod ui;

pub use app::router;
pub use config::Config;
pub use mirror::{Mirror, RemoteMirror};
pub use state::{AppState, Dashboard};
pub use storage::KvStore;
