// Library surface for the cli host and integration tests.
pub mod analytics;
pub mod app_dirs;
pub mod config;
pub mod error;
pub mod export;
pub mod persist;
pub mod runtime;
pub mod store;
pub mod timer;
pub mod util;

pub use error::{ExportError, PersistError, StoreError, ValidationError};
pub use store::{toggle_intents, transition, Intent, TimerStore};
pub use timer::{Goals, GoalsUpdate, Timer, TimerId, TimerState};
