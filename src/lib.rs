pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod journal;
pub mod presets;
pub mod server;
pub mod translate;

pub use backend::{Backend, Invoker};
pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use journal::SharedJournal;
pub use presets::InstancePreset;
pub use server::{build_router, AppState};
