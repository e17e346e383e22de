pub mod settings;

pub use settings::{PoolSettings, SettingsError};
