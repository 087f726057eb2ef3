pub mod channel;
pub mod settings;

pub use channel::{Channel, ChannelDirectory};
pub use settings::{Settings, SettingsStore};
