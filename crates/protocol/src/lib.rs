pub mod api;
pub mod series;
pub mod state;

pub use api::{ApiError, StateEnvelope};
pub use series::{ChannelRecord, SeriesManifest};
pub use state::{ProfileRecord, UserState};
