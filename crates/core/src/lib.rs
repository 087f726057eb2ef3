pub mod bitset;
pub mod model;
pub mod profiles;
pub mod storage;
pub mod sync;
pub mod timeline;
pub mod viewer;

pub use profiles::ProfileStore;
pub use timeline::{TimelineEntry, TimelineIndex, VisibleItem};
pub use viewer::Viewer;
