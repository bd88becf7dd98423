pub mod cache;
pub mod device;
pub mod error;
pub mod fuzzy;
pub mod library;
pub mod player;
pub mod transport;
pub mod volume;
pub mod watcher;
pub mod xml;

pub use cache::CacheStore;
pub use device::Device;
pub use library::{FetchDone, Library};
pub use player::Player;
pub use transport::{HttpTransport, Transport};
pub use volume::VolumeRamp;
pub use watcher::StatusWatcher;
