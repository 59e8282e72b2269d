//! Discovery view: location, presence, proximity and match detection.

mod coordinator;
pub mod location;
mod matching;
mod presence;
mod proximity;

pub use coordinator::{
    Coordinator, DiscoveryDeps, DiscoverySettings, DiscoverySnapshot, Navigation, Phase,
    RefreshCycle, RefreshTrigger,
};
pub use location::{LocationConstraints, LocationSource, WatchHandle, locate, watch_location};
pub use matching::{MatchListener, VibeFeed, VibeSubscription};
pub use presence::PresencePublisher;
pub use proximity::ProximityClient;
