pub mod azure;
pub mod fixture;

pub use azure::AzCliDiscovery;
pub use fixture::FixtureDiscovery;
