// ABOUTME: Local configuration for sx clusters: URIs, the profile store and aliases.
// ABOUTME: The profile store is the only writer of anything under the configuration root.

pub mod alias;
pub mod error;
pub mod state;
pub mod store;
pub mod uri;

pub use alias::{validate_alias_name, AliasIndex, AliasRegistry, AliasTarget};
pub use error::{ConfigError, Result};
pub use state::{ClusterState, ConnectionConfig};
pub use store::{default_root, DeleteOutcome, ProfileListing, ProfileStore, Profiles};
pub use uri::{parse_identifier, ClusterIdentifier, DEFAULT_PROFILE, SCHEME};
