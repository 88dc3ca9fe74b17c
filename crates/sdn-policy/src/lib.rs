//! sdn-policy: the controller's policy engine
//!
//! Maps (switch, packet) to flow rules and synthesized replies:
//! - `directory`: host name → address / subnet
//! - `roles`: datapath id → Edge / Core / Datacenter
//! - `installer`: baseline rules and fire-and-forget installs
//! - `firewall`: core-switch block rules for the untrusted host
//! - `arp_proxy`: answers ARP requests on the core switch
//! - `controller`: per-switch sessions and event dispatch

pub mod arp_proxy;
pub mod controller;
pub mod directory;
pub mod error;
pub mod firewall;
pub mod installer;
pub mod roles;
pub mod session;
pub mod settings;

pub use arp_proxy::{ArpProxy, ProxyOutcome};
pub use controller::{start, EventSource, SwitchEventHandler, SwitchSessionController};
pub use directory::{AddressDirectory, Host};
pub use error::PolicyError;
pub use firewall::FirewallPolicy;
pub use roles::{Role, RoleResolver};
pub use session::{SessionState, SwitchSession};
pub use settings::{PolicyProfile, PolicySettings};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::controller::{start, EventSource, SwitchEventHandler, SwitchSessionController};
    pub use super::error::PolicyError;
    pub use super::roles::Role;
    pub use super::settings::{PolicyProfile, PolicySettings};
}
