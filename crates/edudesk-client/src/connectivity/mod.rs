//! Connectivity monitoring: reachability probes, a debounced state machine
//! and the service loop that ties them to platform signals.

pub mod events;
pub mod monitor;
pub mod probe;
pub mod state;

pub use events::{ConnectivityEvent, ConnectivityEventBroadcaster};
pub use monitor::{ConnectivityMonitor, NetworkSignal};
pub use probe::{HttpProbe, ReachabilityProbe};
pub use state::{ConnectivityState, LinkState};
