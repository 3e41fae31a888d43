//! UDP command link: listener thread, outbound sender and backend registry

pub mod udp_link;
pub mod udp_listener;

pub use udp_link::{BackendRegistry, LinkStats, LinkStatsSnapshot, UdpLink, backend_registry};
pub use udp_listener::UdpListener;
