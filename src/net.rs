//! Discovery of the coordinates this replica advertises.
//!
//! The advertised `host:port` must be reachable by clients, so loopback
//! addresses are never chosen. On hosts with several addresses per
//! interface the site-local one is preferred; failing that the first
//! non-loopback address wins, and as a last resort the OS-reported host
//! name is used. A missing interface is a hard error: advertising the
//! wrong coordinates is worse than refusing to start.

use std::net::{IpAddr, SocketAddr};

use snafu::{ResultExt, Snafu, ensure};
use tracing::debug;

/// Failure to derive the advertised coordinates.
#[derive(Debug, Snafu)]
pub enum NetError {
    /// The OS refused to enumerate network interfaces.
    #[snafu(display("cannot enumerate network interfaces: {source}"))]
    Enumerate {
        /// Underlying OS error.
        source: std::io::Error,
    },
    /// No interface with the requested name exists.
    #[snafu(display("network interface {name} not found"))]
    InterfaceNotFound {
        /// The requested interface name.
        name: String,
    },
}

/// Derive the `host:port` string advertised through the coordination
/// service, from the named interface and the configured port.
pub fn host_and_port(interface_name: &str, port: u16) -> Result<String, NetError> {
    let addrs = if_addrs::get_if_addrs().context(EnumerateSnafu)?;
    let on_iface: Vec<IpAddr> = addrs
        .iter()
        .filter(|iface| iface.name == interface_name)
        .map(|iface| iface.ip())
        .collect();
    ensure!(
        !on_iface.is_empty(),
        InterfaceNotFoundSnafu { name: interface_name }
    );

    match select_address(&on_iface) {
        Some(ip) => {
            debug!(interface = interface_name, %ip, "selected advertised address");
            Ok(SocketAddr::new(ip, port).to_string())
        }
        None => {
            // Interface exists but only holds loopback addresses.
            let host = gethostname::gethostname().to_string_lossy().into_owned();
            debug!(interface = interface_name, %host, "no non-loopback address, falling back to host name");
            Ok(format!("{host}:{port}"))
        }
    }
}

/// Pick the address to advertise: first site-local, else first
/// non-loopback (IPv4 or IPv6), else nothing.
fn select_address(addrs: &[IpAddr]) -> Option<IpAddr> {
    let mut candidate = None;
    for addr in addrs {
        if addr.is_loopback() {
            continue;
        }
        if let IpAddr::V4(v4) = addr {
            if v4.is_private() {
                return Some(*addr);
            }
        }
        if candidate.is_none() {
            candidate = Some(*addr);
        }
    }
    candidate
}
