use ipnet::Ipv4Net;
use local_ip_address::list_afinet_netifas;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, info, warn};

/// Narrowest prefix the subnet prober will expand; wider subnets are clamped.
pub const MIN_SWEEP_PREFIX_LEN: u8 = 16;

/// Best physical LAN IPv4 address to advertise.
///
/// # Filtering rules
/// - Exclude loopback (127.*)
/// - Exclude link-local (169.254.*)
/// - Exclude tunnel interfaces (utun, tun, tap)
/// - Exclude Clash TUN addresses (198.18.0.0/15)
/// - Only keep private IPv4 addresses (10.*, 172.16-31.*, 192.168.*)
pub fn get_physical_lan_ip() -> Option<Ipv4Addr> {
    let ip = lan_ipv4_addrs().into_iter().next();
    match ip {
        Some(ip) => info!(ip = %ip, "detected physical LAN IP"),
        None => warn!("no suitable physical LAN IP found"),
    }
    ip
}

/// Every interface address that passes the physical LAN filter.
pub fn lan_ipv4_addrs() -> Vec<Ipv4Addr> {
    let interfaces = match list_afinet_netifas() {
        Ok(ifaces) => ifaces,
        Err(e) => {
            warn!(error = %e, "failed to enumerate network interfaces");
            return Vec::new();
        }
    };

    let mut addrs = Vec::new();
    for (iface_name, ip) in interfaces {
        let IpAddr::V4(v4) = ip else { continue };
        if v4.is_loopback() || v4.is_link_local() {
            continue;
        }
        if is_tunnel_interface(&iface_name) || is_clash_tun_address(v4) {
            debug!(ip = %v4, interface = %iface_name, "skipping virtual interface");
            continue;
        }
        if is_private_ipv4(v4) && !addrs.contains(&v4) {
            addrs.push(v4);
        }
    }
    addrs
}

/// All addresses bound to local interfaces, loopback included.
pub fn local_addresses() -> HashSet<IpAddr> {
    match list_afinet_netifas() {
        Ok(ifaces) => ifaces.into_iter().map(|(_, ip)| ip).collect(),
        Err(e) => {
            warn!(error = %e, "failed to enumerate network interfaces");
            HashSet::new()
        }
    }
}

/// Host addresses of the subnet enclosing `addr`, excluding network and
/// broadcast addresses.
pub fn subnet_hosts(addr: Ipv4Addr, prefix_len: u8) -> Vec<Ipv4Addr> {
    let prefix_len = prefix_len.clamp(MIN_SWEEP_PREFIX_LEN, 32);
    match Ipv4Net::new(addr, prefix_len) {
        Ok(net) => net.trunc().hosts().collect(),
        Err(e) => {
            warn!(ip = %addr, prefix_len, error = %e, "invalid subnet prefix");
            Vec::new()
        }
    }
}

fn is_tunnel_interface(name: &str) -> bool {
    name.contains("utun") || name.contains("tun") || name.contains("tap")
}

fn is_clash_tun_address(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    octets[0] == 198 && (octets[1] == 18 || octets[1] == 19)
}

fn is_private_ipv4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    match octets[0] {
        10 => true,
        172 => (16..=31).contains(&octets[1]),
        192 => octets[1] == 168,
        _ => false,
    }
}
