//! Link quality scoring.

use std::net::IpAddr;
use std::time::Duration;

/// Confidence assigned to records that only a subnet probe has seen.
pub const PROBE_INITIAL_QUALITY: f64 = 0.3;

/// Map one round-trip sample onto the quality scale. `None` means unreachable.
pub fn bucket_latency(rtt: Option<Duration>) -> f64 {
    let Some(rtt) = rtt else {
        return 0.0;
    };
    match rtt.as_millis() {
        0..=49 => 1.0,
        50..=99 => 0.8,
        100..=199 => 0.6,
        200..=499 => 0.4,
        _ => 0.2,
    }
}

/// Exponential moving average weighted by `alpha` toward the newest sample.
/// The result is always within [0, 1], including for out-of-range inputs.
pub fn smooth(previous: f64, sample: f64, alpha: f64) -> f64 {
    let alpha = clamp_unit(alpha);
    clamp_unit(clamp_unit(previous) * (1.0 - alpha) + clamp_unit(sample) * alpha)
}

/// Initial confidence for a passively discovered peer, by address class.
pub fn initial_confidence(ip: IpAddr) -> f64 {
    if ip.is_loopback() {
        return 1.0;
    }
    match ip {
        IpAddr::V4(v4) if v4.is_private() => 0.8,
        IpAddr::V4(_) => 0.5,
        IpAddr::V6(_) => 0.7,
    }
}

pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}
