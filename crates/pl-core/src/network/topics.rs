use crate::ids::DeviceId;

/// Per-device publication topic: `<prefix>/<device_id>`.
pub fn device_topic(prefix: &str, id: &DeviceId) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), id)
}

/// Single-level wildcard subscription: `<prefix>/+`.
pub fn wildcard_topic(prefix: &str) -> String {
    format!("{}/+", prefix.trim_end_matches('/'))
}

pub fn device_id_from_topic(prefix: &str, topic: &str) -> Option<DeviceId> {
    let rest = topic.strip_prefix(prefix.trim_end_matches('/'))?;
    let id = rest.strip_prefix('/')?;
    if id.is_empty() || id.contains('/') {
        return None;
    }
    Some(DeviceId::new(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_device_and_wildcard_topics() {
        let id = DeviceId::new("abc");
        assert_eq!(device_topic("discovery", &id), "discovery/abc");
        assert_eq!(device_topic("discovery/", &id), "discovery/abc");
        assert_eq!(wildcard_topic("discovery"), "discovery/+");
    }

    #[test]
    fn extracts_id_from_single_level_topic() {
        assert_eq!(
            device_id_from_topic("discovery", "discovery/abc"),
            Some(DeviceId::new("abc"))
        );
        assert_eq!(device_id_from_topic("discovery", "discovery/a/b"), None);
        assert_eq!(device_id_from_topic("discovery", "other/abc"), None);
        assert_eq!(device_id_from_topic("discovery", "discovery/"), None);
    }
}
