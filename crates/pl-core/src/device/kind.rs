use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};

/// Enumerated peer class advertised in presence payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceType {
    Desktop,
    Laptop,
    Mobile,
    Tablet,
    Server,
    Embedded,
    #[default]
    Unknown,
}

impl DeviceType {
    /// Lenient parse: unrecognised labels map to `Unknown` rather than failing,
    /// so a peer running a newer build is still discoverable.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "desktop" => DeviceType::Desktop,
            "laptop" => DeviceType::Laptop,
            "mobile" | "phone" => DeviceType::Mobile,
            "tablet" => DeviceType::Tablet,
            "server" => DeviceType::Server,
            "embedded" => DeviceType::Embedded,
            _ => DeviceType::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DeviceType::Desktop => "desktop",
            DeviceType::Laptop => "laptop",
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
            DeviceType::Server => "server",
            DeviceType::Embedded => "embedded",
            DeviceType::Unknown => "unknown",
        }
    }
}

impl Display for DeviceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for DeviceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for DeviceType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(DeviceType::from_label(&label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_labels_case_insensitively() {
        assert_eq!(DeviceType::from_label("Desktop"), DeviceType::Desktop);
        assert_eq!(DeviceType::from_label("PHONE"), DeviceType::Mobile);
    }

    #[test]
    fn unknown_labels_do_not_fail() {
        let parsed: DeviceType = serde_json::from_str("\"toaster\"").unwrap();
        assert_eq!(parsed, DeviceType::Unknown);
    }
}
