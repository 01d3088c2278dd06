use serde::{Deserialize, Serialize};

/// Prefix of every network identifier's textual form.
pub const NETWORK_PREFIX: &str = "net-";

/// Marker prepended to the identifier of a network absorbed by a merge.
pub const MERGED_MARKER: &str = "merged:";

/// Identifies a power network. Cheap to copy and compare.
///
/// The textual form is `net-<serial>`. Once a network is merged away its
/// identifier gains the merged marker (`merged:net-<serial>`), and every
/// operation handed a marked identifier treats it as permanently retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NetworkId {
    serial: u64,
    merged: bool,
}

impl NetworkId {
    /// A live identifier with the given serial.
    pub const fn new(serial: u64) -> Self {
        Self {
            serial,
            merged: false,
        }
    }

    pub fn serial(self) -> u64 {
        self.serial
    }

    /// Whether this identifier belongs to a network retired by a merge.
    pub fn is_merged(self) -> bool {
        self.merged
    }

    /// The retired form of this identifier.
    pub fn into_merged(self) -> Self {
        Self {
            serial: self.serial,
            merged: true,
        }
    }

    /// The identifier the network carried before it was merged away.
    pub fn original(self) -> Self {
        Self::new(self.serial)
    }
}

impl std::fmt::Display for NetworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.merged {
            write!(f, "{MERGED_MARKER}{NETWORK_PREFIX}{}", self.serial)
        } else {
            write!(f, "{NETWORK_PREFIX}{}", self.serial)
        }
    }
}

/// Error returned when parsing a network identifier from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed network identifier '{0}'")]
pub struct ParseNetworkIdError(pub String);

impl std::str::FromStr for NetworkId {
    type Err = ParseNetworkIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (merged, rest) = match s.strip_prefix(MERGED_MARKER) {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let serial = rest
            .strip_prefix(NETWORK_PREFIX)
            .and_then(|digits| digits.parse::<u64>().ok())
            .ok_or_else(|| ParseNetworkIdError(s.to_string()))?;
        Ok(Self { serial, merged })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        let id = NetworkId::new(17);
        assert_eq!(id.to_string(), "net-17");
        assert_eq!(id.into_merged().to_string(), "merged:net-17");
    }

    #[test]
    fn merged_marker_is_detectable() {
        let id = NetworkId::new(3);
        assert!(!id.is_merged());
        let retired = id.into_merged();
        assert!(retired.is_merged());
        assert_ne!(id, retired);
        assert_eq!(retired.original(), id);
    }

    #[test]
    fn parse_accepts_both_forms() {
        assert_eq!("net-42".parse::<NetworkId>(), Ok(NetworkId::new(42)));
        assert_eq!(
            "merged:net-42".parse::<NetworkId>(),
            Ok(NetworkId::new(42).into_merged())
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("grid-1".parse::<NetworkId>().is_err());
        assert!("net-".parse::<NetworkId>().is_err());
        assert!("merged:".parse::<NetworkId>().is_err());
    }

    #[test]
    fn ids_are_hashable() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(NetworkId::new(0), "main");
        map.insert(NetworkId::new(1), "outpost");
        assert_eq!(map[&NetworkId::new(0)], "main");
    }
}
