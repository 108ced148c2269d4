//! TDS protocol and server product versions.

use core::fmt;

/// TDS protocol version as carried in LOGIN7 and LOGINACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TdsVersion(u32);

impl TdsVersion {
    /// TDS 7.0 (SQL Server 7.0).
    pub const V7_0: Self = Self(0x7000_0000);
    /// TDS 7.1 (SQL Server 2000).
    pub const V7_1: Self = Self(0x7100_0000);
    /// TDS 7.1 revision 1 (SQL Server 2000 SP1).
    pub const V7_1_REV1: Self = Self(0x7100_0001);
    /// TDS 7.2 (SQL Server 2005).
    pub const V7_2: Self = Self(0x7209_0002);
    /// TDS 7.3A (SQL Server 2008).
    pub const V7_3A: Self = Self(0x730A_0003);
    /// TDS 7.3B (SQL Server 2008 R2).
    pub const V7_3B: Self = Self(0x730B_0003);
    /// TDS 7.4 (SQL Server 2012 and later).
    pub const V7_4: Self = Self(0x7400_0004);

    /// Wrap a raw version value.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw version value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether DATE, TIME, DATETIME2 and DATETIMEOFFSET may appear on the wire.
    #[must_use]
    pub const fn supports_date_time_types(self) -> bool {
        self.0 >= Self::V7_3A.0
    }

    /// Whether column metadata carries a collation for character types.
    #[must_use]
    pub const fn has_collations(self) -> bool {
        self.0 >= Self::V7_1.0
    }

    /// Whether the SQL_BATCH request must start with ALL_HEADERS.
    #[must_use]
    pub const fn requires_all_headers(self) -> bool {
        self.0 >= Self::V7_2.0
    }

    /// Map the LOGINACK spellings of 7.0 and 7.1 to their LOGIN7 values.
    #[must_use]
    pub const fn normalize(self) -> Self {
        match self.0 {
            0x0700_0000 => Self::V7_0,
            0x0701_0000 => Self::V7_1,
            _ => self,
        }
    }

    /// Lower of two versions.
    #[must_use]
    pub const fn min(self, other: Self) -> Self {
        if self.0 <= other.0 { self } else { other }
    }

    /// Parse the `7.x` notation used in configuration files.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "7.0" | "70" => Some(Self::V7_0),
            "7.1" | "71" | "8.0" => Some(Self::V7_1),
            "7.2" | "72" => Some(Self::V7_2),
            "7.3" | "7.3a" | "73" => Some(Self::V7_3A),
            "7.3b" => Some(Self::V7_3B),
            "7.4" | "74" | "auto" => Some(Self::V7_4),
            _ => None,
        }
    }

    const fn minor(self) -> u8 {
        ((self.0 >> 24) & 0x0F) as u8
    }
}

impl Default for TdsVersion {
    fn default() -> Self {
        Self::V7_4
    }
}

impl fmt::Display for TdsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TDS 7.{}", self.minor())?;
        match self.0 {
            0x730A_0003 => f.write_str("A"),
            0x730B_0003 => f.write_str("B"),
            _ => Ok(()),
        }
    }
}

/// Server product version, e.g. `8.0.2039` for SQL Server 2000 SP4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ServerVersion {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
    /// Build number.
    pub build: u16,
}

impl ServerVersion {
    /// Decode the PRELOGIN form: big-endian `major.minor.build`.
    #[must_use]
    pub const fn from_prelogin(raw: u32) -> Self {
        Self {
            major: (raw >> 24) as u8,
            minor: (raw >> 16) as u8,
            build: raw as u16,
        }
    }

    /// Decode the LOGINACK form: `major, minor, build_hi, build_lo`.
    #[must_use]
    pub const fn from_login_ack(bytes: [u8; 4]) -> Self {
        Self {
            major: bytes[0],
            minor: bytes[1],
            build: u16::from_be_bytes([bytes[2], bytes[3]]),
        }
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_notation() {
        assert_eq!(TdsVersion::parse("7.1"), Some(TdsVersion::V7_1));
        assert_eq!(TdsVersion::parse(" 7.3B "), Some(TdsVersion::V7_3B));
        assert_eq!(TdsVersion::parse("auto"), Some(TdsVersion::V7_4));
        assert_eq!(TdsVersion::parse("5.0"), None);
    }

    #[test]
    fn test_feature_gates() {
        assert!(!TdsVersion::V7_0.has_collations());
        assert!(TdsVersion::V7_1.has_collations());
        assert!(!TdsVersion::V7_1.requires_all_headers());
        assert!(TdsVersion::V7_2.requires_all_headers());
        assert!(!TdsVersion::V7_2.supports_date_time_types());
        assert!(TdsVersion::V7_4.supports_date_time_types());
    }

    #[test]
    fn test_normalize_legacy_login_ack_versions() {
        assert_eq!(TdsVersion::new(0x0700_0000).normalize(), TdsVersion::V7_0);
        assert_eq!(TdsVersion::new(0x0701_0000).normalize(), TdsVersion::V7_1);
        assert_eq!(TdsVersion::V7_4.normalize(), TdsVersion::V7_4);
    }

    #[test]
    fn test_min_and_display() {
        assert_eq!(TdsVersion::V7_4.min(TdsVersion::V7_1), TdsVersion::V7_1);
        assert_eq!(TdsVersion::V7_3A.to_string(), "TDS 7.3A");
        assert_eq!(TdsVersion::V7_2.to_string(), "TDS 7.2");
    }

    #[test]
    fn test_server_version_forms() {
        assert_eq!(
            ServerVersion::from_prelogin(0x0800_07F7).to_string(),
            "8.0.2039"
        );
        assert_eq!(
            ServerVersion::from_login_ack([16, 0, 0x10, 0x00]).to_string(),
            "16.0.4096"
        );
    }
}
