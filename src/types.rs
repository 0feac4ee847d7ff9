//! Mapping from cluster column type names to toolkit type tags.
//!
//! The cluster reports column types as Java class names. Names missing from
//! the table resolve to [`SqlType::UserDefined`] so newer server types keep
//! reflecting instead of failing.

use serde::Serialize;
use std::fmt;

/// Generic SQL type tag understood by toolkit layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SqlType {
    Binary,
    Boolean,
    TinyInt,
    /// `yyyy-MM-dd`
    Date,
    Decimal,
    Float,
    Integer,
    BigInt,
    SmallInt,
    String,
    /// `hh:mm:ss`
    Time,
    /// `yyyy-MM-dd hh:mm:ss[.nnnnnnnnn]`
    Timestamp,
    /// Not known to this client.
    UserDefined,
}

/// Every known remote type name and its tag.
///
/// Spatial types are not mapped.
pub const TYPE_MAP: &[(&str, SqlType)] = &[
    ("byte[]", SqlType::Binary),
    ("java.lang.Boolean", SqlType::Boolean),
    ("java.lang.Byte", SqlType::TinyInt),
    ("java.sql.Date", SqlType::Date),
    // Doubles reflect as DECIMAL, not FLOAT.
    ("java.lang.Double", SqlType::Decimal),
    ("java.math.BigDecimal", SqlType::Decimal),
    ("java.lang.Float", SqlType::Float),
    ("java.lang.Integer", SqlType::Integer),
    ("java.lang.Long", SqlType::BigInt),
    ("java.lang.Short", SqlType::SmallInt),
    ("java.lang.String", SqlType::String),
    ("java.sql.Time", SqlType::Time),
    ("java.sql.Timestamp", SqlType::Timestamp),
];

/// Resolve a remote type name through [`TYPE_MAP`].
pub fn resolve_type(remote: &str) -> SqlType {
    TYPE_MAP
        .iter()
        .find(|(name, _)| *name == remote)
        .map_or(SqlType::UserDefined, |(_, tag)| *tag)
}

impl SqlType {
    /// SQL spelling of the tag.
    pub fn sql_name(&self) -> &'static str {
        match self {
            SqlType::Binary => "BINARY",
            SqlType::Boolean => "BOOLEAN",
            SqlType::TinyInt => "TINYINT",
            SqlType::Date => "DATE",
            SqlType::Decimal => "DECIMAL",
            SqlType::Float => "FLOAT",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::SmallInt => "SMALLINT",
            SqlType::String => "VARCHAR",
            SqlType::Time => "TIME",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::UserDefined => "USER_DEFINED",
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_types() {
        assert_eq!(resolve_type("java.lang.Long"), SqlType::BigInt);
        assert_eq!(resolve_type("java.lang.Double"), SqlType::Decimal);
        assert_eq!(resolve_type("java.math.BigDecimal"), SqlType::Decimal);
        assert_eq!(resolve_type("byte[]"), SqlType::Binary);
        assert_eq!(resolve_type("java.sql.Timestamp"), SqlType::Timestamp);
    }

    #[test]
    fn test_unknown_type_is_user_defined() {
        assert_eq!(resolve_type("org.locationtech.jts.geom.Geometry"), SqlType::UserDefined);
        assert_eq!(resolve_type(""), SqlType::UserDefined);
        assert_eq!(resolve_type("JAVA.LANG.STRING"), SqlType::UserDefined);
    }

    #[test]
    fn test_sql_name() {
        assert_eq!(resolve_type("java.lang.Long").to_string(), "BIGINT");
        assert_eq!(SqlType::String.sql_name(), "VARCHAR");
    }
}
