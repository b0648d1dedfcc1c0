use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::Result;

/// Current UTC time.
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Formats a timestamp as RFC 3339, the form stored in object metadata.
pub fn format_rfc3339(at: OffsetDateTime) -> Result<String> {
    Ok(at.format(&Rfc3339)?)
}

/// Current UTC time as RFC 3339.
pub fn now_rfc3339() -> Result<String> {
    format_rfc3339(now_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_format_rfc3339() {
        let at = datetime!(2024-03-01 12:30:00 UTC);
        assert_eq!(format_rfc3339(at).unwrap(), "2024-03-01T12:30:00Z");
        assert!(now_rfc3339().is_ok());
    }
}
