use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// Position in the feed: the `(created_at, id)` of the last post returned.
///
/// Serialized as `"{rfc3339}_{uuid}"`. Clients treat it as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl FeedCursor {
    pub fn new(created_at: DateTime<Utc>, id: Uuid) -> Self {
        Self { created_at, id }
    }

    pub fn encode(&self) -> String {
        format!(
            "{}_{}",
            self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.id
        )
    }

    /// Returns `None` for anything malformed; callers fall back to the first page.
    pub fn decode(raw: &str) -> Option<Self> {
        let mut parts = raw.trim().split('_');
        let (Some(timestamp), Some(id), None) = (parts.next(), parts.next(), parts.next()) else {
            return None;
        };
        let created_at = parse_timestamp(timestamp)?;
        let id = Uuid::parse_str(id).ok()?;
        Some(Self { created_at, id })
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> FeedCursor {
        let created_at = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 15).unwrap()
            + chrono::Duration::microseconds(123_456);
        let id = Uuid::parse_str("6f1c1a52-3a3f-4f7e-9f57-1f0b2b8f0e11").unwrap();
        FeedCursor::new(created_at, id)
    }

    #[test]
    fn encode_uses_microsecond_utc_timestamp() {
        assert_eq!(
            sample().encode(),
            "2026-10-18T09:30:15.123456Z_6f1c1a52-3a3f-4f7e-9f57-1f0b2b8f0e11"
        );
    }

    #[test]
    fn decode_reads_encoded_cursor() {
        let cursor = sample();
        assert_eq!(FeedCursor::decode(&cursor.encode()), Some(cursor));
    }

    #[test]
    fn decode_accepts_explicit_offsets() {
        let raw = "2026-10-18T11:30:15.123456+02:00_6f1c1a52-3a3f-4f7e-9f57-1f0b2b8f0e11";
        let decoded = FeedCursor::decode(raw).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn decode_accepts_naive_timestamps_as_utc() {
        let decoded =
            FeedCursor::decode("2026-10-18T09:30:15.123456_6f1c1a52-3a3f-4f7e-9f57-1f0b2b8f0e11")
                .unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn decode_rejects_malformed_input() {
        assert_eq!(FeedCursor::decode(""), None);
        assert_eq!(FeedCursor::decode("garbage"), None);
        assert_eq!(FeedCursor::decode("2026-10-18T09:30:15Z"), None);
        assert_eq!(FeedCursor::decode("2026-10-18T09:30:15Z_not-a-uuid"), None);
        assert_eq!(
            FeedCursor::decode("yesterday_6f1c1a52-3a3f-4f7e-9f57-1f0b2b8f0e11"),
            None
        );
        assert_eq!(
            FeedCursor::decode("2026-10-18T09:30:15Z_6f1c1a52-3a3f-4f7e-9f57-1f0b2b8f0e11_extra"),
            None
        );
    }
}
