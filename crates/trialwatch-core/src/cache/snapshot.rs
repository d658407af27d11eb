use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cached value stamped with the time it was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    /// Coarse age for display, e.g. "5m ago". Future timestamps read as
    /// "just now".
    pub fn age_display(&self) -> String {
        let minutes = (Utc::now() - self.cached_at).num_minutes();
        match minutes {
            m if m < 1 => "just now".to_string(),
            m if m < 60 => format!("{}m ago", m),
            m if m < 24 * 60 => format!("{}h ago", m / 60),
            m => format!("{}d ago", m / (24 * 60)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn aged(minutes: i64) -> CachedData<Vec<u8>> {
        let mut cached = CachedData::new(vec![1]);
        cached.cached_at = Utc::now() - Duration::minutes(minutes);
        cached
    }

    #[test]
    fn test_age_display_just_now() {
        assert_eq!(CachedData::new(vec![1, 2, 3]).age_display(), "just now");
    }

    #[test]
    fn test_age_display_clock_skew() {
        assert_eq!(aged(-10).age_display(), "just now");
    }

    #[test]
    fn test_age_display_truncates_to_largest_unit() {
        assert_eq!(aged(5).age_display(), "5m ago");
        assert_eq!(aged(119).age_display(), "1h ago");
        assert_eq!(aged(1440 + 23 * 60).age_display(), "1d ago");
        assert_eq!(aged(3 * 1440).age_display(), "3d ago");
    }

    #[test]
    fn test_serde_round_trip() {
        let cached = CachedData::new(vec!["a".to_string()]);
        let json = serde_json::to_string(&cached).unwrap();
        let back: CachedData<Vec<String>> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.data, cached.data);
        assert_eq!(back.cached_at, cached.cached_at);
    }
}
