use crate::model::{RegionId, Week};

/// A (region, week) pair packed into one map key: `region << 8 | week`.
///
/// Injective for every `u32` region and every `u8` week, and ordered by
/// region first, then week. Only used in memory, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeekKey(u64);

impl WeekKey {
    pub fn encode(region: RegionId, week: Week) -> Self {
        Self(((region as u64) << 8) | week as u64)
    }

    pub fn decode(self) -> (RegionId, Week) {
        ((self.0 >> 8) as RegionId, (self.0 & 0xff) as Week)
    }

    pub fn region(self) -> RegionId {
        self.decode().0
    }

    pub fn week(self) -> Week {
        self.decode().1
    }
}

impl std::fmt::Display for WeekKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (region, week) = self.decode();
        write!(f, "{region}-{week}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn decode_inverts_encode() {
        for &region in &[1, 7, 255, 256, 65_537, u32::MAX] {
            for week in 1..=53 {
                assert_eq!(WeekKey::encode(region, week).decode(), (region, week));
            }
        }
    }

    #[test]
    fn no_collisions_in_supported_range() {
        let mut seen = HashSet::new();
        for region in 1..=300 {
            for week in 1..=53 {
                assert!(seen.insert(WeekKey::encode(region, week)));
            }
        }
    }

    #[test]
    fn orders_by_region_then_week() {
        assert!(WeekKey::encode(1, 53) < WeekKey::encode(2, 1));
        assert!(WeekKey::encode(3, 9) < WeekKey::encode(3, 10));
    }

    #[test]
    fn display_matches_grid_key() {
        assert_eq!(WeekKey::encode(3, 10).to_string(), "3-10");
    }
}
