use crate::models::Candle;

/// Restricts access to a bar series to the prefix ending at a given index.
///
/// Every indicator and signal computation downstream of the driver receives
/// only this prefix, so nothing can observe bars after the one currently
/// being simulated. Indicators are recomputed from the prefix on every entry
/// check; there is deliberately no cache of full-series results to leak from.
#[derive(Debug, Clone, Copy)]
pub struct PointInTime<'a> {
    bars: &'a [Candle],
}

impl<'a> PointInTime<'a> {
    pub fn new(bars: &'a [Candle]) -> Self {
        Self { bars }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// The bars visible at `index`: everything up to and including it.
    pub fn prefix(&self, index: usize) -> Option<&'a [Candle]> {
        if index < self.bars.len() {
            Some(&self.bars[..=index])
        } else {
            None
        }
    }

    pub fn bar(&self, index: usize) -> Option<&'a Candle> {
        self.bars.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn series(closes: &[f64]) -> Vec<Candle> {
        let base = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                symbol: "TST".to_string(),
                date: base + Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume_shares: 1_000,
            })
            .collect()
    }

    #[test]
    fn prefix_includes_current_bar_and_nothing_after() {
        let bars = series(&[1.0, 2.0, 3.0, 4.0]);
        let view = PointInTime::new(&bars);

        let prefix = view.prefix(2).unwrap();
        assert_eq!(prefix.len(), 3);
        assert_eq!(prefix.last().unwrap().close, 3.0);
        assert!(prefix.iter().all(|bar| bar.close <= 3.0));
    }

    #[test]
    fn out_of_range_index_yields_nothing() {
        let bars = series(&[1.0, 2.0]);
        let view = PointInTime::new(&bars);
        assert!(view.prefix(2).is_none());
        assert!(view.bar(5).is_none());
    }
}
