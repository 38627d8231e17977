use chrono::NaiveDate;
use lodge_core::{CoreError, CoreResult};
use rust_decimal::Decimal;

/// Maximum accepted gap between a client's expected total and the computed one (0.01).
pub const PRICE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Whole nights between two calendar dates. Same-day or inverted stays are invalid.
pub fn nights(check_in: NaiveDate, check_out: NaiveDate) -> CoreResult<u32> {
    let days = (check_out - check_in).num_days();
    if days <= 0 {
        return Err(CoreError::InvalidDates);
    }
    u32::try_from(days).map_err(|_| CoreError::InvalidDates)
}


/// Result of pricing a stay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub nights: u32,
    pub total: Decimal,
}

/// Computes the authoritative total and checks it against what the client saw.
///
/// This catches stale client-side price caches between quote and booking. It
/// verifies consistency only; authenticity requires catalog-sourced prices.
#[derive(Debug, Clone)]
pub struct PriceReconciler {
    tolerance: Decimal,
}

impl Default for PriceReconciler {
    fn default() -> Self {
        Self {
            tolerance: PRICE_TOLERANCE,
        }
    }
}

impl PriceReconciler {
    /// `total = sum(price_per_night) * nights`. A missing or zero `expected`
    /// skips the comparison.
    pub fn reconcile(
        &self,
        check_in: NaiveDate,
        check_out: NaiveDate,
        prices_per_night: &[Decimal],
        expected: Option<Decimal>,
    ) -> CoreResult<Quote> {
        let nights = nights(check_in, check_out)?;
        let nights_dec = Decimal::from(nights);

        let total = prices_per_night
            .iter()
            .try_fold(Decimal::ZERO, |acc, price| {
                price.checked_mul(nights_dec).and_then(|room_total| acc.checked_add(room_total))
            })
            .ok_or_else(|| CoreError::Validation("total amount overflow".to_string()))?;

        if let Some(expected) = expected.filter(|e| !e.is_zero()) {
            if (total - expected).abs() > self.tolerance {
                return Err(CoreError::PriceChanged {
                    expected,
                    computed: total,
                });
            }
        }

        Ok(Quote { nights, total })
    }
}
