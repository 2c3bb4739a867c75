// ===============================
// src/tax.rs
// ===============================
//
// Capital-gains tax on unrealized P/L. Taxable accounts pay the flat
// statutory rate on gains (income 15.315% + resident 5%); NISA-family
// accounts are exempt. Losses are never taxed.
//

use crate::domain::AccountType;

pub const TAX_RATE: f64 = 0.20315;

/// Tax owed on `profit_loss`. Zero for losses and for exempt accounts.
pub fn calculate_tax(profit_loss: f64, account_type: AccountType) -> f64 {
    if profit_loss <= 0.0 || account_type.is_tax_exempt() {
        return 0.0;
    }
    profit_loss * TAX_RATE
}

/// Unrealized P/L of a position at the current price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfitLoss {
    pub amount: f64,
    /// Percent relative to the entry price.
    pub rate_pct: f64,
    pub tax: f64,
    pub after_tax: f64,
}

impl ProfitLoss {
    fn from_amount(amount: f64, rate_pct: f64, account_type: AccountType) -> Self {
        let tax = calculate_tax(amount, account_type);
        Self { amount, rate_pct, tax, after_tax: amount - tax }
    }

    /// Long position: gains when price rises above the acquisition price.
    pub fn long(price: f64, acquisition_price: f64, quantity: i64, account_type: AccountType) -> Option<Self> {
        if acquisition_price <= 0.0 {
            return None;
        }
        let amount = (price - acquisition_price) * quantity.unsigned_abs() as f64;
        let rate = (price - acquisition_price) / acquisition_price * 100.0;
        Some(Self::from_amount(amount, rate, account_type))
    }

    /// Short position: gains when price falls below the short price.
    pub fn short(price: f64, short_price: f64, quantity: i64, account_type: AccountType) -> Option<Self> {
        if short_price <= 0.0 {
            return None;
        }
        let amount = (short_price - price) * quantity.unsigned_abs() as f64;
        let rate = (short_price - price) / short_price * 100.0;
        Some(Self::from_amount(amount, rate, account_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    #[test]
    fn losses_and_zero_are_never_taxed() {
        for account in [AccountType::Tokutei, AccountType::Nisa, AccountType::OldNisa] {
            for x in [0.0, -0.01, -1.0, -250_000.0] {
                assert_eq!(calculate_tax(x, account), 0.0);
            }
        }
    }

    #[test]
    fn exempt_accounts_pay_nothing_on_gains() {
        for x in [0.01, 1.0, 20_000.0, 1e9] {
            assert_eq!(calculate_tax(x, AccountType::Nisa), 0.0);
            assert_eq!(calculate_tax(x, AccountType::OldNisa), 0.0);
        }
    }

    #[test]
    fn taxable_account_pays_flat_rate() {
        for x in [1.0, 20_000.0, 123_456.0] {
            assert!((calculate_tax(x, AccountType::Tokutei) - x * TAX_RATE).abs() < EPS);
        }
    }

    #[test]
    fn toyota_long_in_taxable_account() {
        let pnl = ProfitLoss::long(2700.0, 2500.0, 100, AccountType::Tokutei).unwrap();
        assert!((pnl.amount - 20_000.0).abs() < EPS);
        assert!((pnl.tax - 4063.0).abs() < EPS);
        assert!((pnl.after_tax - 15_937.0).abs() < EPS);
        assert!((pnl.rate_pct - 8.0).abs() < EPS);
    }

    #[test]
    fn toyota_long_in_nisa_is_tax_free() {
        let pnl = ProfitLoss::long(2700.0, 2500.0, 100, AccountType::Nisa).unwrap();
        assert_eq!(pnl.tax, 0.0);
        assert_eq!(pnl.after_tax, pnl.amount);
    }

    #[test]
    fn short_gains_when_price_falls() {
        let pnl = ProfitLoss::short(900.0, 1000.0, -50, AccountType::Tokutei).unwrap();
        assert!((pnl.amount - 5_000.0).abs() < EPS);
        assert!((pnl.rate_pct - 10.0).abs() < EPS);
        assert!(pnl.tax > 0.0);

        let loss = ProfitLoss::short(1100.0, 1000.0, -50, AccountType::Tokutei).unwrap();
        assert!(loss.amount < 0.0);
        assert_eq!(loss.tax, 0.0);
    }

    #[test]
    fn missing_entry_price_yields_none() {
        assert!(ProfitLoss::long(100.0, 0.0, 10, AccountType::Tokutei).is_none());
    }
}
