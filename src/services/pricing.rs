//! Derived financial fields of an order.
//!
//! Everything here is a pure function of the inputs; persistence is the
//! caller's responsibility.

use rust_decimal::Decimal;

use crate::entities::PaymentStatus;

/// Balance and payment status derived from `amount` and `advance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub balance_amount: Decimal,
    pub payment_status: PaymentStatus,
}

/// All derived fields of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub subtotal: Decimal,
    pub amount: Decimal,
    pub balance_amount: Decimal,
    pub payment_status: PaymentStatus,
}

/// Price and quantity of a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinePrice {
    pub price: Decimal,
    pub quantity: i32,
}

impl LinePrice {
    pub fn new(price: Decimal, quantity: i32) -> Self {
        Self { price, quantity }
    }

    pub fn total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// An unpriced order (`amount == 0`) is always pending, whatever was advanced.
pub fn payment_status(amount: Decimal, advance: Decimal) -> PaymentStatus {
    if amount <= Decimal::ZERO || advance <= Decimal::ZERO {
        PaymentStatus::Pending
    } else if advance >= amount {
        PaymentStatus::Paid
    } else {
        PaymentStatus::Partial
    }
}

/// Overpayment yields a negative balance, which is kept as-is.
pub fn settle(amount: Decimal, advance: Decimal) -> Settlement {
    Settlement {
        balance_amount: amount - advance,
        payment_status: payment_status(amount, advance),
    }
}

/// Recomputes every derived field.
///
/// With line items, `amount = Σ(price × quantity) − discount`. Without them the
/// caller-supplied `amount` is used verbatim and the discount is not applied.
pub fn compute_totals(
    lines: &[LinePrice],
    discount: Decimal,
    amount: Decimal,
    advance: Decimal,
) -> Totals {
    let (subtotal, amount) = if lines.is_empty() {
        (amount, amount)
    } else {
        let subtotal: Decimal = lines.iter().map(LinePrice::total).sum();
        (subtotal, subtotal - discount)
    };

    let settled = settle(amount, advance);
    Totals {
        subtotal,
        amount,
        balance_amount: settled.balance_amount,
        payment_status: settled.payment_status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn shirt_with_discount() {
        let totals = compute_totals(
            &[LinePrice::new(dec!(500), 1)],
            dec!(50),
            Decimal::ZERO,
            Decimal::ZERO,
        );
        assert_eq!(totals.subtotal, dec!(500));
        assert_eq!(totals.amount, dec!(450));
        assert_eq!(totals.balance_amount, dec!(450));
        assert_eq!(totals.payment_status, PaymentStatus::Pending);
    }

    #[test]
    fn multiple_lines_with_quantities() {
        let totals = compute_totals(
            &[LinePrice::new(dec!(300), 2), LinePrice::new(dec!(1200.50), 1)],
            Decimal::ZERO,
            Decimal::ZERO,
            dec!(1000),
        );
        assert_eq!(totals.amount, dec!(1800.50));
        assert_eq!(totals.balance_amount, dec!(800.50));
        assert_eq!(totals.payment_status, PaymentStatus::Partial);
    }

    #[test]
    fn single_item_mode_takes_amount_verbatim() {
        let totals = compute_totals(&[], dec!(100), dec!(750), dec!(750));
        assert_eq!(totals.amount, dec!(750));
        assert_eq!(totals.balance_amount, Decimal::ZERO);
        assert_eq!(totals.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn unpriced_order_is_never_paid() {
        assert_eq!(payment_status(Decimal::ZERO, dec!(200)), PaymentStatus::Pending);
        let s = settle(Decimal::ZERO, dec!(200));
        assert_eq!(s.balance_amount, dec!(-200));
    }

    #[test]
    fn overpayment_keeps_negative_balance() {
        let s = settle(dec!(450), dec!(500));
        assert_eq!(s.balance_amount, dec!(-50));
        assert_eq!(s.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn zero_priced_lines_stay_pending() {
        let totals = compute_totals(
            &[LinePrice::new(Decimal::ZERO, 3)],
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::ZERO,
        );
        assert_eq!(totals.amount, Decimal::ZERO);
        assert_eq!(totals.payment_status, PaymentStatus::Pending);
    }
}
