use std::{fmt::Display, ops::Deref};

use rust_decimal::Decimal;

// Decimal's own sign methods treat -0 as negative.
pub fn is_negative(d: &Decimal) -> bool {
    d.is_sign_negative() && !d.is_zero()
}

/// A price or strike, which brokers never report below zero.
/// Only created through ::try_from.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct GreaterEqualZeroDecimal(Decimal);

impl TryFrom<Decimal> for GreaterEqualZeroDecimal {
    type Error = String;

    fn try_from(d: Decimal) -> Result<Self, Self::Error> {
        if is_negative(&d) {
            Err(format!("{d} is negative"))
        } else {
            Ok(GreaterEqualZeroDecimal(d))
        }
    }
}

impl Deref for GreaterEqualZeroDecimal {
    type Target = Decimal;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for GreaterEqualZeroDecimal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Debug for GreaterEqualZeroDecimal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.0, f)
    }
}

#[macro_export]
macro_rules! gezdec {
    ($arg:literal) => {{
        use rust_decimal_macros::dec;
        $crate::util::decimal::GreaterEqualZeroDecimal::try_from(dec!($arg)).unwrap()
    }};
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use crate::util::decimal::{is_negative, GreaterEqualZeroDecimal};

    #[test]
    fn test_decimal_sign_sanity() {
        let mut neg_zero = dec!(0);
        neg_zero.set_sign_negative(true);
        assert_eq!(neg_zero.to_string(), "-0");
        // Stays sane
        assert!(!is_negative(&neg_zero));
        assert!(is_negative(&dec!(-0.01)));
        assert!(!is_negative(&dec!(48)));
    }

    #[test]
    fn test_greater_equal_zero() {
        for ok in [dec!(1), dec!(0), dec!(-0), dec!(8.5)] {
            let v = GreaterEqualZeroDecimal::try_from(ok).unwrap();
            assert_eq!(*v, ok);
            assert_eq!(v.to_string(), ok.to_string());
        }
        let err = GreaterEqualZeroDecimal::try_from(dec!(-1)).unwrap_err();
        assert_eq!(err, "-1 is negative");
        assert_eq!(*gezdec!(15.5), dec!(15.5));
    }
}
