use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

/// Number of satoshis in one whole bitcoin.
pub const SATS_PER_BTC: i64 = 100_000_000;

//--------------------------------------       Sats        -----------------------------------------------------------
/// An amount of bitcoin expressed in whole satoshis.
///
/// All balances and transfer amounts in the system are integer satoshis; fractional bitcoin never
/// appears outside of display formatting and the one price conversion in the funding worker.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Sats(i64);

op!(binary Sats, Add, add);
op!(binary Sats, Sub, sub);
op!(inplace Sats, SubAssign, sub_assign);
op!(unary Sats, Neg, neg);

impl Mul<i64> for Sats {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Sats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in satoshis: {0}")]
pub struct SatsConversionError(String);

impl From<i64> for Sats {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Sats {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Sats {}

impl TryFrom<u64> for Sats {
    type Error = SatsConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(SatsConversionError(format!("Value {value} is too large to convert to Sats")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Sats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.abs() < 100_000 {
            write!(f, "{} sats", self.0)
        } else {
            let btc = self.0 as f64 / SATS_PER_BTC as f64;
            write!(f, "{btc:.8} BTC")
        }
    }
}

impl Sats {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn from_btc(btc: i64) -> Self {
        Self(btc * SATS_PER_BTC)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = Sats::from(149_253);
        let b = Sats::from(50_000);
        assert_eq!(a - b, Sats::from(99_253));
        assert_eq!(a + b, Sats::from(199_253));
        assert_eq!(-b, Sats::from(-50_000));
        let mut c = a;
        c -= b;
        assert_eq!(c, Sats::from(99_253));
        assert_eq!(vec![a, b].into_iter().sum::<Sats>(), Sats::from(199_253));
    }

    #[test]
    fn display_small_amounts_in_sats() {
        assert_eq!(Sats::from(546).to_string(), "546 sats");
        assert_eq!(Sats::from(0).to_string(), "0 sats");
    }

    #[test]
    fn display_large_amounts_in_btc() {
        assert_eq!(Sats::from_btc(1).to_string(), "1.00000000 BTC");
        assert_eq!(Sats::from(149_253).to_string(), "0.00149253 BTC");
    }

    #[test]
    fn u64_conversion_guards_overflow() {
        assert!(Sats::try_from(u64::MAX).is_err());
        assert_eq!(Sats::try_from(42u64).unwrap(), Sats::from(42));
    }
}
