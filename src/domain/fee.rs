use serde::{Deserialize, Serialize};

const BASIS_POINTS_PER_UNIT: i128 = 10_000;

/// A processing fee rate expressed in basis points (parts per 10,000).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeeRate(i64);

impl FeeRate {
    pub const ZERO: Self = Self(0);

    pub fn from_basis_points(basis_points: i64) -> Self {
        Self(basis_points)
    }

    /// Fee owed on `amount` minor units at this rate.
    pub fn fee_for(self, amount: i64) -> i64 {
        calculate_fee(amount, self.0)
    }
}

/// `floor(amount * basis_points / 10000 + 0.5)` computed in integers.
///
/// The half-up offset is folded into the numerator so the quotient can be floored
/// with `div_euclid`, which keeps negative (refund) amounts rounding the same way.
pub fn calculate_fee(amount: i64, basis_points: i64) -> i64 {
    let numerator =
        i128::from(amount) * i128::from(basis_points) * 2 + BASIS_POINTS_PER_UNIT;
    let fee = numerator.div_euclid(BASIS_POINTS_PER_UNIT * 2);
    i64::try_from(fee).unwrap_or(if fee < 0 { i64::MIN } else { i64::MAX })
}
