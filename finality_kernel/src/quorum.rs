/// Finality kernel: Quorum Arithmetic
///
/// Integer only. No float. Rounding is toward zero.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default super-majority numerator.
pub const CORE_SUPER_MAJORITY_NUMERATOR: u64 = 2;

/// Default super-majority denominator.
pub const CORE_SUPER_MAJORITY_DENOMINATOR: u64 = 3;

/// Fixed super-majority fraction, validated on construction and on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawQuorumRatio", into = "RawQuorumRatio")]
pub struct QuorumRatio {
    numerator: u64,
    denominator: u64,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawQuorumRatio {
    numerator: u64,
    denominator: u64,
}

impl QuorumRatio {
    /// Accepts `numerator/denominator` in `(1/2, 1]`.
    pub fn new(numerator: u64, denominator: u64) -> Result<Self, CoreError> {
        let invalid = CoreError::InvalidQuorumRatio {
            numerator,
            denominator,
        };
        if numerator == 0 || denominator == 0 || numerator > denominator {
            return Err(invalid);
        }
        // 2n > d, widened so large ratios cannot wrap.
        if u128::from(numerator) * 2 <= u128::from(denominator) {
            return Err(invalid);
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    pub fn numerator(&self) -> u64 {
        self.numerator
    }

    pub fn denominator(&self) -> u64 {
        self.denominator
    }

    /// `floor(weight * numerator / denominator)`.
    pub fn quorum(&self, committee_weight: u64) -> u64 {
        quorum(committee_weight, self.numerator, self.denominator)
    }

    /// Whether `tally` reaches the quorum of `committee_weight`.
    pub fn is_reached(&self, tally: u64, committee_weight: u64) -> bool {
        tally >= self.quorum(committee_weight)
    }
}

impl Default for QuorumRatio {
    fn default() -> Self {
        Self {
            numerator: CORE_SUPER_MAJORITY_NUMERATOR,
            denominator: CORE_SUPER_MAJORITY_DENOMINATOR,
        }
    }
}

impl TryFrom<RawQuorumRatio> for QuorumRatio {
    type Error = CoreError;

    fn try_from(raw: RawQuorumRatio) -> Result<Self, Self::Error> {
        QuorumRatio::new(raw.numerator, raw.denominator)
    }
}

impl From<QuorumRatio> for RawQuorumRatio {
    fn from(ratio: QuorumRatio) -> Self {
        Self {
            numerator: ratio.numerator,
            denominator: ratio.denominator,
        }
    }
}

/// Minimum weighted vote count for a committee of `committee_weight`.
///
/// The product is taken in u128, so no input overflows. A zero
/// denominator yields 0 rather than dividing by zero; `QuorumRatio`
/// never holds one.
pub fn quorum(committee_weight: u64, numerator: u64, denominator: u64) -> u64 {
    let product = u128::from(committee_weight) * u128::from(numerator);
    let q = product.checked_div(u128::from(denominator)).unwrap_or(0);
    u64::try_from(q).unwrap_or(u64::MAX)
}

/// Checked weight addition.
pub fn checked_add(a: u64, b: u64, what: &'static str) -> Result<u64, CoreError> {
    a.checked_add(b).ok_or(CoreError::Overflow(what))
}
