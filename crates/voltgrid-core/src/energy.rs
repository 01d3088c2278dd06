use fixed::types::I64F64;

/// Energy quantities are whole units. Every subtraction saturates at zero.
pub type Energy = u64;

/// Q64.64 fixed-point used for rationing ratios. Deterministic across
/// platforms, unlike a float ratio.
pub type Ratio = I64F64;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// `part / whole` as a [`Ratio`]. Returns `None` when `whole` is zero.
#[inline]
pub fn ratio(part: Energy, whole: Energy) -> Option<Ratio> {
    if whole == 0 {
        return None;
    }
    Ratio::saturating_from_num(part).checked_div(Ratio::saturating_from_num(whole))
}

/// `amount * part / whole`, rounded to the nearest whole unit with ties
/// rounding up. Computed exactly in 128-bit integers; saturates at
/// [`Energy::MAX`]. Returns zero when `whole` is zero.
#[inline]
pub fn share_rounded(amount: Energy, part: Energy, whole: Energy) -> Energy {
    if whole == 0 {
        return 0;
    }
    let whole = u128::from(whole);
    let scaled = u128::from(amount) * u128::from(part);
    let mut rounded = scaled / whole;
    if (scaled % whole) * 2 >= whole {
        rounded += 1;
    }
    Energy::try_from(rounded).unwrap_or(Energy::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_of_zero_whole_is_none() {
        assert!(ratio(5, 0).is_none());
    }

    #[test]
    fn ratio_is_exact_for_binary_fractions() {
        assert_eq!(ratio(9, 12), Some(Ratio::from_num(0.75)));
    }

    #[test]
    fn share_rounds_to_nearest() {
        assert_eq!(share_rounded(4, 9, 12), 3);
        assert_eq!(share_rounded(8, 9, 12), 6);
        // 10 * 1/3 = 3.33.. rounds down.
        assert_eq!(share_rounded(10, 1, 3), 3);
    }

    #[test]
    fn share_rounds_exact_halves_up() {
        // 3 * 5/6 = 2.5 and 7 * 9/14 = 4.5 have no exact binary fraction.
        assert_eq!(share_rounded(3, 5, 6), 3);
        assert_eq!(share_rounded(7, 9, 14), 5);
        assert_eq!(share_rounded(5, 1, 2), 3);
    }

    #[test]
    fn share_of_zero_whole_is_zero() {
        assert_eq!(share_rounded(5, 3, 0), 0);
    }

    #[test]
    fn share_handles_large_amounts() {
        assert_eq!(share_rounded(1 << 40, 1, 2), 1 << 39);
        assert_eq!(share_rounded(Energy::MAX, Energy::MAX, Energy::MAX), Energy::MAX);
        assert_eq!(share_rounded(Energy::MAX, 2, 1), Energy::MAX);
    }
}
