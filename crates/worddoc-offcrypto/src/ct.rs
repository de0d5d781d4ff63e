use subtle::ConstantTimeEq;

/// Constant-time byte slice equality.
///
/// Used for password verifier/hash comparisons so that a wrong password cannot be
/// narrowed down through early-exit comparison timing.
pub(crate) fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    bool::from(a.ct_eq(b))
}
