//! Luhn mod N check characters.
//!
//! The classic base-10 Luhn algorithm generalised to any alphabet: walking the
//! payload right to left, digit values are weighted 2, 1, 2, ..., each product
//! is reduced to the sum of its base-N digits, and the check character is
//! whatever brings the total to a multiple of N.

use super::charset::BaseCharacterSet;
use crate::error::Error;
use serde::{Deserialize, Serialize};

/// Alphabet of the mod 30 validator: digits and upper-case letters without
/// the easily confused `B I O Q S Z`.
pub const MOD30_BASE: &str = "0123456789ACDEFGHJKLMNPRTUVWXY";

/// Alphabet of the mod 10 validator.
pub const MOD10_BASE: &str = "0123456789";

/// Computes the check character for `payload` over `base`.
///
/// # Errors
///
/// Returns [`Error::InvalidCharacter`] if `payload` contains a character
/// outside `base`, and [`Error::Config`] if `payload` is empty.
pub fn checksum(base: &BaseCharacterSet, payload: &str) -> crate::Result<char> {
    if payload.is_empty() {
        return Err(Error::Config("payload must not be empty".into()));
    }
    let n = base.radix();
    let mut factor = 2;
    let mut sum = 0;

    for c in payload.chars().rev() {
        let digit = base.digit(c).ok_or_else(|| Error::InvalidCharacter {
            character: c,
            base: base.to_string(),
        })?;
        let addend = factor * digit;
        sum += addend / n + addend % n;
        factor = if factor == 2 { 1 } else { 2 };
    }

    let check = (n - sum % n) % n;
    base.char_at(check).ok_or_else(|| Error::Config(format!("check digit {check} out of range")))
}

/// Returns `true` if the last character of `identifier` is the check
/// character of everything before it.
///
/// Identifiers shorter than two characters, or containing characters outside
/// `base`, are invalid.
#[must_use]
pub fn is_valid(base: &BaseCharacterSet, identifier: &str) -> bool {
    let mut chars = identifier.chars();
    let Some(check) = chars.next_back() else {
        return false;
    };
    let payload = chars.as_str();
    !payload.is_empty() && checksum(base, payload).is_ok_and(|expected| expected == check)
}

/// A Luhn mod N validator bound to one alphabet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LuhnModNValidator {
    base: BaseCharacterSet,
}

impl LuhnModNValidator {
    pub fn new(base: BaseCharacterSet) -> Self {
        Self { base }
    }

    /// The mod 30 validator.
    ///
    /// # Errors
    ///
    /// Never fails in practice; [`MOD30_BASE`] is a valid alphabet.
    pub fn mod30() -> crate::Result<Self> {
        Ok(Self::new(BaseCharacterSet::new(MOD30_BASE)?))
    }

    /// The decimal validator.
    ///
    /// # Errors
    ///
    /// Never fails in practice; [`MOD10_BASE`] is a valid alphabet.
    pub fn mod10() -> crate::Result<Self> {
        Ok(Self::new(BaseCharacterSet::new(MOD10_BASE)?))
    }

    #[must_use]
    pub fn base_characters(&self) -> &BaseCharacterSet {
        &self.base
    }

    /// # Errors
    ///
    /// See [`checksum`].
    pub fn check_character(&self, payload: &str) -> crate::Result<char> {
        checksum(&self.base, payload)
    }

    /// `payload` followed by its check character.
    ///
    /// # Errors
    ///
    /// See [`checksum`].
    pub fn valid_identifier(&self, payload: &str) -> crate::Result<String> {
        let check = self.check_character(payload)?;
        let mut out = String::with_capacity(payload.len() + check.len_utf8());
        out.push_str(payload);
        out.push(check);
        Ok(out)
    }

    #[must_use]
    pub fn is_valid(&self, identifier: &str) -> bool {
        is_valid(&self.base, identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decimal() -> BaseCharacterSet {
        BaseCharacterSet::new(MOD10_BASE).unwrap()
    }

    #[test]
    fn test_classic_luhn() {
        assert_eq!(checksum(&decimal(), "7992739871").unwrap(), '3');
        assert!(is_valid(&decimal(), "79927398713"));
        assert!(!is_valid(&decimal(), "79927398710"));
    }

    #[test]
    fn test_known_card_number() {
        assert!(is_valid(&decimal(), "4539578763621486"));
    }

    #[test]
    fn test_mod30_round_trip() {
        let validator = LuhnModNValidator::mod30().unwrap();
        for payload in ["0", "M1", "M4E", "100000", "YYYYYY", "ACDE0123"] {
            let id = validator.valid_identifier(payload).unwrap();
            assert!(validator.is_valid(&id), "{id} should validate");
        }
    }

    #[test]
    fn test_round_trip_every_two_digit_payload() {
        let base = BaseCharacterSet::new("0123456789ACDEFGHJKLMNPRTUVWXY").unwrap();
        for a in MOD30_BASE.chars() {
            for b in MOD30_BASE.chars() {
                let payload: String = [a, b].iter().collect();
                let check = checksum(&base, &payload).unwrap();
                assert!(is_valid(&base, &format!("{payload}{check}")));
            }
        }
    }

    #[test]
    fn test_single_substitution_is_detected() {
        let validator = LuhnModNValidator::mod30().unwrap();
        let id = validator.valid_identifier("M4E7").unwrap();
        let mut tampered: Vec<char> = id.chars().collect();
        tampered[2] = if tampered[2] == 'A' { 'C' } else { 'A' };
        let tampered: String = tampered.into_iter().collect();
        assert!(!validator.is_valid(&tampered));
    }

    #[test]
    fn test_foreign_character() {
        let err = checksum(&decimal(), "12A4").unwrap_err();
        assert!(matches!(err, Error::InvalidCharacter { character: 'A', .. }));
        assert!(!is_valid(&decimal(), "12A4"));
    }

    #[test]
    fn test_too_short_is_invalid() {
        assert!(!is_valid(&decimal(), ""));
        assert!(!is_valid(&decimal(), "0"));
    }

    #[test]
    fn test_empty_payload_has_no_check_character() {
        assert!(matches!(checksum(&decimal(), ""), Err(Error::Config(_))));
    }
}
