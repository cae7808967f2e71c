use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

/// The ordered alphabet an identifier is written in.
///
/// A character's position is its digit value, both for sequence encoding and
/// for checksums. Always at least two distinct characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BaseCharacterSet {
    chars: Vec<char>,
}

impl BaseCharacterSet {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `chars` has fewer than two characters or
    /// repeats one.
    pub fn new(chars: &str) -> crate::Result<Self> {
        let chars: Vec<char> = chars.chars().collect();
        if chars.len() < 2 {
            return Err(Error::Config(format!(
                "base character set needs at least two characters, got {}",
                chars.len()
            )));
        }

        let mut seen = HashSet::with_capacity(chars.len());
        if let Some(dup) = chars.iter().find(|c| !seen.insert(**c)) {
            return Err(Error::Config(format!(
                "base character set repeats '{dup}'"
            )));
        }
        Ok(Self { chars })
    }

    /// Number of characters, i.e. the radix.
    #[must_use]
    pub fn radix(&self) -> usize {
        self.chars.len()
    }

    /// Digit value of `c`.
    #[must_use]
    pub fn digit(&self, c: char) -> Option<usize> {
        self.chars.iter().position(|x| *x == c)
    }

    /// Character for a digit value.
    #[must_use]
    pub fn char_at(&self, digit: usize) -> Option<char> {
        self.chars.get(digit).copied()
    }

    /// The zero digit.
    #[must_use]
    pub fn first(&self) -> char {
        self.chars[0]
    }

    #[must_use]
    pub fn contains(&self, c: char) -> bool {
        self.chars.contains(&c)
    }

    /// Checks that every character of `value` belongs to this set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCharacter`] for the first foreign character.
    pub fn check(&self, value: &str) -> crate::Result<()> {
        match value.chars().find(|c| !self.contains(*c)) {
            Some(character) => Err(Error::InvalidCharacter {
                character,
                base: self.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Orders two encoded values by numeric magnitude: shorter first, then
    /// digit by digit. Characters outside the set sort last.
    #[must_use]
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        let key = |s: &str| -> Vec<usize> {
            s.chars()
                .map(|c| self.digit(c).unwrap_or(usize::MAX))
                .collect()
        };
        a.chars()
            .count()
            .cmp(&b.chars().count())
            .then_with(|| key(a).cmp(&key(b)))
    }
}

impl fmt::Display for BaseCharacterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.chars.iter().try_for_each(|c| write!(f, "{c}"))
    }
}

impl TryFrom<String> for BaseCharacterSet {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<BaseCharacterSet> for String {
    fn from(value: BaseCharacterSet) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digits_follow_position() {
        let base = BaseCharacterSet::new("0123456789ABCDEF").unwrap();
        assert_eq!(base.radix(), 16);
        assert_eq!(base.digit('A'), Some(10));
        assert_eq!(base.char_at(15), Some('F'));
        assert_eq!(base.digit('G'), None);
        assert_eq!(base.first(), '0');
    }

    #[test]
    fn test_rejects_empty_and_single() {
        assert!(matches!(BaseCharacterSet::new(""), Err(Error::Config(_))));
        assert!(matches!(BaseCharacterSet::new("0"), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_duplicates() {
        let err = BaseCharacterSet::new("01231").unwrap_err();
        assert!(err.to_string().contains("'1'"));
    }

    #[test]
    fn test_check_reports_foreign_character() {
        let base = BaseCharacterSet::new("0123456789").unwrap();
        assert!(base.check("0042").is_ok());
        assert!(matches!(
            base.check("00B2"),
            Err(Error::InvalidCharacter { character: 'B', .. })
        ));
    }

    #[test]
    fn test_compare_uses_base_order() {
        let base = BaseCharacterSet::new("ZYX").unwrap();
        assert_eq!(base.compare("Y", "X"), Ordering::Less);
        assert_eq!(base.compare("X", "YZ"), Ordering::Less);
        assert_eq!(base.compare("YX", "YX"), Ordering::Equal);
    }

    #[test]
    fn test_serde_as_string() {
        let base = BaseCharacterSet::new("0123456789").unwrap();
        let json = serde_json::to_string(&base).unwrap();
        assert_eq!(json, "\"0123456789\"");
        let back: BaseCharacterSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, base);
        assert!(serde_json::from_str::<BaseCharacterSet>("\"11\"").is_err());
    }
}
