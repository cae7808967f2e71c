use super::charset::BaseCharacterSet;
use super::source::IdentifierSourceConfig;
use crate::error::Error;

/// Adds one to `value`, written in `base`, like an odometer.
///
/// Width is preserved unless every digit rolls over, in which case the value
/// grows by one character (`"99"` becomes `"100"` in base ten).
///
/// # Errors
///
/// Returns [`Error::InvalidCharacter`] if `value` contains a foreign character.
pub fn increment(base: &BaseCharacterSet, value: &str) -> crate::Result<String> {
    let mut digits = value
        .chars()
        .map(|c| {
            base.digit(c).ok_or_else(|| Error::InvalidCharacter {
                character: c,
                base: base.to_string(),
            })
        })
        .collect::<crate::Result<Vec<usize>>>()?;

    let radix = base.radix();
    let mut carry = true;
    for digit in digits.iter_mut().rev() {
        *digit += 1;
        if *digit == radix {
            *digit = 0;
        } else {
            carry = false;
            break;
        }
    }
    if carry {
        digits.insert(0, 1);
    }

    Ok(digits
        .into_iter()
        .filter_map(|d| base.char_at(d))
        .collect())
}

/// Left-pads `value` with the base's zero digit up to `min_length`.
#[must_use]
pub fn pad(base: &BaseCharacterSet, value: &str, min_length: Option<usize>) -> String {
    let len = value.chars().count();
    match min_length {
        Some(min) if len < min => {
            let mut out: String = std::iter::repeat(base.first()).take(min - len).collect();
            out.push_str(value);
            out
        }
        _ => value.to_owned(),
    }
}

/// Computes the value to issue after `last`, or the first value when nothing
/// has been issued yet.
///
/// # Errors
///
/// Returns [`Error::Capacity`] when the next value would be longer than the
/// source allows. Nothing wraps around, so once a source is exhausted every
/// later call fails the same way.
pub fn next_value(config: &IdentifierSourceConfig, last: Option<&str>) -> crate::Result<String> {
    let base = &config.base_character_set;
    let next = match last {
        None => pad(base, &config.first_value, config.min_length),
        Some(last) => pad(base, &increment(base, last)?, config.min_length),
    };

    let limit = config.length_limit();
    if next.chars().count() > limit {
        return Err(Error::Capacity {
            source_name: config.name.clone(),
            reason: format!("next value would exceed {limit} characters"),
        });
    }
    Ok(next)
}
