//! Integer-micros amounts.
//!
//! The ledger encodes decimals as strings (`"100.0"`, `"100.0000000000"`).
//! Everything that compares or orders money converts to `i64` micros first
//! (1 unit = 1_000_000 micros) so `"100"` and `"100.000000"` are the same
//! amount and ordering never goes through `f64`.
//!
//! | Direction            | Function             |
//! |----------------------|----------------------|
//! | wire string → micros | [`amount_to_micros`] |
//! | micros → wire string | [`micros_to_amount`] |

/// Scale factor: 1 unit = 1_000_000 micros (6 decimal places).
pub const MICROS_PER_UNIT: i64 = 1_000_000;

const SCALE_DIGITS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    /// Empty input or characters other than digits, one `.` and a leading `-`.
    Malformed(String),
    /// Non-zero digits beyond the sixth decimal place.
    TooPrecise(String),
    /// Does not fit in `i64` after scaling.
    OutOfRange(String),
}

impl std::fmt::Display for AmountError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AmountError::Malformed(s) => write!(f, "malformed amount '{s}'"),
            AmountError::TooPrecise(s) => {
                write!(f, "amount '{s}' has more than {SCALE_DIGITS} significant decimals")
            }
            AmountError::OutOfRange(s) => write!(f, "amount '{s}' out of range"),
        }
    }
}

impl std::error::Error for AmountError {}

/// Parse a decimal string into integer micros.
pub fn amount_to_micros(raw: &str) -> Result<i64, AmountError> {
    let s = raw.trim();
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };

    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, f),
        None => (body, ""),
    };

    let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
    if int_part.is_empty() || !all_digits(int_part) || !all_digits(frac_part) {
        return Err(AmountError::Malformed(raw.to_string()));
    }
    if body.ends_with('.') {
        return Err(AmountError::Malformed(raw.to_string()));
    }

    // Daml renders Numeric 10 with trailing zeros; only non-zero excess digits lose precision.
    let (kept, excess) = if frac_part.len() > SCALE_DIGITS {
        frac_part.split_at(SCALE_DIGITS)
    } else {
        (frac_part, "")
    };
    if excess.chars().any(|c| c != '0') {
        return Err(AmountError::TooPrecise(raw.to_string()));
    }

    let out_of_range = || AmountError::OutOfRange(raw.to_string());

    let whole: i64 = int_part.parse().map_err(|_| out_of_range())?;
    let mut frac: i64 = 0;
    for (i, c) in kept.chars().enumerate() {
        let digit = i64::from(c as u8 - b'0');
        frac += digit * 10_i64.pow((SCALE_DIGITS - 1 - i) as u32);
    }

    let micros = whole
        .checked_mul(MICROS_PER_UNIT)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(out_of_range)?;

    Ok(if negative { -micros } else { micros })
}

/// Render micros as the shortest decimal string with at least one fractional digit.
pub fn micros_to_amount(micros: i64) -> String {
    let sign = if micros < 0 { "-" } else { "" };
    let abs = micros.unsigned_abs();
    let whole = abs / MICROS_PER_UNIT as u64;
    let frac = abs % MICROS_PER_UNIT as u64;

    let mut frac_s = format!("{frac:06}");
    while frac_s.len() > 1 && frac_s.ends_with('0') {
        frac_s.pop();
    }
    format!("{sign}{whole}.{frac_s}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_and_fractional_forms_agree() {
        assert_eq!(amount_to_micros("100").unwrap(), 100 * MICROS_PER_UNIT);
        assert_eq!(amount_to_micros("100.0").unwrap(), 100 * MICROS_PER_UNIT);
        assert_eq!(
            amount_to_micros("100.0000000000").unwrap(),
            100 * MICROS_PER_UNIT
        );
        assert_eq!(amount_to_micros("0.5").unwrap(), 500_000);
        assert_eq!(amount_to_micros(" 12.345678 ").unwrap(), 12_345_678);
    }

    #[test]
    fn negative_amounts_parse() {
        assert_eq!(amount_to_micros("-1.25").unwrap(), -1_250_000);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(amount_to_micros(""), Err(AmountError::Malformed(_))));
        assert!(matches!(amount_to_micros("abc"), Err(AmountError::Malformed(_))));
        assert!(matches!(amount_to_micros("1.2.3"), Err(AmountError::Malformed(_))));
        assert!(matches!(amount_to_micros(".5"), Err(AmountError::Malformed(_))));
        assert!(matches!(amount_to_micros("5."), Err(AmountError::Malformed(_))));
    }

    #[test]
    fn rejects_precision_loss() {
        assert!(matches!(
            amount_to_micros("0.0000001"),
            Err(AmountError::TooPrecise(_))
        ));
    }

    #[test]
    fn rejects_overflow() {
        assert!(matches!(
            amount_to_micros("99999999999999999999"),
            Err(AmountError::OutOfRange(_))
        ));
    }

    #[test]
    fn renders_shortest_form() {
        assert_eq!(micros_to_amount(100 * MICROS_PER_UNIT), "100.0");
        assert_eq!(micros_to_amount(1_500_000), "1.5");
        assert_eq!(micros_to_amount(12_345_678), "12.345678");
        assert_eq!(micros_to_amount(-250_000), "-0.25");
    }
}
