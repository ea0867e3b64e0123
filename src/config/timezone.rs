use anyhow::{Context, Result, bail};
use time::UtcOffset;

/// Parses a fixed UTC offset: `UTC`, `Z`, `+05:30`, `-0800`, `+02`.
pub fn parse_timezone(value: &str) -> Result<UtcOffset> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("UTC") || trimmed.eq_ignore_ascii_case("Z") {
        return Ok(UtcOffset::UTC);
    }

    let (sign, digits) = match trimmed.split_at_checked(1) {
        Some(("+", rest)) => (1i8, rest),
        Some(("-", rest)) => (-1i8, rest),
        Some(_) => bail!("offset '{}' must start with '+' or '-'", value),
        None => bail!("offset is empty"),
    };

    let (hours, minutes) = match digits.split_once(':') {
        Some((hours, minutes)) => (hours, minutes),
        None if digits.len() == 4 => digits.split_at(2),
        None => (digits, "0"),
    };

    if hours.is_empty() || !hours.chars().all(|ch| ch.is_ascii_digit()) {
        bail!("offset '{}' has an invalid hour component", value);
    }
    let hours: i8 = hours
        .parse()
        .with_context(|| format!("offset '{}' hour component invalid", value))?;
    let minutes: i8 = minutes
        .parse()
        .with_context(|| format!("offset '{}' minute component invalid", value))?;

    UtcOffset::from_hms(sign * hours, sign * minutes, 0)
        .with_context(|| format!("offset '{}' out of range", value))
}
