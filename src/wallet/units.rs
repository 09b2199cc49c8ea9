use primitive_types::U256;
use thiserror::Error;

const ETHER_DECIMALS: usize = 18;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("invalid amount '{0}'")]
    Invalid(String),
    #[error("amount '{0}' has more than 18 decimals")]
    TooPrecise(String),
    #[error("amount '{0}' is too large")]
    Overflow(String),
}

/// Parses a non-negative decimal ether amount (`"0.01"`, `"2"`, `".5"`) into wei.
pub fn parse_ether(text: &str) -> Result<U256, AmountError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AmountError::Empty);
    }

    let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
        return Err(AmountError::Invalid(text.to_string()));
    }
    if fraction.len() > ETHER_DECIMALS {
        return Err(AmountError::TooPrecise(text.to_string()));
    }

    let digits = format!("{whole}{fraction:0<width$}", width = ETHER_DECIMALS);
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_dec_str(digits).map_err(|_| AmountError::Overflow(text.to_string()))
}

/// Formats wei as a decimal ether amount without trailing zeros.
pub fn format_ether(wei: U256) -> String {
    let digits = format!("{:0>width$}", wei.to_string(), width = ETHER_DECIMALS + 1);
    let (whole, fraction) = digits.split_at(digits.len() - ETHER_DECIMALS);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        format!("{whole}.0")
    } else {
        format!("{whole}.{fraction}")
    }
}
