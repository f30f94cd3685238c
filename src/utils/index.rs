/// Render a base-unit amount with `decimals` fractional digits, e.g. `150000000` at 8 → `1.50000000`.
pub fn format_token_amount(amount: u128, decimals: u32) -> String {
    let scale = match 10u128.checked_pow(decimals) {
        Some(scale) if decimals > 0 => scale,
        _ => return amount.to_string(),
    };
    format!(
        "{}.{:0width$}",
        amount / scale,
        amount % scale,
        width = decimals as usize
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_without_float_rounding() {
        assert_eq!(format_token_amount(150_000_000, 8), "1.50000000");
        assert_eq!(format_token_amount(1, 8), "0.00000001");
        assert_eq!(format_token_amount(u64::MAX as u128, 8), "184467440737.09551615");
        assert_eq!(format_token_amount(42, 0), "42");
    }
}
