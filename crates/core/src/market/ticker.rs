//! Symbol normalization for the chart API.
//!
//! Bare numeric codes are mapped to their exchange suffix: 4 digits are Taiwan
//! listings, up to 3 digits are Hong Kong (padded to 4), 6 digits are Shanghai
//! (`6…`) or Shenzhen (`0…`, `2…`, `3…`).

const USD_QUOTE_SUFFIX: &str = "-USD";

pub fn normalize_for_chart(ticker: &str) -> String {
    let ticker = ticker.trim();

    if ticker.contains('.') {
        if let Some(base) = strip_suffix_ignore_case(ticker, ".hk") {
            let base = if is_all_digits(base) {
                format!("{base:0>4}")
            } else {
                base.to_string()
            };
            return format!("{base}.HK");
        }
        return ticker.to_string();
    }

    if !is_all_digits(ticker) {
        return ticker.to_string();
    }

    match ticker.len() {
        4 => format!("{ticker}.TW"),
        1..=3 => format!("{ticker:0>4}.HK"),
        6 if ticker.starts_with('6') => format!("{ticker}.SS"),
        6 if ticker.starts_with(|c: char| matches!(c, '0' | '2' | '3')) => format!("{ticker}.SZ"),
        6 => format!("{ticker}.SS"),
        _ => ticker.to_string(),
    }
}

/// Appends `-USD` unless the symbol is already quoted in USD.
pub fn to_crypto_pair(ticker: &str) -> String {
    let upper = ticker.to_ascii_uppercase();
    if upper.contains("-USD") || upper.contains("/USD") {
        ticker.to_string()
    } else {
        format!("{ticker}{USD_QUOTE_SUFFIX}")
    }
}

fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let split = s.len().checked_sub(suffix.len())?;
    if !s.is_char_boundary(split) {
        return None;
    }
    let (base, tail) = s.split_at(split);
    tail.eq_ignore_ascii_case(suffix).then_some(base)
}
