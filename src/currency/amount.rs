//! Exact-decimal conversion between base-unit amounts and display strings.
//!
//! All arithmetic in this module is integer arithmetic; no floating point is
//! ever used on the money path. Parsing goes through two passes: the input is
//! first normalized from its locale into a fixed en_US-style decimal capped at
//! eight fractional digits, and only then scaled into base units. Collapsing
//! the two passes changes rounding in edge cases and must not be done.

use serde::{Deserialize, Serialize};

/// An amount of the tracked currency, counted in the smallest indivisible
/// unit. Always non-negative; the zero value doubles as the canonical
/// "unparseable input" sentinel.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_sats(sats: u64) -> Self {
        Amount(sats)
    }

    pub const fn sats(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

/// The coins this wallet tracks. Index order matters for the display-code
/// tables and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoinKind {
    Bitcoin,
    BitcoinCash,
}

/// Display scale for a base-unit amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Denomination {
    /// Whole coins, 10^8 base units.
    Coin,
    /// Thousandths of a coin, 10^5 base units.
    Milli,
    /// Millionths of a coin ("bits"), 10^2 base units.
    Micro,
}

const BITCOIN_DISPLAY_CODES: [&str; 3] = ["BTC", "mBTC", "uBTC"];
const BITCOIN_CASH_DISPLAY_CODES: [&str; 3] = ["BCH", "mBCH", "uBCH"];

impl Denomination {
    /// Base units per one displayed unit.
    pub const fn scale(self) -> u64 {
        match self {
            Denomination::Coin => 100_000_000,
            Denomination::Milli => 100_000,
            Denomination::Micro => 100,
        }
    }

    /// Fractional digits shown when formatting in this denomination.
    pub const fn fraction_digits(self) -> usize {
        match self {
            Denomination::Coin => 8,
            Denomination::Milli => 5,
            Denomination::Micro => 2,
        }
    }

    /// Display code, looked up from the fixed per-coin table.
    pub fn display_code(self, coin: CoinKind) -> &'static str {
        let table = match coin {
            CoinKind::Bitcoin => &BITCOIN_DISPLAY_CODES,
            CoinKind::BitcoinCash => &BITCOIN_CASH_DISPLAY_CODES,
        };
        match self {
            Denomination::Coin => table[0],
            Denomination::Milli => table[1],
            Denomination::Micro => table[2],
        }
    }
}

/// Separator conventions for the locale the user typed an amount in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountLocale {
    pub decimal_separator: char,
    pub grouping_separator: char,
}

impl AmountLocale {
    pub const EN_US: AmountLocale = AmountLocale {
        decimal_separator: '.',
        grouping_separator: ',',
    };

    /// Comma-decimal convention used across most of continental Europe.
    pub const EUROPEAN: AmountLocale = AmountLocale {
        decimal_separator: ',',
        grouping_separator: '.',
    };
}

impl Default for AmountLocale {
    fn default() -> Self {
        AmountLocale::EN_US
    }
}

/// Fractional digits the normalization pass keeps before scaling.
const NORMALIZED_FRACTION_DIGITS: usize = 8;

/// Parse a user-entered amount string into base units.
///
/// Returns [`Amount::ZERO`] for any input that is not a plain non-negative
/// decimal in the given locale: empty strings, foreign characters, multiple
/// decimal separators, or values that do not fit in a u64 after scaling.
pub fn parse_amount(text: &str, denomination: Denomination, locale: AmountLocale) -> Amount {
    let Some((whole, fraction)) = normalize(text, locale) else {
        return Amount::ZERO;
    };
    scale_to_base_units(whole, &fraction, denomination).unwrap_or(Amount::ZERO)
}

/// Format a base-unit amount in the given denomination, with the fixed
/// fractional digit count for that denomination and no grouping or label.
pub fn format_amount(amount: Amount, denomination: Denomination) -> String {
    let scale = denomination.scale();
    let digits = denomination.fraction_digits();
    let whole = amount.sats() / scale;
    let fraction = amount.sats() % scale;
    format!("{whole}.{fraction:0digits$}")
}

/// Format a base-unit amount followed by its denomination display code.
pub fn format_with_code(amount: Amount, coin: CoinKind, denomination: Denomination) -> String {
    format!(
        "{} {}",
        format_amount(amount, denomination),
        denomination.display_code(coin)
    )
}

/// First pass: locale-aware decode into a fixed en_US-style decimal with at
/// most eight fractional digits (round half to even at the eighth digit).
///
/// Returns the whole part and the fractional digit string, or `None` when the
/// input is rejected.
fn normalize(text: &str, locale: AmountLocale) -> Option<(u128, String)> {
    if text.is_empty() {
        return None;
    }
    if text.chars().any(|c| {
        !c.is_ascii_digit() && c != locale.grouping_separator && c != locale.decimal_separator
    }) {
        return None;
    }

    let ungrouped: String = text
        .chars()
        .filter(|&c| c != locale.grouping_separator)
        .collect();
    let mut parts = ungrouped.split(locale.decimal_separator);
    let whole_digits = parts.next().unwrap_or("");
    let fraction_digits = parts.next().unwrap_or("");
    if parts.next().is_some() {
        // Second decimal separator.
        return None;
    }
    if whole_digits.is_empty() && fraction_digits.is_empty() {
        return None;
    }

    let mut whole: u128 = 0;
    for digit in whole_digits.chars() {
        whole = whole
            .checked_mul(10)?
            .checked_add((digit as u8 - b'0') as u128)?;
    }

    let (kept, rest) = if fraction_digits.len() > NORMALIZED_FRACTION_DIGITS {
        fraction_digits.split_at(NORMALIZED_FRACTION_DIGITS)
    } else {
        (fraction_digits, "")
    };
    let mut fraction = kept.to_string();

    if round_up_half_even(&fraction, rest) {
        match increment_digits(&fraction) {
            Some(bumped) => fraction = bumped,
            // Carry past the first fractional digit: 0.99999999... -> 1.
            None => {
                whole = whole.checked_add(1)?;
                fraction = "0".repeat(fraction.len());
            }
        }
    }

    Some((whole, fraction))
}

/// Half-even decision for the digits cut off by the normalization pass.
fn round_up_half_even(kept: &str, rest: &str) -> bool {
    let mut cut = rest.chars();
    let first = match cut.next() {
        Some(c) => c,
        None => return false,
    };
    match first {
        '0'..='4' => false,
        '6'..='9' => true,
        _ => {
            // Exactly half if every remaining digit is zero; round to even.
            if cut.any(|c| c != '0') {
                true
            } else {
                let last_kept = kept.chars().last().map(|c| c as u8 - b'0').unwrap_or(0);
                last_kept % 2 == 1
            }
        }
    }
}

/// Add one to a digit string of fixed width. `None` signals a carry out of
/// the leading digit.
fn increment_digits(digits: &str) -> Option<String> {
    let mut out: Vec<u8> = digits.bytes().collect();
    let mut carried = true;
    for slot in out.iter_mut().rev() {
        if *slot == b'9' {
            *slot = b'0';
        } else {
            *slot += 1;
            carried = false;
            break;
        }
    }
    if carried {
        None
    } else {
        String::from_utf8(out).ok()
    }
}

/// Second pass: scale the normalized decimal by the denomination factor and
/// truncate toward zero into base units.
fn scale_to_base_units(whole: u128, fraction: &str, denomination: Denomination) -> Option<Amount> {
    let scale_digits = denomination.fraction_digits();
    let scale = denomination.scale() as u128;

    let mut fraction_units: u128 = 0;
    let mut used = 0usize;
    for digit in fraction.chars().take(scale_digits) {
        fraction_units = fraction_units * 10 + (digit as u8 - b'0') as u128;
        used += 1;
    }
    fraction_units *= 10u128.pow((scale_digits - used) as u32);

    let total = whole.checked_mul(scale)?.checked_add(fraction_units)?;
    u64::try_from(total).ok().map(Amount::from_sats)
}
