use crate::services::error::{ConvertError, ConvertResult};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageNumberFormat {
    #[default]
    Numeric,
    NumericPage,
    RomanLower,
    RomanLowerPage,
    RomanUpper,
    RomanUpperPage,
}

impl PageNumberFormat {
    /// The label printed for page `number`.
    pub fn label(self, number: u32) -> String {
        match self {
            PageNumberFormat::Numeric => number.to_string(),
            PageNumberFormat::NumericPage => format!("Page {}", number),
            PageNumberFormat::RomanLower => to_roman(number).to_lowercase(),
            PageNumberFormat::RomanLowerPage => format!("Page {}", to_roman(number).to_lowercase()),
            PageNumberFormat::RomanUpper => to_roman(number),
            PageNumberFormat::RomanUpperPage => format!("Page {}", to_roman(number)),
        }
    }
}

impl FromStr for PageNumberFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> ConvertResult<Self> {
        match s.trim() {
            "numeric" => Ok(PageNumberFormat::Numeric),
            "numeric-page" => Ok(PageNumberFormat::NumericPage),
            "roman-lower" => Ok(PageNumberFormat::RomanLower),
            "roman-lower-page" => Ok(PageNumberFormat::RomanLowerPage),
            "roman-upper" => Ok(PageNumberFormat::RomanUpper),
            "roman-upper-page" => Ok(PageNumberFormat::RomanUpperPage),
            other => Err(ConvertError::invalid(format!(
                "Unknown page number format '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumberPosition {
    BottomLeft,
    #[default]
    BottomCenter,
    BottomRight,
}

impl FromStr for NumberPosition {
    type Err = ConvertError;

    fn from_str(s: &str) -> ConvertResult<Self> {
        match s.trim() {
            "bottom-left" => Ok(NumberPosition::BottomLeft),
            "bottom-center" => Ok(NumberPosition::BottomCenter),
            "bottom-right" => Ok(NumberPosition::BottomRight),
            other => Err(ConvertError::invalid(format!(
                "Unknown page number position '{}'",
                other
            ))),
        }
    }
}

/// Largest first page number accepted for numbering.
pub const MAX_START_NUMBER: u32 = 1_000_000;

/// Parses the first page number, which must lie in `1..=MAX_START_NUMBER`.
pub fn parse_start_number(raw: &str) -> ConvertResult<u32> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|n| (1..=MAX_START_NUMBER).contains(n))
        .ok_or_else(|| ConvertError::invalid(format!("Invalid start number '{}'", raw)))
}

/// Upper-case roman numeral. Zero has no numeral and renders as `"0"`.
pub fn to_roman(mut number: u32) -> String {
    const NUMERALS: [(u32, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];

    if number == 0 {
        return "0".to_string();
    }

    let mut out = String::new();
    for (value, numeral) in NUMERALS {
        while number >= value {
            out.push_str(numeral);
            number -= value;
        }
    }
    out
}
