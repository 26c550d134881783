//! Integer helpers used by the converter.
//!
//! MAME listings mix decimal sizes and masks with prefix-less hexadecimal ROM
//! offsets, and configuration files may use either `0x` or `$` prefixes. This
//! module parses all of those, and provides a compact hex formatter for
//! emitted offsets.

use std::fmt;

/// The digit style a literal is written in, when it carries no prefix.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Radix {
  /// Base 10.
  Dec,
  /// Base 16.
  Hex,
}

impl Radix {
  /// Returns the numeric radix of this style.
  pub fn radix(self) -> u32 {
    match self {
      Self::Dec => 10,
      Self::Hex => 16,
    }
  }
}

/// Parses an unsigned integer literal.
///
/// A `0x` (modern) or `$` (classic) prefix forces hexadecimal; otherwise the
/// digits are read in `default` radix. Underscores are ignored, and
/// surrounding whitespace is trimmed.
///
/// ```
/// # use mame2mra::int::{parse, Radix};
/// assert_eq!(parse("0x8_0000", Radix::Dec), Some(0x80000));
/// assert_eq!(parse("80000", Radix::Hex), Some(0x80000));
/// assert_eq!(parse("255", Radix::Dec), Some(255));
/// ```
pub fn parse(text: &str, default: Radix) -> Option<u32> {
  let text = text.trim();
  let (digits, radix) = if let Some(rest) =
    text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
  {
    (rest, Radix::Hex)
  } else if let Some(rest) = text.strip_prefix('$') {
    (rest, Radix::Hex)
  } else {
    (text, default)
  };

  let digits = digits.chars().filter(|&c| c != '_').collect::<String>();
  if digits.is_empty() {
    return None;
  }
  u32::from_str_radix(&digits, radix.radix()).ok()
}

/// Formats an integer as upper-case hexadecimal with a `0x` prefix.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Hex(pub u32);

impl fmt::Display for Hex {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "0x{:X}", self.0)
  }
}
