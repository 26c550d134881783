//! DIP switch bit-range compilation.
//!
//! MRA files describe every DIP switch as a range of bits inside one packed
//! status word. Switches sharing a port tag are consecutive in MAME listings;
//! each run of equal tags occupies the next byte of the word, or the next two
//! bytes if any of its switches reaches past bit 7.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use crate::mame::Switch;
use crate::mra::node::Node;

lazy_static! {
  static ref PAREN: Regex = Regex::new(r"[()]").unwrap();
}

/// Suffixes dropped from value labels, tried in this order.
const DROPPED_SUFFIXES: &[&str] = &[" Coins", " Coin", " Credits", " Credit"];

/// Per-machine DIP switch adjustments.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DipPolicy {
  /// Switches to leave out entirely, by name.
  pub remove: HashSet<String>,
  /// Bits to subtract from every switch of a port tag.
  pub shift: HashMap<String, u32>,
  /// Display names to use instead of MAME's switch names.
  pub rename: HashMap<String, String>,
}

/// An error compiling a switch.
#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum Error {
  /// The mask has no bits set.
  #[error("switch `{switch}` has an empty mask")]
  EmptyMask {
    /// The switch name.
    switch: String,
  },
  /// The mask is not a single run of ones.
  #[error("switch `{switch}` has a non-contiguous mask 0x{mask:X}")]
  GappedMask {
    /// The switch name.
    switch: String,
    /// The offending mask.
    mask: u32,
  },
  /// A bit shift moved the switch below bit zero.
  #[error("shifting switch `{switch}` down by {shift} bits moves it below bit 0")]
  ShiftUnderflow {
    /// The switch name.
    switch: String,
    /// The configured shift.
    shift: u32,
  },
}

impl Error {
  /// Returns the name of the switch this error is about.
  pub fn switch(&self) -> &str {
    match self {
      Self::EmptyMask { switch }
      | Self::GappedMask { switch, .. }
      | Self::ShiftUnderflow { switch, .. } => switch,
    }
  }
}

/// An inclusive range of bits inside the packed status word.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct BitRange {
  /// The lowest bit.
  pub lo: u32,
  /// The highest bit.
  pub hi: u32,
}

impl BitRange {
  /// Computes the range covered by `mask`, counting from `base`.
  ///
  /// Returns `None` unless `mask` is a single, non-empty run of ones.
  pub fn from_mask(mask: u32, base: u32) -> Option<Self> {
    if mask == 0 {
      return None;
    }
    let lo = mask.trailing_zeros();
    let run = (mask >> lo).trailing_ones();
    if (mask >> lo).checked_shr(run).unwrap_or(0) != 0 {
      return None;
    }
    Some(Self {
      lo: base + lo,
      hi: base + lo + run - 1,
    })
  }

  /// Moves this range `shift` bits down, if it stays at or above bit zero.
  pub fn shifted_down(self, shift: u32) -> Option<Self> {
    Some(Self {
      lo: self.lo.checked_sub(shift)?,
      hi: self.hi.checked_sub(shift)?,
    })
  }
}

impl fmt::Display for BitRange {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    if self.lo == self.hi {
      write!(f, "{}", self.lo)
    } else {
      write!(f, "{},{}", self.lo, self.hi)
    }
  }
}

/// A compiled switch.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Dip {
  /// The display name.
  pub name: String,
  /// The port tag the switch belongs to.
  pub tag: String,
  /// The bits of the status word the switch occupies.
  pub bits: BitRange,
  /// The cleaned value labels, comma separated, ordered by raw value.
  pub ids: String,
}

/// Every compiled switch of one machine.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Dips {
  /// The switches, in listing order.
  pub dips: Vec<Dip>,
  /// Whether some port group needed two bytes.
  pub wide: bool,
}

impl Dips {
  /// Returns the default packed value of the status word.
  pub fn default_value(&self) -> &'static str {
    if self.wide {
      "FF,FF,FF"
    } else {
      "FF,FF"
    }
  }

  /// Renders the `<switches>` block, or `None` if there are no switches.
  pub fn to_node(&self) -> Option<Node> {
    if self.dips.is_empty() {
      return None;
    }

    let mut node = Node::new("switches").attr("default", self.default_value());
    let mut last_tag = None;
    for dip in &self.dips {
      if last_tag != Some(&dip.tag) {
        node.add_comment(dip.tag.as_str());
        last_tag = Some(&dip.tag);
      }
      node.add(
        Node::new("dip")
          .attr("name", &dip.name)
          .attr("bits", dip.bits)
          .attr("ids", &dip.ids),
      );
    }
    Some(node)
  }
}

/// Compiles `switches` into bit ranges.
///
/// Each time the port tag changes, the base bit advances by the width of the
/// previous group, and the shift configured for the new tag (if any) applies
/// to all of its switches. Removed switches are left out of the result but
/// still occupy their bits.
pub fn compile(switches: &[Switch], policy: &DipPolicy) -> Result<Dips, Error> {
  let mut dips = Dips::default();
  let mut base = 0;
  let mut shift = 0;
  let mut last_tag: Option<&str> = None;
  let mut group_wide = false;

  for switch in switches {
    if last_tag != Some(switch.tag.as_str()) {
      if last_tag.is_some() {
        base += if group_wide { 16 } else { 8 };
      }
      last_tag = Some(switch.tag.as_str());
      group_wide = false;
      shift = policy.shift.get(&switch.tag).copied().unwrap_or(0);
    }

    // Removed switches still occupy their bits.
    if policy.remove.contains(&switch.name) {
      if let Some(bits) = BitRange::from_mask(switch.mask, base) {
        if bits.hi - base >= 8 {
          group_wide = true;
          dips.wide = true;
        }
      }
      continue;
    }

    let bits = BitRange::from_mask(switch.mask, base).ok_or_else(|| {
      if switch.mask == 0 {
        Error::EmptyMask {
          switch: switch.name.clone(),
        }
      } else {
        Error::GappedMask {
          switch: switch.name.clone(),
          mask: switch.mask,
        }
      }
    })?;
    if bits.hi - base >= 8 {
      group_wide = true;
      dips.wide = true;
    }
    let bits = bits.shifted_down(shift).ok_or_else(|| Error::ShiftUnderflow {
      switch: switch.name.clone(),
      shift,
    })?;

    let ids = switch
      .values
      .iter()
      .map(|v| clean_label(&v.label))
      .collect::<Vec<_>>()
      .join(",");
    let name = policy.rename.get(&switch.name).unwrap_or(&switch.name);
    dips.dips.push(Dip {
      name: name.clone(),
      tag: switch.tag.clone(),
      bits,
      ids,
    });
  }

  Ok(dips)
}

/// Shortens a value label for the MiSTer OSD.
///
/// The first balanced parenthesized note and one trailing space are removed,
/// runs of four zeroes become `0k`, and coin/credit suffixes are dropped.
pub fn clean_label(label: &str) -> String {
  let mut label = without_first_group(label);
  if label.ends_with(' ') {
    label.pop();
  }
  let mut label = label.replace("0000", "0k");
  for suffix in DROPPED_SUFFIXES {
    if let Some(len) = label.strip_suffix(*suffix).map(str::len) {
      label.truncate(len);
    }
  }
  label
}

/// Removes the first balanced `(...)` group from `label`, nested groups
/// included. Unbalanced labels are returned unchanged.
fn without_first_group(label: &str) -> String {
  let mut depth = 0usize;
  let mut start = None;
  for m in PAREN.find_iter(label) {
    if m.as_str() == "(" {
      if depth == 0 {
        start = Some(m.start());
      }
      depth += 1;
    } else if depth > 0 {
      depth -= 1;
      if let (0, Some(start)) = (depth, start) {
        let mut out = label[..start].to_string();
        out.push_str(&label[m.end()..]);
        return out;
      }
    }
  }
  label.to_string()
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::mame::SwitchValue;

  fn switch(name: &str, tag: &str, mask: u32, labels: &[&str]) -> Switch {
    Switch {
      name: name.into(),
      tag: tag.into(),
      mask,
      values: labels
        .iter()
        .enumerate()
        .map(|(i, l)| SwitchValue {
          label: l.to_string(),
          value: i as u32,
        })
        .collect(),
    }
  }

  macro_rules! assert_bits {
    ($mask:literal @ $base:literal => None) => {
      assert_eq!(BitRange::from_mask($mask, $base), None);
    };
    ($mask:literal @ $base:literal => $lo:literal, $hi:literal) => {
      assert_eq!(
        BitRange::from_mask($mask, $base),
        Some(BitRange { lo: $lo, hi: $hi })
      );
    };
  }

  #[test]
  fn mask_ranges() {
    assert_bits!(0x06 @ 0 => 1, 2);
    assert_bits!(0x01 @ 0 => 0, 0);
    assert_bits!(0x80 @ 8 => 15, 15);
    assert_bits!(0xff00 @ 0 => 8, 15);
    assert_bits!(0xffff_ffff @ 0 => 0, 31);
    assert_bits!(0x00 @ 0 => None);
    assert_bits!(0x05 @ 0 => None);
    assert_bits!(0x8001 @ 0 => None);
  }

  #[test]
  fn renders_bits() {
    assert_eq!(BitRange { lo: 1, hi: 2 }.to_string(), "1,2");
    assert_eq!(BitRange { lo: 7, hi: 7 }.to_string(), "7");
  }

  #[test]
  fn cleans_labels() {
    assert_eq!(clean_label("20000 (Easy)"), "20k");
    assert_eq!(clean_label("1 Coin/1 Credit"), "1 Coin/1");
    assert_eq!(clean_label("2 Coins"), "2");
    assert_eq!(clean_label("3 Credits"), "3");
    assert_eq!(clean_label("Normal (Level 4) "), "Normal ");
    assert_eq!(clean_label("Off"), "Off");
    assert_eq!(clean_label("(a) (b)"), " (b)");
    assert_eq!(clean_label("(a(b)c) d"), " d");
    assert_eq!(clean_label("x) y (z)"), "x) y");
    assert_eq!(clean_label("Hard (unbalanced"), "Hard (unbalanced");
  }

  #[test]
  fn groups_advance_base() {
    let switches = vec![
      switch("Coin A", "DSWA", 0x07, &["1C", "2C"]),
      switch("Coin B", "DSWA", 0x38, &["1C"]),
      switch("Difficulty", "DSWB", 0x06, &["Easy", "Hard"]),
      switch("Lives", "DSWC", 0x03, &["3", "4"]),
    ];
    let dips = compile(&switches, &DipPolicy::default()).unwrap();
    let bits = dips
      .dips
      .iter()
      .map(|d| d.bits.to_string())
      .collect::<Vec<_>>();
    assert_eq!(bits, vec!["0,2", "3,5", "9,10", "16,17"]);
    assert!(!dips.wide);
    assert_eq!(dips.default_value(), "FF,FF");
  }

  #[test]
  fn wide_group_takes_two_bytes() {
    let switches = vec![
      switch("Service", "IN0", 0x0100, &["Off", "On"]),
      switch("Freeze", "DSW", 0x01, &["Off", "On"]),
    ];
    let dips = compile(&switches, &DipPolicy::default()).unwrap();
    assert_eq!(dips.dips[0].bits, BitRange { lo: 8, hi: 8 });
    assert_eq!(dips.dips[1].bits, BitRange { lo: 16, hi: 16 });
    assert!(dips.wide);
    assert_eq!(dips.default_value(), "FF,FF,FF");
  }

  #[test]
  fn shift_applies_to_whole_group() {
    let mut policy = DipPolicy::default();
    policy.shift.insert("DSWB".into(), 4);
    let switches = vec![
      switch("A", "DSWA", 0x01, &["Off"]),
      switch("B", "DSWB", 0x30, &["Off"]),
      switch("C", "DSWB", 0xc0, &["Off"]),
    ];
    let dips = compile(&switches, &policy).unwrap();
    assert_eq!(dips.dips[1].bits, BitRange { lo: 8, hi: 9 });
    assert_eq!(dips.dips[2].bits, BitRange { lo: 10, hi: 11 });

    policy.shift.insert("DSWA".into(), 1);
    assert_eq!(
      compile(&switches, &policy),
      Err(Error::ShiftUnderflow {
        switch: "A".into(),
        shift: 1,
      })
    );
  }

  #[test]
  fn gapped_mask_is_rejected() {
    let switches = vec![switch("Odd", "DSWA", 0x05, &["Off"])];
    let err = compile(&switches, &DipPolicy::default()).unwrap_err();
    assert_eq!(
      err,
      Error::GappedMask {
        switch: "Odd".into(),
        mask: 5,
      }
    );
    assert_eq!(err.switch(), "Odd");
  }

  #[test]
  fn remove_and_rename() {
    let mut policy = DipPolicy::default();
    policy.remove.insert("Unused".into());
    policy.rename.insert("Demo Sounds".into(), "Demo snd".into());
    let switches = vec![
      switch("Unused", "DSWA", 0x01, &["Off"]),
      switch("Demo Sounds", "DSWA", 0x02, &["Off", "On"]),
    ];
    let dips = compile(&switches, &policy).unwrap();
    assert_eq!(dips.dips.len(), 1);
    assert_eq!(dips.dips[0].name, "Demo snd");
    assert_eq!(dips.dips[0].bits, BitRange { lo: 1, hi: 1 });
    assert_eq!(dips.dips[0].ids, "Off,On");
  }

  #[test]
  fn removed_switches_keep_their_bits() {
    let mut policy = DipPolicy::default();
    policy.remove.insert("Unused".into());
    let switches = vec![
      switch("Unused", "DSWA", 0x01, &["Off"]),
      switch("Lives", "DSWB", 0x03, &["3", "4"]),
    ];
    let dips = compile(&switches, &policy).unwrap();
    assert_eq!(dips.dips.len(), 1);
    assert_eq!(dips.dips[0].bits, BitRange { lo: 8, hi: 9 });

    let switches = vec![
      switch("Unused", "IN0", 0x0100, &["Off"]),
      switch("Lives", "DSWA", 0x03, &["3", "4"]),
    ];
    let dips = compile(&switches, &policy).unwrap();
    assert_eq!(dips.dips[0].bits, BitRange { lo: 16, hi: 17 });
    assert!(dips.wide);
  }

  #[test]
  fn switches_node() {
    let switches = vec![
      switch("Lives", "DSWA", 0x03, &["3", "4 (Hard)"]),
      switch("Bonus", "DSWB", 0x01, &["20000 (Easy)", "None"]),
    ];
    let dips = compile(&switches, &DipPolicy::default()).unwrap();
    let node = dips.to_node().unwrap();
    assert_eq!(
      node.to_string(),
      "<switches default=\"FF,FF\">\n\
       \x20   <!-- DSWA -->\n\
       \x20   <dip name=\"Lives\" bits=\"0,1\" ids=\"3,4\"></dip>\n\
       \x20   <!-- DSWB -->\n\
       \x20   <dip name=\"Bonus\" bits=\"8\" ids=\"20k,None\"></dip>\n\
       </switches>\n"
    );

    assert_eq!(Dips::default().to_node(), None);
  }
}
