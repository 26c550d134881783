//! The machine model read out of a `mame -listxml` listing.
//!
//! A [`Machine`] owns its ROM [`Region`]s and DIP [`Switch`]es, both in
//! document order. Once read, a machine is never modified; the MRA compiler
//! only borrows it.
//!
//! [`Machine`]: struct.Machine.html
//! [`Region`]: struct.Region.html
//! [`Switch`]: struct.Switch.html

mod parse;

pub use parse::parse;
pub use parse::Error;

/// One physical ROM device.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Chip {
  /// The file name of the ROM dump.
  pub name: String,
  /// The CRC32 of the dump, as lower-case hex.
  pub crc: String,
  /// The offset the chip is loaded at, relative to its region.
  pub offset: u32,
  /// The size of the chip, in bytes.
  pub size: u32,
}

/// A named, ordered collection of chips forming one logical data segment.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Region {
  /// The region name, e.g. `maincpu` or `gfx`.
  pub name: String,
  /// The chips in this region, in document order.
  pub chips: Vec<Chip>,
  /// The data word width used to group chips, in bits. Zero means no
  /// grouping.
  pub word_width: u32,
  /// Whether grouped chips are mapped last-to-first.
  pub reverse: bool,
}

impl Region {
  /// Creates an empty region with no word grouping.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      chips: Vec::new(),
      word_width: 0,
      reverse: false,
    }
  }

  /// Returns the sum of the sizes of every chip in this region.
  pub fn len(&self) -> u32 {
    self.chips.iter().map(|c| c.size).sum()
  }
}

/// One legal setting of a DIP switch.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SwitchValue {
  /// The human-readable label, e.g. `1 Coin/1 Credit`.
  pub label: String,
  /// The raw value of the masked bits.
  pub value: u32,
}

/// A DIP switch definition.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Switch {
  /// The switch name, e.g. `Difficulty`.
  pub name: String,
  /// The port tag this switch belongs to, e.g. `DSWA`.
  pub tag: String,
  /// The bits of the port this switch occupies.
  pub mask: u32,
  /// The legal values, sorted by raw value.
  pub values: Vec<SwitchValue>,
}

/// An arcade machine, as described by MAME.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Machine {
  /// The MAME set name.
  pub id: String,
  /// The full, human-readable title.
  pub display_name: String,
  /// The set name of the parent machine, for clones.
  pub clone_of: Option<String>,
  /// The screen rotation, in degrees.
  pub rotation: u32,
  /// The release year, as written in the listing.
  pub year: String,
  /// The manufacturer, as written in the listing.
  pub manufacturer: String,
  /// The number of players.
  pub players: u32,
  /// The largest number of buttons on any player control.
  pub buttons: u32,
  /// The ROM regions, in document order.
  pub regions: Vec<Region>,
  /// The DIP switches, in document order.
  pub switches: Vec<Switch>,
}

impl Machine {
  /// Creates an empty machine with the given set name.
  pub fn new(id: impl Into<String>) -> Self {
    let id = id.into();
    Self {
      display_name: id.clone(),
      id,
      ..Self::default()
    }
  }

  /// Returns true if the screen is mounted vertically.
  pub fn is_vertical(&self) -> bool {
    self.rotation % 180 == 90
  }

  /// Looks up a region by name.
  pub fn region(&self, name: &str) -> Option<&Region> {
    self.regions.iter().find(|r| r.name == name)
  }
}
