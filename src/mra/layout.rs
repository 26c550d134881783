//! The ROM layout engine.
//!
//! MiSTer loads an arcade core's ROMs as one linear image. This module decides
//! where every chip of a [`Machine`] lands in that image, expressed as MRA
//! `<part>` and `<interleave>` nodes, while keeping a running count of the
//! bytes laid out so far.
//!
//! Regions are visited in listing order, except that an explicit region order
//! takes precedence and the `proms` region always goes last. For every region,
//! in this order:
//! 1. pad up to its configured start offset, if any;
//! 2. record its offset in the header table, if it is tracked;
//! 3. lay out its chips: fractioned, grouped into data words, or one after
//!    another.
//!
//! Problems with a single region are reported as [`Warning`]s; the region is
//! either laid out anyway or skipped, and the remaining regions are unaffected.
//!
//! [`Machine`]: ../../mame/struct.Machine.html
//! [`Warning`]: struct.Warning.html

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;

use serde::Deserialize;

use crate::error;
use crate::int::Hex;
use crate::mame::Chip;
use crate::mame::Machine;
use crate::mame::Region;
use crate::mra::header;
use crate::mra::header::HeaderTable;
use crate::mra::node::Node;

/// The region that always goes last.
pub const PROM_REGION: &str = "proms";

/// The byte used to pad gaps in the layout.
pub const FILL_BYTE: u8 = 0xff;

/// The channel map that swaps the two bytes of a 16-bit word.
const SWAP_MAP: &str = "12";

/// How chips of one region are split across the lanes of a wider word.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fraction {
  /// How many bytes each chip contributes per word.
  pub step: u32,
  /// How many chips make up one word.
  pub count: u32,
}

impl Fraction {
  /// Returns the width of the assembled word, in bits, if this fraction is
  /// supported.
  pub fn output_width(self) -> Option<u32> {
    match (self.count, self.step) {
      (2, 1) => Some(16),
      (2, 2) | (4, 1) => Some(32),
      (4, 2) => Some(64),
      _ => None,
    }
  }
}

/// A ROM appended after every region, which MAME does not list as part of the
/// machine.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
#[serde(from = "FirmwareSpec")]
pub struct Firmware {
  /// The file name of the ROM.
  pub name: String,
  /// The CRC32 of the ROM, as lower-case hex.
  pub crc: String,
  /// The size of the ROM, in bytes.
  pub size: u32,
}

impl Firmware {
  /// The internal ROM of the QSound DSP.
  pub fn qsound() -> Self {
    Self {
      name: "dl-1425.bin".into(),
      crc: "d6cf5ef5".into(),
      size: 0x2000,
    }
  }
}

/// A firmware, either by well-known name or spelled out.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum FirmwareSpec {
  Known(KnownFirmware),
  Custom { name: String, crc: String, size: u32 },
}

#[derive(Copy, Clone, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum KnownFirmware {
  Qsound,
}

impl From<FirmwareSpec> for Firmware {
  fn from(spec: FirmwareSpec) -> Self {
    match spec {
      FirmwareSpec::Known(KnownFirmware::Qsound) => Firmware::qsound(),
      FirmwareSpec::Custom { name, crc, size } => Firmware { name, crc, size },
    }
  }
}

/// Per-region layout rules, keyed by region name.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegionPolicy {
  /// Regions left out of the layout.
  pub ignore: HashSet<String>,
  /// Regions whose 16-bit words are byte-swapped.
  pub swap: HashSet<String>,
  /// Regions whose gaps between chips are padded.
  pub fill: HashSet<String>,
  /// Offsets in the image that regions must start at.
  pub start: HashMap<String, u32>,
  /// Regions whose chips are split across the lanes of a wider word.
  pub frac: HashMap<String, Fraction>,
  /// Word widths used to group chips sharing a word, in bits.
  pub width: HashMap<String, u32>,
  /// Regions whose grouped chips are mapped last-to-first.
  pub reverse: HashSet<String>,
  /// Regions laid out first, in this order.
  pub order: Vec<String>,
  /// Chips laid out first within a region, in this order.
  pub chips: HashMap<String, Vec<String>>,
  /// A ROM appended after all regions.
  pub firmware: Option<Firmware>,
}

impl RegionPolicy {
  fn word_width(&self, region: &Region) -> u32 {
    self
      .width
      .get(&region.name)
      .copied()
      .unwrap_or(region.word_width)
  }

  fn is_reversed(&self, region: &Region) -> bool {
    region.reverse || self.reverse.contains(&region.name)
  }
}

/// A problem with one region.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Warning {
  /// The set name of the machine.
  pub machine: String,
  /// The region the problem was found in.
  pub region: String,
  /// What went wrong.
  pub kind: WarningKind,
}

/// The kinds of layout [`Warning`].
///
/// [`Warning`]: struct.Warning.html
#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum WarningKind {
  /// The configured start offset is behind the data already laid out. No
  /// padding is added, so the region starts late.
  #[error("start offset 0x{start:X} is below the current offset 0x{dumped:X}")]
  StartBelowCursor {
    /// The configured start.
    start: u32,
    /// The bytes laid out before the region.
    dumped: u32,
  },
  /// The chips do not divide evenly into fraction groups. The region is
  /// skipped.
  #[error("{chips} chips cannot be split into groups of {count}; skipped")]
  FractionMismatch {
    /// The number of chips in the region.
    chips: usize,
    /// The configured fraction count.
    count: u32,
  },
  /// The fraction has no supported output width. The region is skipped.
  #[error("a fraction of {count} chips by {step} bytes is unsupported; skipped")]
  UnsupportedFraction {
    /// The configured fraction count.
    count: u32,
    /// The configured fraction step.
    step: u32,
  },
  /// A group of chips sharing a word does not evenly fill it. The chips are
  /// laid out one after another instead.
  #[error("{chips} chips cannot share a {width}-bit word; laid out in sequence")]
  UnevenWord {
    /// The number of chips in the group.
    chips: usize,
    /// The configured word width.
    width: u32,
  },
  /// The header table could not hold the offset of the region.
  #[error("{0}")]
  Header(header::Error),
}

impl fmt::Display for Warning {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.kind)
  }
}

impl error::Error for Warning {
  fn cause(&self) -> error::Cause<'_> {
    error::Cause::Region {
      machine: &self.machine,
      region: &self.region,
    }
  }

  fn action(&self) -> Option<error::Action> {
    Some(error::Action::LayingOut)
  }
}

/// What happened to one region.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Outcome {
  /// The region was laid out.
  Emitted {
    /// The offset of its first byte.
    start: u32,
    /// The number of bytes it occupies.
    len: u32,
  },
  /// The region was left out, with a warning.
  Skipped,
}

/// The result of laying out one region.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RegionReport {
  /// The region name.
  pub name: String,
  /// Whether it was laid out.
  pub outcome: Outcome,
  /// Problems found along the way.
  pub warnings: Vec<Warning>,
}

/// A finished ROM layout.
#[derive(Clone, Debug)]
pub struct Layout {
  /// The header, with every offset recorded.
  pub header: Option<HeaderTable>,
  /// The region content, in image order.
  pub content: Vec<Node>,
  /// The total size of the image, in bytes.
  pub len: u32,
  /// One report per visited region.
  pub regions: Vec<RegionReport>,
  /// Problems not tied to a visited region, such as a full header table.
  pub warnings: Vec<Warning>,
}

impl Layout {
  /// Renders the header as a `<part>` node.
  pub fn header_node(&self) -> Option<Node> {
    self
      .header
      .as_ref()
      .map(|header| Node::with_value("part", header.render()))
  }

  /// Returns every warning, in the order they were found.
  pub fn all_warnings(&self) -> impl Iterator<Item = &Warning> {
    self
      .regions
      .iter()
      .flat_map(|r| r.warnings.iter())
      .chain(self.warnings.iter())
  }

  /// Consumes this layout, returning the header part followed by the region
  /// content.
  pub fn into_nodes(self) -> Vec<Node> {
    let mut nodes = Vec::with_capacity(self.content.len() + 1);
    nodes.extend(self.header_node());
    nodes.extend(self.content);
    nodes
  }
}

/// Lays out the ROMs of `machine` according to `policy`.
///
/// If a `header` is given, the offset of every tracked region, and of the end
/// of the image, is recorded in it.
pub fn lay_out(
  machine: &Machine,
  policy: &RegionPolicy,
  header: Option<HeaderTable>,
) -> Layout {
  Engine {
    machine,
    policy,
    header,
    nodes: Vec::new(),
    dumped: 0,
  }
  .run()
}

/// Sorts regions by the explicit `order`, unlisted regions last in listing
/// order, then moves the PROM region to the very end.
pub fn order_regions<'m>(regions: &'m [Region], order: &[String]) -> Vec<&'m Region> {
  let mut sorted = regions.iter().collect::<Vec<_>>();
  sorted.sort_by_key(|r| {
    order
      .iter()
      .position(|name| *name == r.name)
      .unwrap_or(order.len())
  });
  sorted.sort_by_key(|r| r.name == PROM_REGION);
  sorted
}

/// Builds the channel map of one chip inside a `width_bytes`-wide word.
///
/// The chip supplies `step` consecutive bytes starting at lane `lane * step`.
/// The rightmost character stands for the lowest byte of the word; each digit
/// names the chip byte that lands there, and `0` leaves the byte alone.
pub fn channel_map(width_bytes: u32, step: u32, lane: u32) -> String {
  let first = lane * step;
  (0..width_bytes)
    .rev()
    .map(|b| {
      if b >= first && b < first + step {
        (b'1' + (b - first) as u8) as char
      } else {
        '0'
      }
    })
    .collect()
}

fn chip_node(chip: &Chip) -> Node {
  Node::new("part")
    .attr("name", &chip.name)
    .attr("crc", &chip.crc)
}

fn filler(len: u32) -> Node {
  Node::with_value("part", format!("{:02X}", FILL_BYTE)).attr("repeat", Hex(len))
}

struct Engine<'m, 'p> {
  machine: &'m Machine,
  policy: &'p RegionPolicy,
  header: Option<HeaderTable>,
  nodes: Vec<Node>,
  /// The number of bytes laid out so far.
  dumped: u32,
}

impl<'m, 'p> Engine<'m, 'p> {
  fn run(mut self) -> Layout {
    let mut regions = Vec::new();
    let mut warnings = Vec::new();

    for region in order_regions(&self.machine.regions, &self.policy.order) {
      if self.policy.ignore.contains(&region.name) {
        continue;
      }
      regions.push(self.region(region));
    }

    if let Some(firmware) = &self.policy.firmware {
      self.nodes.push(Node::comment(format!(
        "{} - starts at {}",
        firmware.name,
        Hex(self.dumped)
      )));
      self.nodes.push(
        Node::new("part")
          .attr("name", &firmware.name)
          .attr("crc", &firmware.crc),
      );
      self.dumped += firmware.size;
    }

    self.nodes.push(Node::comment(format!(
      "Total {} bytes - {} kBytes",
      Hex(self.dumped),
      self.dumped / 1024
    )));

    if let Some(header) = &mut self.header {
      if let Err(e) = header.record_offset(header::EOF, self.dumped) {
        warnings.push(Warning {
          machine: self.machine.id.clone(),
          region: header::EOF.into(),
          kind: WarningKind::Header(e),
        });
      }
    }

    Layout {
      header: self.header,
      content: self.nodes,
      len: self.dumped,
      regions,
      warnings,
    }
  }

  fn warning(&self, region: &Region, kind: WarningKind) -> Warning {
    Warning {
      machine: self.machine.id.clone(),
      region: region.name.clone(),
      kind,
    }
  }

  fn region(&mut self, region: &Region) -> RegionReport {
    let mut warnings = Vec::new();

    if let Some(&start) = self.policy.start.get(&region.name) {
      if start < self.dumped {
        warnings.push(self.warning(
          region,
          WarningKind::StartBelowCursor {
            start,
            dumped: self.dumped,
          },
        ));
      } else if start > self.dumped {
        self.nodes.push(filler(start - self.dumped));
        self.dumped = start;
      }
    }

    let recorded = match &mut self.header {
      Some(header) => header.record_offset(&region.name, self.dumped),
      None => Ok(None),
    };
    if let Err(e) = recorded {
      warnings.push(self.warning(region, WarningKind::Header(e)));
    }

    let start = self.dumped;
    self.nodes.push(Node::comment(format!(
      "{} - starts at {}",
      region.name,
      Hex(start)
    )));

    let chips = self.ordered_chips(region);
    let width = self.policy.word_width(region);
    let result = if let Some(&frac) = self.policy.frac.get(&region.name) {
      self.fractioned(&chips, frac)
    } else if width != 0 {
      match self.word_aligned(&chips, width, self.policy.is_reversed(region)) {
        Ok(true) => Ok(()),
        Ok(false) => {
          self.plain(region, &chips);
          Ok(())
        }
        Err(kind) => {
          warnings.push(self.warning(region, kind));
          self.plain(region, &chips);
          Ok(())
        }
      }
    } else {
      self.plain(region, &chips);
      Ok(())
    };

    let outcome = match result {
      Ok(()) => Outcome::Emitted {
        start,
        len: self.dumped - start,
      },
      Err(kind) => {
        warnings.push(self.warning(region, kind));
        Outcome::Skipped
      }
    };
    RegionReport {
      name: region.name.clone(),
      outcome,
      warnings,
    }
  }

  /// Returns the chips of `region`, with explicitly ordered chips first.
  fn ordered_chips<'r>(&self, region: &'r Region) -> Vec<&'r Chip> {
    let mut chips = region.chips.iter().collect::<Vec<_>>();
    if let Some(order) = self.policy.chips.get(&region.name) {
      chips.sort_by_key(|c| {
        order
          .iter()
          .position(|name| *name == c.name)
          .unwrap_or(order.len())
      });
    }
    chips
  }

  /// Splits the chips into `len / count` groups, taking every `len / count`th
  /// chip into the same group.
  fn fractioned(
    &mut self,
    chips: &[&Chip],
    frac: Fraction,
  ) -> Result<(), WarningKind> {
    let output = frac.output_width().ok_or(WarningKind::UnsupportedFraction {
      count: frac.count,
      step: frac.step,
    })?;
    let count = frac.count as usize;
    if chips.len() % count != 0 {
      return Err(WarningKind::FractionMismatch {
        chips: chips.len(),
        count: frac.count,
      });
    }

    let stride = chips.len() / count;
    for group in 0..stride {
      let mut node = Node::new("interleave").attr("output", output);
      for lane in 0..count {
        let chip = chips[group + lane * stride];
        let map = channel_map(frac.count * frac.step, frac.step, lane as u32);
        node.add(chip_node(chip).attr("map", map));
        self.dumped += chip.size;
      }
      self.nodes.push(node);
    }
    Ok(())
  }

  /// Groups consecutive chips that load into the same 8-byte-aligned word.
  ///
  /// Returns `Ok(false)`, having emitted nothing, if no group holds more than
  /// one chip.
  fn word_aligned(
    &mut self,
    chips: &[&Chip],
    width: u32,
    reverse: bool,
  ) -> Result<bool, WarningKind> {
    let mut clusters: Vec<Vec<&Chip>> = Vec::new();
    for &chip in chips {
      let word = chip.offset & !7;
      let joins = clusters.last().map_or(false, |c| c[0].offset & !7 == word);
      match clusters.last_mut() {
        Some(cluster) if joins => cluster.push(chip),
        _ => clusters.push(vec![chip]),
      }
    }

    if clusters.iter().all(|c| c.len() == 1) {
      return Ok(false);
    }

    let width_bytes = width / 8;
    for cluster in &clusters {
      let n = cluster.len() as u32;
      if n > 1 && (n > width_bytes || width_bytes % n != 0) {
        return Err(WarningKind::UnevenWord {
          chips: cluster.len(),
          width,
        });
      }
    }

    for mut cluster in clusters {
      if cluster.len() == 1 {
        self.nodes.push(chip_node(cluster[0]));
        self.dumped += cluster[0].size;
        continue;
      }

      if reverse {
        cluster.reverse();
      }
      let step = width_bytes / cluster.len() as u32;
      let mut node = Node::new("interleave").attr("output", width);
      for (lane, chip) in cluster.into_iter().enumerate() {
        let map = channel_map(width_bytes, step, lane as u32);
        node.add(chip_node(chip).attr("map", map));
        self.dumped += chip.size;
      }
      self.nodes.push(node);
    }
    Ok(true)
  }

  /// Lays chips out one after another.
  fn plain(&mut self, region: &Region, chips: &[&Chip]) {
    let fill = self.policy.fill.contains(&region.name);
    let swap = self.policy.swap.contains(&region.name);

    let mut prev_end: Option<u32> = None;
    for &chip in chips {
      if let Some(end) = prev_end.filter(|_| fill) {
        if chip.offset > end {
          let gap = chip.offset - end;
          self.nodes.push(filler(gap));
          self.dumped += gap;
        }
      }

      if swap {
        let mut node = Node::new("interleave").attr("output", 16);
        node.add(chip_node(chip).attr("map", SWAP_MAP));
        self.nodes.push(node);
      } else {
        self.nodes.push(chip_node(chip));
      }
      self.dumped += chip.size;
      prev_end = Some(chip.offset + chip.size);
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn chip(name: &str, offset: u32, size: u32) -> Chip {
    Chip {
      name: name.into(),
      crc: format!("{:08x}", offset ^ size),
      offset,
      size,
    }
  }

  fn region(name: &str, chips: Vec<Chip>) -> Region {
    let mut region = Region::new(name);
    region.chips = chips;
    region
  }

  fn machine(regions: Vec<Region>) -> Machine {
    let mut machine = Machine::new("test");
    machine.regions = regions;
    machine
  }

  /// Returns the non-comment content nodes.
  fn elements(layout: &Layout) -> Vec<&Node> {
    layout.content.iter().filter(|n| !n.is_comment()).collect()
  }

  fn maps(node: &Node) -> Vec<&str> {
    node
      .children()
      .iter()
      .map(|c| c.get("map").unwrap_or(""))
      .collect()
  }

  fn names(node: &Node) -> Vec<&str> {
    node
      .children()
      .iter()
      .map(|c| c.get("name").unwrap_or(""))
      .collect()
  }

  macro_rules! assert_map {
    ($width:literal, $step:literal, $lane:literal => $expected:literal) => {
      assert_eq!(channel_map($width, $step, $lane), $expected);
    };
  }

  #[test]
  fn channel_maps() {
    assert_map!(2, 1, 0 => "01");
    assert_map!(2, 1, 1 => "10");
    assert_map!(4, 2, 0 => "0021");
    assert_map!(4, 2, 1 => "2100");
    assert_map!(4, 1, 2 => "0100");
    assert_map!(8, 2, 3 => "21000000");
    assert_map!(8, 4, 1 => "43210000");
  }

  #[test]
  fn fraction_widths() {
    let width = |count, step| Fraction { step, count }.output_width();
    assert_eq!(width(2, 1), Some(16));
    assert_eq!(width(2, 2), Some(32));
    assert_eq!(width(4, 1), Some(32));
    assert_eq!(width(4, 2), Some(64));
    assert_eq!(width(3, 1), None);
    assert_eq!(width(2, 4), None);
  }

  #[test]
  fn plain_regions_are_sequential() {
    let m = machine(vec![
      region("maincpu", vec![chip("a", 0, 0x100), chip("b", 0x100, 0x80)]),
      region("audiocpu", vec![chip("c", 0, 0x40)]),
    ]);
    let layout = lay_out(&m, &RegionPolicy::default(), None);

    assert_eq!(layout.len, 0x1c0);
    let parts = elements(&layout)
      .iter()
      .map(|n| n.get("name").unwrap())
      .collect::<Vec<_>>();
    assert_eq!(parts, vec!["a", "b", "c"]);
    assert_eq!(
      layout.regions[1].outcome,
      Outcome::Emitted {
        start: 0x180,
        len: 0x40
      }
    );
    assert!(layout.all_warnings().next().is_none());

    let comments = layout
      .content
      .iter()
      .filter(|n| n.is_comment())
      .map(|n| n.tag())
      .collect::<Vec<_>>();
    assert_eq!(
      comments,
      vec![
        "maincpu - starts at 0x0",
        "audiocpu - starts at 0x180",
        "Total 0x1C0 bytes - 0 kBytes",
      ]
    );
  }

  #[test]
  fn fraction_by_two_interleaves_pairs() {
    let m = machine(vec![region(
      "maincpu",
      vec![
        chip("e0", 0, 0x100),
        chip("e1", 0, 0x100),
        chip("o0", 1, 0x100),
        chip("o1", 1, 0x100),
      ],
    )]);
    let mut policy = RegionPolicy::default();
    policy
      .frac
      .insert("maincpu".into(), Fraction { step: 1, count: 2 });
    let layout = lay_out(&m, &policy, None);

    let nodes = elements(&layout);
    assert_eq!(nodes.len(), 2);
    for node in &nodes {
      assert_eq!(node.tag(), "interleave");
      assert_eq!(node.get("output"), Some("16"));
      assert_eq!(node.children().len(), 2);
      assert_eq!(maps(node), vec!["01", "10"]);
    }
    assert_eq!(names(nodes[0]), vec!["e0", "o0"]);
    assert_eq!(names(nodes[1]), vec!["e1", "o1"]);
    assert_eq!(layout.len, 0x400);
  }

  #[test]
  fn fraction_by_four_words() {
    let chips = (0..4).map(|i| chip(&format!("c{}", i), 0, 0x10)).collect();
    let m = machine(vec![region("gfx", chips)]);
    let mut policy = RegionPolicy::default();
    policy.frac.insert("gfx".into(), Fraction { step: 2, count: 4 });
    let layout = lay_out(&m, &policy, None);

    let nodes = elements(&layout);
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].get("output"), Some("64"));
    assert_eq!(
      maps(nodes[0]),
      vec!["00000021", "00002100", "00210000", "21000000"]
    );
  }

  #[test]
  fn uneven_fraction_skips_region() {
    let m = machine(vec![
      region(
        "gfx",
        vec![chip("a", 0, 0x10), chip("b", 0, 0x10), chip("c", 0, 0x10)],
      ),
      region("audiocpu", vec![chip("d", 0, 0x10)]),
    ]);
    let mut policy = RegionPolicy::default();
    policy.frac.insert("gfx".into(), Fraction { step: 1, count: 2 });
    let layout = lay_out(&m, &policy, None);

    assert_eq!(layout.regions[0].outcome, Outcome::Skipped);
    assert_eq!(
      layout.regions[0].warnings[0].kind,
      WarningKind::FractionMismatch { chips: 3, count: 2 }
    );
    assert_eq!(layout.len, 0x10);
    assert_eq!(
      layout.regions[1].outcome,
      Outcome::Emitted {
        start: 0,
        len: 0x10
      }
    );
  }

  #[test]
  fn unsupported_fraction_skips_region() {
    let chips = (0..3).map(|i| chip(&format!("c{}", i), 0, 0x10)).collect();
    let m = machine(vec![region("gfx", chips)]);
    let mut policy = RegionPolicy::default();
    policy.frac.insert("gfx".into(), Fraction { step: 1, count: 3 });
    let layout = lay_out(&m, &policy, None);

    assert_eq!(layout.regions[0].outcome, Outcome::Skipped);
    assert_eq!(
      layout.regions[0].warnings[0].kind,
      WarningKind::UnsupportedFraction { count: 3, step: 1 }
    );
    assert!(elements(&layout).is_empty());
  }

  #[test]
  fn start_offset_pads_forward_only() {
    let m = machine(vec![
      region("maincpu", vec![chip("a", 0, 0x100)]),
      region("gfx", vec![chip("b", 0, 0x100)]),
      region("audiocpu", vec![chip("c", 0, 0x100)]),
    ]);
    let mut policy = RegionPolicy::default();
    policy.start.insert("gfx".into(), 0x400);
    policy.start.insert("audiocpu".into(), 0x100);
    let layout = lay_out(&m, &policy, None);

    let nodes = elements(&layout);
    assert_eq!(nodes.len(), 4);
    assert_eq!(nodes[1].get("repeat"), Some("0x300"));
    assert_eq!(nodes[1].value(), "FF");
    assert_eq!(
      layout.regions[1].outcome,
      Outcome::Emitted {
        start: 0x400,
        len: 0x100
      }
    );

    assert_eq!(
      layout.regions[2].warnings[0].kind,
      WarningKind::StartBelowCursor {
        start: 0x100,
        dumped: 0x500,
      }
    );
    assert_eq!(nodes[3].get("name"), Some("c"));
    assert_eq!(layout.len, 0x600);
  }

  #[test]
  fn swap_wraps_each_chip() {
    let m = machine(vec![region(
      "maincpu",
      vec![chip("a", 0, 0x100), chip("b", 0x100, 0x100)],
    )]);
    let mut policy = RegionPolicy::default();
    policy.swap.insert("maincpu".into());
    let layout = lay_out(&m, &policy, None);

    let nodes = elements(&layout);
    assert_eq!(nodes.len(), 2);
    for node in nodes {
      assert_eq!(node.tag(), "interleave");
      assert_eq!(node.get("output"), Some("16"));
      assert_eq!(maps(node), vec!["12"]);
    }
    assert_eq!(layout.len, 0x200);
  }

  #[test]
  fn fill_pads_gaps_between_chips() {
    let m = machine(vec![region(
      "maincpu",
      vec![
        chip("a", 0, 0x100),
        chip("b", 0x200, 0x100),
        chip("c", 0x300, 0x100),
      ],
    )]);
    let mut policy = RegionPolicy::default();
    policy.fill.insert("maincpu".into());
    let layout = lay_out(&m, &policy, None);

    let nodes = elements(&layout);
    assert_eq!(nodes.len(), 4);
    assert_eq!(nodes[1].get("repeat"), Some("0x100"));
    assert_eq!(nodes[2].get("name"), Some("b"));
    assert_eq!(layout.len, 0x400);
  }

  #[test]
  fn word_width_groups_chips() {
    let m = machine(vec![region(
      "maincpu",
      vec![
        chip("h0", 0, 0x100),
        chip("l0", 1, 0x100),
        chip("h1", 0x200, 0x100),
        chip("l1", 0x201, 0x100),
        chip("x", 0x400, 0x100),
      ],
    )]);
    let mut policy = RegionPolicy::default();
    policy.width.insert("maincpu".into(), 16);
    let layout = lay_out(&m, &policy, None);

    let nodes = elements(&layout);
    assert_eq!(nodes.len(), 3);
    assert_eq!(nodes[0].get("output"), Some("16"));
    assert_eq!(names(nodes[0]), vec!["h0", "l0"]);
    assert_eq!(maps(nodes[0]), vec!["01", "10"]);
    assert_eq!(names(nodes[1]), vec!["h1", "l1"]);
    assert_eq!(nodes[2].tag(), "part");
    assert_eq!(layout.len, 0x500);
  }

  #[test]
  fn reversed_words_map_last_chip_first() {
    let mut r = region("maincpu", vec![chip("a", 0, 0x10), chip("b", 2, 0x10)]);
    r.word_width = 32;
    r.reverse = true;
    let layout = lay_out(&machine(vec![r]), &RegionPolicy::default(), None);

    let nodes = elements(&layout);
    assert_eq!(nodes[0].get("output"), Some("32"));
    assert_eq!(names(nodes[0]), vec!["b", "a"]);
    assert_eq!(maps(nodes[0]), vec!["0021", "2100"]);
  }

  #[test]
  fn word_width_without_groups_falls_back() {
    let m = machine(vec![region(
      "maincpu",
      vec![chip("a", 0, 0x100), chip("b", 0x100, 0x100)],
    )]);
    let mut policy = RegionPolicy::default();
    policy.width.insert("maincpu".into(), 32);
    policy.swap.insert("maincpu".into());
    let layout = lay_out(&m, &policy, None);

    let nodes = elements(&layout);
    assert_eq!(nodes.len(), 2);
    assert!(nodes.iter().all(|n| n.tag() == "interleave"));
    assert!(layout.all_warnings().next().is_none());
  }

  #[test]
  fn uneven_words_fall_back_with_warning() {
    let chips = (0..3).map(|i| chip(&format!("c{}", i), i, 0x10)).collect();
    let m = machine(vec![region("gfx", chips)]);
    let mut policy = RegionPolicy::default();
    policy.width.insert("gfx".into(), 32);
    let layout = lay_out(&m, &policy, None);

    assert_eq!(
      layout.regions[0].warnings[0].kind,
      WarningKind::UnevenWord {
        chips: 3,
        width: 32
      }
    );
    assert_eq!(elements(&layout).len(), 3);
    assert_eq!(layout.len, 0x30);
  }

  #[test]
  fn regions_follow_explicit_order() {
    let m = machine(vec![
      region("proms", vec![chip("p", 0, 0x20)]),
      region("maincpu", vec![chip("a", 0, 0x10)]),
      region("gfx", vec![chip("b", 0, 0x10)]),
      region("plds", vec![chip("c", 0, 0x10)]),
      region("audiocpu", vec![chip("d", 0, 0x10)]),
    ]);
    let mut policy = RegionPolicy::default();
    policy.order = vec!["proms".into(), "audiocpu".into(), "gfx".into()];
    policy.ignore.insert("plds".into());
    let layout = lay_out(&m, &policy, None);

    let visited = layout
      .regions
      .iter()
      .map(|r| r.name.as_str())
      .collect::<Vec<_>>();
    assert_eq!(visited, vec!["audiocpu", "gfx", "maincpu", "proms"]);
    assert_eq!(layout.len, 0x50);
  }

  #[test]
  fn chips_follow_explicit_order() {
    let m = machine(vec![region(
      "maincpu",
      vec![chip("a", 0, 1), chip("b", 1, 1), chip("c", 2, 1)],
    )]);
    let mut policy = RegionPolicy::default();
    policy
      .chips
      .insert("maincpu".into(), vec!["c".into(), "a".into()]);
    let layout = lay_out(&m, &policy, None);

    let parts = elements(&layout)
      .iter()
      .map(|n| n.get("name").unwrap())
      .collect::<Vec<_>>();
    assert_eq!(parts, vec!["c", "a", "b"]);
  }

  #[test]
  fn header_records_offsets_and_goes_first() {
    let m = machine(vec![
      region("maincpu", vec![chip("a", 0, 0x100)]),
      region("gfx", vec![chip("b", 0, 0x300)]),
    ]);
    let mut header = HeaderTable::new(8, 0).unwrap();
    header.set_table_base(2);
    header.set_offset_shift(8).unwrap();
    header.track_region("maincpu");
    header.track_region("gfx");
    let layout = lay_out(&m, &RegionPolicy::default(), Some(header));

    let bytes = layout.header.as_ref().unwrap().bytes().to_vec();
    assert_eq!(bytes, vec![0, 0, 0x00, 0x00, 0x01, 0x00, 0x04, 0x00]);

    let nodes = layout.into_nodes();
    assert_eq!(nodes[0].tag(), "part");
    assert_eq!(nodes[0].value(), "00 00 00 00 01 00 04 00");
    assert!(nodes[1].is_comment());
  }

  #[test]
  fn header_overflow_warns() {
    let m = machine(vec![region("maincpu", vec![chip("a", 0, 0x100)])]);
    let mut header = HeaderTable::new(4, 0).unwrap();
    header.set_table_base(2);
    header.track_region("maincpu");
    let layout = lay_out(&m, &RegionPolicy::default(), Some(header));

    let warnings = layout.all_warnings().collect::<Vec<_>>();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].region, "EOF");
    assert!(matches!(
      warnings[0].kind,
      WarningKind::Header(header::Error::SlotOutOfBounds { pos: 4, .. })
    ));
  }

  #[test]
  fn oversized_offsets_warn() {
    let m = machine(vec![
      region("maincpu", vec![chip("a", 0, 0x10000)]),
      region("gfx", vec![chip("b", 0, 0x100)]),
    ]);
    let mut header = HeaderTable::new(8, 0).unwrap();
    header.track_region("gfx");
    let layout = lay_out(&m, &RegionPolicy::default(), Some(header));

    assert_eq!(
      layout.regions[1].warnings[0].kind,
      WarningKind::Header(header::Error::OffsetOverflow {
        name: "gfx".into(),
        value: 0x10000,
      })
    );
    assert_eq!(layout.warnings.len(), 1);
    assert_eq!(layout.header.unwrap().bytes(), &[0; 8]);
  }

  #[test]
  fn firmware_is_appended() {
    let m = machine(vec![region("maincpu", vec![chip("a", 0, 0x100)])]);
    let mut policy = RegionPolicy::default();
    policy.firmware = Some(Firmware::qsound());
    let layout = lay_out(&m, &policy, None);

    let nodes = elements(&layout);
    assert_eq!(nodes[1].get("name"), Some("dl-1425.bin"));
    assert_eq!(nodes[1].get("crc"), Some("d6cf5ef5"));
    assert_eq!(layout.len, 0x2100);
    assert_eq!(
      layout.content.last().map(|n| n.tag()),
      Some("Total 0x2100 bytes - 8 kBytes")
    );
  }
}
