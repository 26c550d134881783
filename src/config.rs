//! Conversion settings.
//!
//! A configuration is a JSON5 document; every key is optional. It carries the
//! metadata MAME doesn't know about (the core's `.rbf` name, authorship), the
//! per-region layout rules, DIP switch adjustments and the ROM header.
//!
//! ```text
//! {
//!   rbf: "jtcps1",
//!   regions: {
//!     start: { gfx: 0x80000 },
//!     frac: { gfx: { step: 2, count: 4 } },
//!     order: ["maincpu", "audiocpu", "gfx"],
//!   },
//!   header: { size: 64, offsets: { base: 0x10, regions: ["gfx"], shift: 8 } },
//! }
//! ```

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error;
use crate::mra::dip::DipPolicy;
use crate::mra::header;
use crate::mra::header::HeaderTable;
use crate::mra::layout::Fraction;
use crate::mra::layout::RegionPolicy;

/// Word widths a region may be grouped by; zero disables grouping.
const WORD_WIDTHS: &[u32] = &[0, 16, 32, 64];

/// A complete configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  /// The name of the FPGA core, without extension.
  pub rbf: Option<String>,
  /// Who made the core.
  pub about: Option<About>,
  /// The size of the non-volatile RAM to persist, in bytes.
  pub nvram: Option<u32>,
  /// Comma-separated button names, overriding the generated ones.
  pub buttons: Option<String>,
  /// ROM layout rules.
  pub regions: RegionPolicy,
  /// DIP switch adjustments.
  pub dips: DipPolicy,
  /// The ROM header, if the core expects one.
  pub header: Option<HeaderConfig>,
}

/// Core authorship, rendered as the `<about>` element.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct About {
  /// The author.
  pub author: Option<String>,
  /// The author's web page.
  pub webpage: Option<String>,
  /// Where the core's source lives.
  pub source: Option<String>,
}

/// The layout of the ROM header.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderConfig {
  /// The size of the header, in bytes.
  pub size: usize,
  /// The byte every header position starts out as.
  #[serde(default)]
  pub fill: u8,
  /// Bytes to write into the header, in order.
  #[serde(default)]
  pub data: Vec<HeaderData>,
  /// The region offset table, if any.
  #[serde(default)]
  pub offsets: Option<OffsetTable>,
}

/// A run of bytes written into the header.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderData {
  /// Where to start writing; defaults to wherever the last run ended.
  #[serde(default)]
  pub pos: Option<usize>,
  /// The bytes to write.
  pub bytes: Vec<u8>,
}

/// The table of region offsets embedded in the header.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OffsetTable {
  /// The position of the first entry.
  pub base: usize,
  /// The regions given an entry, in entry order. An `EOF` entry follows.
  #[serde(default)]
  pub regions: Vec<String>,
  /// The number of bits offsets are shifted right by.
  #[serde(default)]
  pub shift: u32,
  /// Whether entries are stored high byte first.
  #[serde(default)]
  pub reverse: bool,
}

/// An error loading a configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The file could not be read.
  #[error("cannot read {}: {source}", path.display())]
  Io {
    /// The configuration file.
    path: PathBuf,
    /// The underlying error.
    source: io::Error,
  },
  /// The document is not valid JSON5, or does not match the schema.
  #[error("{0}")]
  Syntax(#[from] json5::Error),
  /// A fraction is not one of the supported shapes.
  #[error("fractions need a count of 2 or 4 and a step of 1 or 2, got {count} by {step}")]
  BadFraction {
    /// The offending key.
    key: String,
    /// The configured count.
    count: u32,
    /// The configured step.
    step: u32,
  },
  /// A word width is not one of 0, 16, 32 or 64.
  #[error("word width must be 0, 16, 32 or 64, got {width}")]
  BadWidth {
    /// The offending key.
    key: String,
    /// The configured width.
    width: u32,
  },
  /// The header could not be built.
  #[error("{source}")]
  Header {
    /// The offending key.
    key: &'static str,
    /// The underlying error.
    source: header::Error,
  },
}

impl error::Error for Error {
  fn cause(&self) -> error::Cause<'_> {
    match self {
      Self::Io { path, .. } => error::Cause::File(path),
      Self::Syntax(_) => error::Cause::Config(""),
      Self::BadFraction { key, .. } | Self::BadWidth { key, .. } => {
        error::Cause::Config(key)
      }
      Self::Header { key, .. } => error::Cause::Config(key),
    }
  }

  fn action(&self) -> Option<error::Action> {
    Some(error::Action::Configuring)
  }
}

impl Config {
  /// Reads and validates the configuration file at `path`.
  pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| Error::Io {
      path: path.to_owned(),
      source,
    })?;
    Self::from_json5(&text)
  }

  /// Parses and validates a configuration document.
  pub fn from_json5(text: &str) -> Result<Self, Error> {
    let config: Config = json5::from_str(text)?;
    config.validate()?;
    Ok(config)
  }

  /// Checks the settings that deserialization alone cannot.
  pub fn validate(&self) -> Result<(), Error> {
    for (region, frac) in &self.regions.frac {
      let Fraction { count, step } = *frac;
      if frac.output_width().is_none() {
        return Err(Error::BadFraction {
          key: format!("regions.frac.{}", region),
          count,
          step,
        });
      }
    }

    for (region, &width) in &self.regions.width {
      if !WORD_WIDTHS.contains(&width) {
        return Err(Error::BadWidth {
          key: format!("regions.width.{}", region),
          width,
        });
      }
    }

    self.header_table().map(|_| ())
  }

  /// Builds the header described by this configuration, without any offsets
  /// recorded yet.
  pub fn header_table(&self) -> Result<Option<HeaderTable>, Error> {
    let config = match &self.header {
      Some(config) => config,
      None => return Ok(None),
    };
    let wrap = |key: &'static str| {
      move |source: header::Error| Error::Header { key, source }
    };

    let mut header =
      HeaderTable::new(config.size, config.fill).map_err(wrap("header.size"))?;
    for data in &config.data {
      if let Some(pos) = data.pos {
        header.set_cursor(pos).map_err(wrap("header.data"))?;
      }
      for &byte in &data.bytes {
        header.push(byte);
      }
    }

    if let Some(table) = &config.offsets {
      if table.base >= header.len() {
        return Err(Error::Header {
          key: "header.offsets.base",
          source: header::Error::CursorOutOfBounds {
            pos: table.base,
            size: header.len(),
          },
        });
      }
      header.set_table_base(table.base);
      header
        .set_offset_shift(table.shift)
        .map_err(wrap("header.offsets.shift"))?;
      header.set_reversed(table.reverse);
      for region in &table.regions {
        header.track_region(region.as_str());
      }
    }

    Ok(Some(header))
  }
}
