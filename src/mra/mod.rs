//! MiSTer ROM descriptors.
//!
//! An MRA document tells the MiSTer menu how to assemble a core's ROM image
//! out of a MAME zip, and how to present its DIP switches and buttons.
//! [`make_mra()`] builds one document per [`Machine`]; everything a machine
//! needs beyond what MAME lists comes from the [`Config`].
//!
//! [`make_mra()`]: fn.make_mra.html
//! [`Machine`]: ../mame/struct.Machine.html
//! [`Config`]: ../config/struct.Config.html

use std::fs::File;
use std::io;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;

use log::debug;

use crate::config;
use crate::config::Config;
use crate::error;
use crate::error::Errors;
use crate::int::Hex;
use crate::mame::Machine;

pub mod dip;
pub mod header;
pub mod layout;
pub mod node;

use node::Node;

/// The root element of every document.
pub const ROOT: &str = "misterromdescription";

/// The MiSTer gamepad buttons, in the order they are assigned.
const PAD_BUTTONS: &[&str] = &["A", "B", "X", "Y", "L", "R"];

/// An error that prevents a machine from being converted.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// A DIP switch could not be compiled.
  #[error("{source}")]
  Dip {
    /// The set name of the machine.
    machine: String,
    /// The underlying error.
    source: dip::Error,
  },
  /// The configuration does not describe a usable header.
  #[error("{source}")]
  Config {
    /// The set name of the machine.
    machine: String,
    /// The underlying error.
    source: config::Error,
  },
  /// The document could not be written.
  #[error("cannot write {}: {source}", path.display())]
  Write {
    /// The set name of the machine.
    machine: String,
    /// The file being written.
    path: PathBuf,
    /// The underlying error.
    source: io::Error,
  },
}

impl error::Error for Error {
  fn cause(&self) -> error::Cause<'_> {
    match self {
      Self::Dip { machine, source } => error::Cause::Switch {
        machine,
        switch: source.switch(),
      },
      Self::Config { machine, .. } => error::Cause::Machine(machine),
      Self::Write { path, .. } => error::Cause::File(path),
    }
  }

  fn action(&self) -> Option<error::Action> {
    Some(match self {
      Self::Dip { .. } => error::Action::CompilingDips,
      Self::Config { .. } => error::Action::Configuring,
      Self::Write { .. } => error::Action::Writing,
    })
  }
}

/// A finished descriptor.
#[derive(Clone, Debug)]
pub struct Mra {
  /// The set name of the machine.
  pub setname: String,
  /// The document.
  pub root: Node,
  /// The size of the laid-out ROM image, in bytes.
  pub len: u32,
  /// Layout problems that did not stop the conversion.
  pub warnings: Errors<layout::Warning>,
}

impl Mra {
  /// Returns the file name this descriptor is written to.
  pub fn file_name(&self) -> String {
    format!("{}.mra", self.setname)
  }

  /// Writes this descriptor into `dir`, returning the path written.
  pub fn write_to_dir(&self, dir: impl AsRef<Path>) -> Result<PathBuf, Error> {
    let path = dir.as_ref().join(self.file_name());
    let wrap = |source| Error::Write {
      machine: self.setname.clone(),
      path: path.clone(),
      source,
    };

    let mut w = io::BufWriter::new(File::create(&path).map_err(wrap)?);
    self.root.write_to(&mut w).map_err(wrap)?;
    w.flush().map_err(wrap)?;
    Ok(path)
  }
}

/// Builds the descriptor of `machine`.
pub fn make_mra(machine: &Machine, config: &Config) -> Result<Mra, Error> {
  let dips = dip::compile(&machine.switches, &config.dips).map_err(|source| {
    Error::Dip {
      machine: machine.id.clone(),
      source,
    }
  })?;
  let header = config.header_table().map_err(|source| Error::Config {
    machine: machine.id.clone(),
    source,
  })?;

  let layout = layout::lay_out(machine, &config.regions, header);
  for region in &layout.regions {
    debug!("{}: {}: {:?}", machine.id, region.name, region.outcome);
  }
  let mut warnings = Errors::new();
  for warning in layout.all_warnings() {
    warnings.push(warning.clone());
  }
  let len = layout.len;

  let mut root = Node::new(ROOT);
  root.add_comment(format!(
    "Generated by {} {} from the MAME listing",
    env!("CARGO_PKG_NAME"),
    env!("CARGO_PKG_VERSION")
  ));
  if let Some(about) = &config.about {
    let mut node = Node::new("about");
    for (key, value) in &[
      ("author", &about.author),
      ("webpage", &about.webpage),
      ("source", &about.source),
    ] {
      if let Some(value) = value {
        node.set_attr(*key, value);
      }
    }
    root.add(node);
  }
  root.add(Node::with_value("name", machine.display_name.as_str()));
  root.add(Node::with_value("setname", machine.id.as_str()));
  if let Some(parent) = &machine.clone_of {
    root.add(Node::with_value("parent", parent.as_str()));
  }
  if let Some(rbf) = &config.rbf {
    root.add(Node::with_value("rbf", rbf.as_str()));
  }
  root.add(Node::with_value("year", machine.year.as_str()));
  root.add(Node::with_value("manufacturer", machine.manufacturer.as_str()));

  root
    .add(
      Node::new("rom")
        .attr("index", 0)
        .attr("zip", zip_list(machine))
        .attr("md5", "None"),
    )
    .extend(layout.into_nodes());

  root
    .add(Node::new("rom").attr("index", 1))
    .add(Node::with_value("part", format!("{:02X}", mode_byte(machine))));

  if let Some(size) = config.nvram {
    root.add(Node::new("nvram").attr("index", 2).attr("size", size));
  }
  if let Some(switches) = dips.to_node() {
    root.add(switches);
  }
  root.add(buttons_node(machine, config.buttons.as_deref()));

  debug!("{}: {} bytes of ROM", machine.id, Hex(len));
  Ok(Mra {
    setname: machine.id.clone(),
    root,
    len,
    warnings,
  })
}

/// Lists the zip files the ROMs may be found in, the machine's own first.
fn zip_list(machine: &Machine) -> String {
  match &machine.clone_of {
    Some(parent) => format!("{}.zip|{}.zip", machine.id, parent),
    None => format!("{}.zip", machine.id),
  }
}

/// Packs the screen orientation: bit 0 is set for vertical screens, bit 1 for
/// flipped ones.
fn mode_byte(machine: &Machine) -> u8 {
  let vertical = machine.is_vertical() as u8;
  let flipped = (machine.rotation % 360 >= 180) as u8;
  vertical | flipped << 1
}

fn buttons_node(machine: &Machine, names: Option<&str>) -> Node {
  let count = (machine.buttons as usize).min(PAD_BUTTONS.len());
  let names = match names {
    Some(names) => names.to_string(),
    None => (1..=count)
      .map(|i| format!("Button {}", i))
      .chain(vec!["Start".to_string(), "Coin".to_string()])
      .collect::<Vec<_>>()
      .join(","),
  };
  let default = PAD_BUTTONS[..count]
    .iter()
    .chain(&["Start", "Select"])
    .copied()
    .collect::<Vec<_>>()
    .join(",");
  Node::new("buttons")
    .attr("names", names)
    .attr("default", default)
}
