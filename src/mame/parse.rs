//! The `mame -listxml` reader.
//!
//! The listing is parsed with a small PEG grammar into a lightweight element
//! tree, one `<machine>` at a time, which is then lowered into [`Machine`]s.
//!
//! [`Machine`]: ../struct.Machine.html

use std::borrow::Cow;

use pest::iterators::Pair;
use pest_derive::Parser;

use crate::error;
use crate::int;
use crate::int::Radix;
use crate::mame::Chip;
use crate::mame::Machine;
use crate::mame::Region;
use crate::mame::Switch;
use crate::mame::SwitchValue;

#[derive(Parser)]
#[grammar = "mame/grammar.pest"]
struct XmlParser;

/// A parsing error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The text is not well-formed, as far as the grammar is concerned.
  #[error("malformed listing: {0}")]
  Syntax(String),
  /// An element was closed with the wrong tag.
  #[error("line {line}: <{open}> closed by </{close}>")]
  MismatchedTag {
    /// The name of the open element.
    open: String,
    /// The name in the closing tag.
    close: String,
    /// The line of the opening tag.
    line: usize,
  },
  /// A required attribute was missing.
  #[error("line {line}: <{element}> is missing `{attr}`")]
  MissingAttr {
    /// The element the attribute belongs to.
    element: String,
    /// The attribute name.
    attr: &'static str,
    /// The line of the element.
    line: usize,
  },
  /// A numeric attribute did not hold a number.
  #[error("line {line}: `{attr}=\"{value}\"` is not a number")]
  BadInt {
    /// The attribute name.
    attr: &'static str,
    /// The offending text.
    value: String,
    /// The line of the element.
    line: usize,
  },
}

impl error::Error for Error {
  fn cause(&self) -> error::Cause<'_> {
    error::Cause::Listing
  }

  fn action(&self) -> Option<error::Action> {
    Some(error::Action::Parsing)
  }
}

/// A parsed XML element.
struct Element<'a> {
  name: &'a str,
  line: usize,
  attrs: Vec<(&'a str, Cow<'a, str>)>,
  children: Vec<Element<'a>>,
  text: String,
}

impl<'a> Element<'a> {
  fn from_pair(pair: Pair<'a, Rule>) -> Result<Self, Error> {
    let (line, _) = pair.as_span().start_pos().line_col();
    let mut inner = pair.into_inner();
    let name = match inner.next() {
      Some(name) => name.as_str(),
      None => return Err(Error::Syntax(format!("line {}: empty tag", line))),
    };

    let mut element = Element {
      name,
      line,
      attrs: Vec::new(),
      children: Vec::new(),
      text: String::new(),
    };
    for pair in inner {
      match pair.as_rule() {
        Rule::Attribute => {
          let mut parts = pair.into_inner();
          let key = parts.next().map(|p| p.as_str()).unwrap_or_default();
          let value = parts.next().map(|p| p.as_str()).unwrap_or_default();
          element.attrs.push((key, unescape(value)));
        }
        Rule::Element => element.children.push(Element::from_pair(pair)?),
        Rule::Text => element.text.push_str(&unescape(pair.as_str())),
        Rule::Cdata => {
          if let Some(text) = pair.into_inner().next() {
            element.text.push_str(text.as_str());
          }
        }
        Rule::Name if pair.as_str() != name => {
          return Err(Error::MismatchedTag {
            open: name.to_string(),
            close: pair.as_str().to_string(),
            line,
          })
        }
        _ => {}
      }
    }
    Ok(element)
  }

  fn attr(&self, key: &str) -> Option<&str> {
    self
      .attrs
      .iter()
      .find(|(k, _)| *k == key)
      .map(|(_, v)| v.as_ref())
  }

  fn required(&self, key: &'static str) -> Result<&str, Error> {
    self.attr(key).ok_or_else(|| Error::MissingAttr {
      element: self.name.to_string(),
      attr: key,
      line: self.line,
    })
  }

  fn int(&self, key: &'static str, radix: Radix) -> Result<Option<u32>, Error> {
    match self.attr(key) {
      None => Ok(None),
      Some(text) => int::parse(text, radix).map(Some).ok_or_else(|| {
        Error::BadInt {
          attr: key,
          value: text.to_string(),
          line: self.line,
        }
      }),
    }
  }

  fn is(&self, key: &str, value: &str) -> bool {
    self.attr(key) == Some(value)
  }

  fn children<'s>(
    &'s self,
    name: &'static str,
  ) -> impl Iterator<Item = &'s Element<'a>> + 's {
    self.children.iter().filter(move |c| c.name == name)
  }

  fn child_text(&self, name: &'static str) -> Option<&str> {
    self.children(name).next().map(|c| c.text.trim())
  }
}

/// Parses a `mame -listxml` document into its runnable machines.
///
/// Devices, BIOS sets and non-runnable entries are skipped, as are ROMs that
/// have no dump.
pub fn parse(text: &str) -> Result<Vec<Machine>, Error> {
  use pest::Parser;
  let file = XmlParser::parse(Rule::File, text)
    .map_err(|e| Error::Syntax(e.to_string()))?
    .next()
    .ok_or_else(|| Error::Syntax("empty document".to_string()))?;

  let root = match file.into_inner().find(|p| p.as_rule() == Rule::Element) {
    Some(root) => root,
    None => return Err(Error::Syntax("no root element".to_string())),
  };

  // Lower one machine at a time, so that the element tree for a full listing
  // never exists all at once.
  let mut machines = Vec::new();
  for pair in root.into_inner() {
    if pair.as_rule() != Rule::Element {
      continue;
    }
    let element = Element::from_pair(pair)?;
    if element.name != "machine" && element.name != "game" {
      continue;
    }
    if let Some(machine) = lower_machine(&element)? {
      machines.push(machine);
    }
  }
  Ok(machines)
}

fn lower_machine(el: &Element) -> Result<Option<Machine>, Error> {
  if el.is("isdevice", "yes") || el.is("isbios", "yes") || el.is("runnable", "no")
  {
    return Ok(None);
  }

  let mut machine = Machine::new(el.required("name")?);
  machine.clone_of = el.attr("cloneof").map(str::to_string);
  if let Some(desc) = el.child_text("description") {
    machine.display_name = desc.to_string();
  }
  machine.year = el.child_text("year").unwrap_or_default().to_string();
  machine.manufacturer =
    el.child_text("manufacturer").unwrap_or_default().to_string();

  if let Some(display) = el.children("display").next() {
    machine.rotation = display.int("rotate", Radix::Dec)?.unwrap_or(0);
  }
  if let Some(input) = el.children("input").next() {
    machine.players = input.int("players", Radix::Dec)?.unwrap_or(0);
    machine.buttons = input.int("buttons", Radix::Dec)?.unwrap_or(0);
    for control in input.children("control") {
      let buttons = control.int("buttons", Radix::Dec)?.unwrap_or(0);
      machine.buttons = machine.buttons.max(buttons);
    }
  }

  for rom in el.children("rom") {
    if rom.is("status", "nodump") {
      continue;
    }
    let crc = match rom.attr("crc") {
      Some(crc) => crc.to_lowercase(),
      None => continue,
    };
    let chip = Chip {
      name: rom.required("name")?.to_string(),
      crc,
      offset: rom.int("offset", Radix::Hex)?.unwrap_or(0),
      size: rom.int("size", Radix::Dec)?.unwrap_or(0),
    };

    let region_name = rom.attr("region").unwrap_or("rom");
    match machine.regions.iter_mut().find(|r| r.name == region_name) {
      Some(region) => region.chips.push(chip),
      None => {
        let mut region = Region::new(region_name);
        region.chips.push(chip);
        machine.regions.push(region);
      }
    }
  }

  for dip in el.children("dipswitch") {
    let mut values = Vec::new();
    for value in dip.children("dipvalue") {
      values.push(SwitchValue {
        label: value.required("name")?.to_string(),
        value: value.int("value", Radix::Dec)?.unwrap_or(0),
      });
    }
    values.sort_by_key(|v| v.value);

    machine.switches.push(Switch {
      name: dip.required("name")?.to_string(),
      tag: dip.attr("tag").unwrap_or_default().to_string(),
      mask: dip.int("mask", Radix::Dec)?.unwrap_or(0),
      values,
    });
  }

  Ok(Some(machine))
}

/// Decodes the predefined XML entities and numeric character references.
fn unescape(text: &str) -> Cow<'_, str> {
  if !text.contains('&') {
    return Cow::Borrowed(text);
  }

  let mut out = String::with_capacity(text.len());
  let mut rest = text;
  while let Some(amp) = rest.find('&') {
    out.push_str(&rest[..amp]);
    rest = &rest[amp..];
    let end = match rest.find(';') {
      Some(end) => end,
      None => break,
    };
    let entity = &rest[1..end];
    let decoded = match entity {
      "amp" => Some('&'),
      "lt" => Some('<'),
      "gt" => Some('>'),
      "quot" => Some('"'),
      "apos" => Some('\''),
      _ => entity
        .strip_prefix("#x")
        .and_then(|hex| u32::from_str_radix(hex, 16).ok())
        .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
        .and_then(std::char::from_u32),
    };
    match decoded {
      Some(c) => {
        out.push(c);
        rest = &rest[end + 1..];
      }
      None => {
        out.push('&');
        rest = &rest[1..];
      }
    }
  }
  out.push_str(rest);
  Cow::Owned(out)
}
