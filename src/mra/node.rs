//! The descriptor tree that MRA documents are built from.
//!
//! A [`Node`] is an element with an ordered attribute list, ordered children
//! and an optional text value, or a comment. Trees are only ever appended to;
//! the finished tree is rendered with [`Display`], indenting four spaces per
//! level.
//!
//! [`Node`]: struct.Node.html
//! [`Display`]: https://doc.rust-lang.org/std/fmt/trait.Display.html

use std::fmt;
use std::fmt::Write as _;
use std::io;

/// Values longer than this are moved onto their own line.
const LONG_VALUE: usize = 80;

/// The indentation added for each level of nesting.
const INDENT: usize = 4;

/// One node of a descriptor tree.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Node {
  tag: String,
  value: String,
  attrs: Vec<(String, String)>,
  children: Vec<Node>,
  is_comment: bool,
}

impl Node {
  /// Creates an empty element named `tag`.
  pub fn new(tag: impl Into<String>) -> Self {
    Self {
      tag: tag.into(),
      value: String::new(),
      attrs: Vec::new(),
      children: Vec::new(),
      is_comment: false,
    }
  }

  /// Creates an element named `tag` holding the text `value`.
  pub fn with_value(tag: impl Into<String>, value: impl Into<String>) -> Self {
    let mut node = Self::new(tag);
    node.value = value.into();
    node
  }

  /// Creates a comment node.
  pub fn comment(text: impl Into<String>) -> Self {
    let mut node = Self::new(text);
    node.is_comment = true;
    node
  }

  /// Appends an attribute, builder-style.
  pub fn attr(mut self, key: impl Into<String>, value: impl ToString) -> Self {
    self.set_attr(key, value);
    self
  }

  /// Appends an attribute.
  ///
  /// Attributes render in the order they were added.
  pub fn set_attr(&mut self, key: impl Into<String>, value: impl ToString) {
    self.attrs.push((key.into(), value.to_string()));
  }

  /// Appends `node` as the last child, returning a reference to it.
  pub fn add(&mut self, node: Node) -> &mut Node {
    let idx = self.children.len();
    self.children.push(node);
    &mut self.children[idx]
  }

  /// Appends a comment as the last child.
  pub fn add_comment(&mut self, text: impl Into<String>) {
    self.children.push(Node::comment(text));
  }

  /// Appends every node in `nodes`, in order.
  pub fn extend(&mut self, nodes: impl IntoIterator<Item = Node>) {
    self.children.extend(nodes)
  }

  /// Returns the tag name, or the text of a comment.
  pub fn tag(&self) -> &str {
    &self.tag
  }

  /// Returns the text value.
  pub fn value(&self) -> &str {
    &self.value
  }

  /// Returns true if this node is a comment.
  pub fn is_comment(&self) -> bool {
    self.is_comment
  }

  /// Returns the children of this node, in insertion order.
  pub fn children(&self) -> &[Node] {
    &self.children
  }

  /// Looks up the value of the first attribute named `key`.
  pub fn get(&self, key: &str) -> Option<&str> {
    self
      .attrs
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, v)| v.as_str())
  }

  /// Returns the first child element named `tag`.
  pub fn find(&self, tag: &str) -> Option<&Node> {
    self.children.iter().find(|c| !c.is_comment && c.tag == tag)
  }

  /// Writes this tree to `w`.
  pub fn write_to(&self, mut w: impl io::Write) -> io::Result<()> {
    write!(w, "{}", self)
  }

  fn fmt_indented(&self, indent: usize, f: &mut impl fmt::Write) -> fmt::Result {
    for _ in 0..indent {
      f.write_char(' ')?;
    }

    if self.is_comment {
      return writeln!(f, "<!-- {} -->", self.tag);
    }

    write!(f, "<{}", self.tag)?;
    for (key, value) in &self.attrs {
      write!(f, " {}=\"{}\"", key, Escaped(value))?;
    }

    if !self.children.is_empty() {
      writeln!(f, ">")?;
      for child in &self.children {
        child.fmt_indented(indent + INDENT, f)?;
      }
      for _ in 0..indent {
        f.write_char(' ')?;
      }
    } else if self.value.is_empty() && self.attrs.is_empty() {
      return writeln!(f, "/>");
    } else {
      write!(f, ">")?;
      let long = self.value.len() > LONG_VALUE;
      if long {
        writeln!(f)?;
      }
      write!(f, "{}", Escaped(&self.value))?;
      if long {
        writeln!(f)?;
      }
      if self.value.contains('\n') {
        if !long {
          writeln!(f)?;
        }
        for _ in 0..indent {
          f.write_char(' ')?;
        }
      }
    }
    writeln!(f, "</{}>", self.tag)
  }
}

impl fmt::Display for Node {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    self.fmt_indented(0, f)
  }
}

/// Escapes the XML metacharacters in a value.
struct Escaped<'a>(&'a str);

impl fmt::Display for Escaped<'_> {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    for c in self.0.chars() {
      match c {
        '&' => f.write_str("&amp;")?,
        '<' => f.write_str("&lt;")?,
        '>' => f.write_str("&gt;")?,
        '"' => f.write_str("&quot;")?,
        c => f.write_char(c)?,
      }
    }
    Ok(())
  }
}
