//! Diagnostic printing facilities.
//!
//! These functions are used to simplify the display of the various errors and
//! warnings produced while converting a MAME listing. The [`Error`] trait
//! describes how a Rust error type can be converted into a simple diagnostic.
//!
//! [`Error`]: trait.Error.html

use std::fmt;
use std::io;
use std::path::Path;

/// An error which can be described as a diagnostic.
///
/// Types that implement `Error` must also implement [`std::fmt::Display`]. For
/// the user-displayed error to look right, this implementation should only be
/// one line long.
///
/// [`std::fmt::Display`]: https://doc.rust-lang.org/std/fmt/trait.Display.html
pub trait Error: fmt::Debug + fmt::Display {
  /// Returns a `Cause` describing the input that resulted in the error.
  fn cause(&self) -> Cause<'_>;
  /// Returns an action this error is associated with, if any at all.
  fn action(&self) -> Option<Action>;
}

/// How serious a collection of diagnostics is.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Severity {
  /// The diagnostics abort the current machine, or the whole run.
  Error,
  /// The diagnostics are informational; processing continued.
  Warning,
}

impl Severity {
  fn label(self) -> &'static str {
    match self {
      Self::Error => "error",
      Self::Warning => "warning",
    }
  }
}

/// A collection of errors that may built up over the course of an action.
///
/// The type parameter `E` should be a type implementing [`Error`].
///
/// [`Error`]: trait.Error.html
#[derive(Clone, Debug)]
pub struct Errors<E>(Vec<E>);

impl<E> Errors<E> {
  /// Creates an empty `Errors`.
  pub fn new() -> Self {
    Errors(Vec::new())
  }

  /// Returns true if this `Errors` hasn't had any errors added yet.
  pub fn is_ok(&self) -> bool {
    self.0.is_empty()
  }

  /// Returns the number of errors collected so far.
  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// Adds a new error to this `Errors`.
  pub fn push(&mut self, error: E) {
    self.0.push(error);
  }

  /// Returns an iterator over the collected errors, in insertion order.
  pub fn iter(&self) -> impl Iterator<Item = &E> {
    self.0.iter()
  }
}

impl<E> Default for Errors<E> {
  fn default() -> Self {
    Self::new()
  }
}

impl<E> From<E> for Errors<E> {
  fn from(error: E) -> Self {
    Errors(vec![error])
  }
}

impl<E: Error> Errors<E> {
  /// Dumps this collection of errors as user-displayable text into `sink`.
  ///
  /// Returns `Ok(true)` if anything was written.
  pub fn dump_to(
    &self,
    severity: Severity,
    mut sink: impl io::Write,
  ) -> io::Result<bool> {
    if self.0.is_empty() {
      return Ok(false);
    }

    for (i, error) in self.0.iter().enumerate() {
      writeln!(sink, "{}: {}", severity.label(), error)?;
      let cause = error.cause();
      match error.action() {
        Some(action) => {
          writeln!(sink, "  while {} {}", action.describe(), cause)?
        }
        None => writeln!(sink, "  at {}", cause)?,
      }

      if i != self.0.len() - 1 {
        writeln!(sink)?;
      }
    }

    Ok(true)
  }

  /// Calls `dump_to()` on `stderr`, exiting the process with the given
  /// `exit_code` if any errors are present.
  pub fn dump_and_die(self, code: i32) {
    // Writing to stderr is fairly unlikely to fail, so panicking is a fine
    // response here.
    if self.dump_to(Severity::Error, io::stderr()).unwrap() {
      eprintln!();
      eprintln!("error: there were {} errors", self.0.len());
      std::process::exit(code)
    }
  }
}

/// The place where an error occured, to varrying degrees of specificity.
#[derive(Copy, Clone, Debug)]
pub enum Cause<'a> {
  /// A whole machine, named by its MAME set name.
  Machine(&'a str),
  /// A ROM region within a machine.
  Region {
    /// The set name of the machine.
    machine: &'a str,
    /// The name of the region.
    region: &'a str,
  },
  /// A DIP switch within a machine.
  Switch {
    /// The set name of the machine.
    machine: &'a str,
    /// The name of the switch.
    switch: &'a str,
  },
  /// A key in the configuration file.
  Config(&'a str),
  /// The MAME listing as a whole.
  Listing,
  /// A file, for when we don't know much about where the error came from
  /// within.
  File(&'a Path),
}

impl fmt::Display for Cause<'_> {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::Machine(name) => write!(f, "machine `{}`", name),
      Self::Region { machine, region } => {
        write!(f, "region `{}` of `{}`", region, machine)
      }
      Self::Switch { machine, switch } => {
        write!(f, "switch `{}` of `{}`", switch, machine)
      }
      Self::Config("") => write!(f, "the configuration"),
      Self::Config(key) => write!(f, "configuration key `{}`", key),
      Self::Listing => write!(f, "the MAME listing"),
      Self::File(path) => write!(f, "{}", path.display()),
    }
  }
}

/// An action that the converter performs, which an error may be associated
/// with.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Action {
  /// Reading the MAME listing into machines.
  Parsing,
  /// Loading and validating the configuration.
  Configuring,
  /// Computing the ROM layout of a machine.
  LayingOut,
  /// Computing DIP switch bit ranges.
  CompilingDips,
  /// Writing an MRA file.
  Writing,
}

impl Action {
  fn describe(self) -> &'static str {
    match self {
      Self::Parsing => "parsing",
      Self::Configuring => "loading",
      Self::LayingOut => "laying out",
      Self::CompilingDips => "compiling",
      Self::Writing => "writing",
    }
  }
}
