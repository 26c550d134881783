//! The ROM header: a small, fixed-size prefix of the layout.
//!
//! A header carries arbitrary bytes pushed in by the configuration, plus an
//! optional table of 16-bit region offsets. Each tracked region owns one slot
//! of the table, in tracking order, and a final slot holds the offset just
//! past the last byte of the layout (the `"EOF"` entry). Offsets are
//! quantized by a right shift before they are stored.

/// The name of the synthetic entry recording the end of the layout.
pub const EOF: &str = "EOF";

/// An error produced while building or filling a header.
#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum Error {
  /// The requested size is zero or larger than `HeaderTable::MAX_LEN`.
  #[error("header size {size} is not within 1..=128")]
  BadSize {
    /// The requested size.
    size: usize,
  },
  /// The cursor was moved outside the header.
  #[error("header position {pos} is outside a {size}-byte header")]
  CursorOutOfBounds {
    /// The requested position.
    pos: usize,
    /// The size of the header.
    size: usize,
  },
  /// The offset shift is wider than a table entry.
  #[error("offset shift of {bits} bits exceeds 16")]
  BadShift {
    /// The requested shift.
    bits: u32,
  },
  /// A table slot falls outside the header.
  #[error("offset slot for `{name}` at {pos} is outside a {size}-byte header")]
  SlotOutOfBounds {
    /// The region whose offset was being recorded.
    name: String,
    /// The position of the slot.
    pos: usize,
    /// The size of the header.
    size: usize,
  },
  /// A quantized offset does not fit in a table entry.
  #[error("offset of `{name}` is 0x{value:X} after shifting, which exceeds 0xFFFF")]
  OffsetOverflow {
    /// The region whose offset was being recorded.
    name: String,
    /// The shifted offset.
    value: u32,
  },
}

/// A fixed-size header buffer with an embedded offset table.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct HeaderTable {
  bytes: Vec<u8>,
  cursor: usize,
  table_base: usize,
  shift: u32,
  reversed: bool,
  tracked: Vec<String>,
}

impl HeaderTable {
  /// The largest header supported.
  pub const MAX_LEN: usize = 128;

  /// Creates a header of `size` bytes, each set to `fill`.
  pub fn new(size: usize, fill: u8) -> Result<Self, Error> {
    if size == 0 || size > Self::MAX_LEN {
      return Err(Error::BadSize { size });
    }
    Ok(Self {
      bytes: vec![fill; size],
      cursor: 0,
      table_base: 0,
      shift: 0,
      reversed: false,
      tracked: Vec::new(),
    })
  }

  /// Returns the size of the header, in bytes.
  pub fn len(&self) -> usize {
    self.bytes.len()
  }

  /// Returns the contents of the header.
  pub fn bytes(&self) -> &[u8] {
    &self.bytes
  }

  /// Writes `byte` at the cursor and advances it.
  ///
  /// Pushing past the end of the header does nothing.
  pub fn push(&mut self, byte: u8) {
    if let Some(slot) = self.bytes.get_mut(self.cursor) {
      *slot = byte;
      self.cursor += 1;
    }
  }

  /// Moves the cursor to `pos`.
  pub fn set_cursor(&mut self, pos: usize) -> Result<(), Error> {
    if pos >= self.bytes.len() {
      return Err(Error::CursorOutOfBounds {
        pos,
        size: self.bytes.len(),
      });
    }
    self.cursor = pos;
    Ok(())
  }

  /// Sets the position of the first slot of the offset table.
  pub fn set_table_base(&mut self, base: usize) {
    self.table_base = base;
  }

  /// Sets the number of bits recorded offsets are shifted right by.
  pub fn set_offset_shift(&mut self, bits: u32) -> Result<(), Error> {
    if bits > 16 {
      return Err(Error::BadShift { bits });
    }
    self.shift = bits;
    Ok(())
  }

  /// Selects the byte order of table entries: low byte first by default, high
  /// byte first when `reversed`.
  pub fn set_reversed(&mut self, reversed: bool) {
    self.reversed = reversed;
  }

  /// Assigns the next table slot to the region `name`.
  pub fn track_region(&mut self, name: impl Into<String>) {
    self.tracked.push(name.into());
  }

  /// Returns the names of the tracked regions, in slot order.
  pub fn tracked(&self) -> &[String] {
    &self.tracked
  }

  /// Returns the table slot of `name`, if it has one.
  ///
  /// `"EOF"` always has a slot, right after the last tracked region.
  pub fn slot(&self, name: &str) -> Option<usize> {
    self
      .tracked
      .iter()
      .position(|t| t == name)
      .or_else(|| Some(self.tracked.len()).filter(|_| name == EOF))
  }

  /// Returns the byte position of the slot for `name`, if it has one.
  pub fn slot_pos(&self, name: &str) -> Option<usize> {
    self.slot(name).map(|idx| self.table_base + idx * 2)
  }

  /// Records `offset` in the table slot of `name`.
  ///
  /// Returns `Ok(Some(pos))` with the position written to, or `Ok(None)` if
  /// `name` is not tracked. Nothing is written if the slot lies outside the
  /// header or the shifted offset exceeds 16 bits.
  pub fn record_offset(
    &mut self,
    name: &str,
    offset: u32,
  ) -> Result<Option<usize>, Error> {
    let pos = match self.slot_pos(name) {
      Some(pos) => pos,
      None => return Ok(None),
    };
    if pos + 1 >= self.bytes.len() {
      return Err(Error::SlotOutOfBounds {
        name: name.to_string(),
        pos,
        size: self.bytes.len(),
      });
    }

    let shifted = offset >> self.shift;
    if shifted > u32::from(u16::MAX) {
      return Err(Error::OffsetOverflow {
        name: name.to_string(),
        value: shifted,
      });
    }

    let value = shifted as u16;
    let bytes = if self.reversed {
      value.to_be_bytes()
    } else {
      value.to_le_bytes()
    };
    self.bytes[pos..pos + 2].copy_from_slice(&bytes);
    Ok(Some(pos))
  }

  /// Renders the header as upper-case hex, eight bytes per line.
  pub fn render(&self) -> String {
    self
      .bytes
      .chunks(8)
      .map(|line| {
        line
          .iter()
          .map(|b| format!("{:02X}", b))
          .collect::<Vec<_>>()
          .join(" ")
      })
      .collect::<Vec<_>>()
      .join("\n")
  }
}
