use crate::schema::DecodedRecord;
use std::io::Write;

/// Receives decoded records one at a time, in walk order.
pub trait RecordSink {
  fn emit(&mut self, record: DecodedRecord) -> crate::Result<()>;
}

/// Writes each record as one `path,key[=value]` line.
pub struct LineSink<W: Write> {
  w: W,
  lines: u64,
}

impl<W: Write> LineSink<W> {
  pub fn new(w: W) -> LineSink<W> {
    LineSink { w, lines: 0 }
  }

  /// The number of lines written so far.
  pub fn lines(&self) -> u64 {
    self.lines
  }

  pub fn flush(&mut self) -> crate::Result<()> {
    self.w.flush()?;
    Ok(())
  }

  pub fn into_inner(self) -> W {
    self.w
  }
}

impl<W: Write> RecordSink for LineSink<W> {
  fn emit(&mut self, record: DecodedRecord) -> crate::Result<()> {
    writeln!(self.w, "{}", record)?;
    self.lines += 1;
    Ok(())
  }
}

// collects records in memory for assertions
#[cfg(test)]
impl RecordSink for Vec<DecodedRecord> {
  fn emit(&mut self, record: DecodedRecord) -> crate::Result<()> {
    self.push(record);
    Ok(())
  }
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
  fn emit(&mut self, record: DecodedRecord) -> crate::Result<()> {
    (**self).emit(record)
  }
}
