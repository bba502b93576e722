//! Trace stream framing.
//!
//! The original ships a record/replay tool (`trace.c`/`trace_stream.c`) that logs every public
//! call and its arguments for later playback. The CLI tool itself is out of scope here; this
//! module only implements the on-disk stream framing, so a host (or a test) can record a
//! sequence of operations and read them back.
//!
//! `trace_stream_write_uint` in the original writes a narrower width than its reader expects on
//! one code path; this implementation always writes/reads a plain 4-byte `u32`, fixing that
//! mismatch rather than preserving it — there is no existing trace file to stay binary-compatible
//! with.

use std::io::{self, Read, Write};

/// One recorded call: an operation tag plus its string and integer arguments.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TraceRecord {
    pub op: u32,
    pub args: Vec<u32>,
    pub text: String,
}

fn write_u32<W: Write>(w: &mut W, value: u32) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Appends records to an underlying writer.
pub struct TraceWriter<W: Write> {
    inner: W,
}

impl<W: Write> TraceWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write_record(&mut self, record: &TraceRecord) -> io::Result<()> {
        write_u32(&mut self.inner, record.op)?;
        write_u32(&mut self.inner, record.args.len() as u32)?;
        for arg in &record.args {
            write_u32(&mut self.inner, *arg)?;
        }
        let text_bytes = record.text.as_bytes();
        write_u32(&mut self.inner, text_bytes.len() as u32)?;
        self.inner.write_all(text_bytes)?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads records back from an underlying reader, one at a time.
pub struct TraceReader<R: Read> {
    inner: R,
}

impl<R: Read> TraceReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Reads the next record, or `Ok(None)` at a clean end of stream.
    pub fn read_record(&mut self) -> io::Result<Option<TraceRecord>> {
        let op = match read_u32(&mut self.inner) {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        };
        let arg_count = read_u32(&mut self.inner)?;
        let mut args = Vec::with_capacity(arg_count as usize);
        for _ in 0..arg_count {
            args.push(read_u32(&mut self.inner)?);
        }
        let text_len = read_u32(&mut self.inner)? as usize;
        let mut text_bytes = vec![0u8; text_len];
        self.inner.read_exact(&mut text_bytes)?;
        let text = String::from_utf8_lossy(&text_bytes).into_owned();
        Ok(Some(TraceRecord { op, args, text }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_roundtrip_through_a_stream() {
        let mut buffer = Vec::new();
        {
            let mut writer = TraceWriter::new(&mut buffer);
            writer
                .write_record(&TraceRecord {
                    op: 1,
                    args: vec![42, 7],
                    text: "/a/b.txt".to_string(),
                })
                .unwrap();
        }

        let mut reader = TraceReader::new(buffer.as_slice());
        let record = reader.read_record().unwrap().expect("one record");
        assert_eq!(record.op, 1);
        assert_eq!(record.args, vec![42, 7]);
        assert_eq!(record.text, "/a/b.txt");
        assert!(reader.read_record().unwrap().is_none());
    }
}
