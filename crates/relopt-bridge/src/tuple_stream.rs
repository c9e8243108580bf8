//! # Pull Tuple Stream
//!
//! An external execution engine consumes rows produced on this side by handing over a
//! buffer and asking for it to be filled. [`PullTupleStream`] answers those requests:
//! it pulls rows from a [`RowSource`], marshals each with a [`TupleWriter`] and stops
//! when the buffer is full or the source is exhausted.
//!
//! ## Look-ahead Row
//!
//! A row that does not fit in the remaining space is kept and written first on the
//! next call, so no row is lost or duplicated across buffers. A call that writes
//! nothing means the source is exhausted. A row too large for an empty buffer is an
//! error rather than an exhaustion signal.
//!
//! ## Wire Format
//!
//! [`NativeTupleWriter`] is the reference writer. Numbers are in native byte order,
//! since the consumer runs in the same process:
//!
//! ```text
//! row   := u16 field_count, field*
//! field := u8 tag, payload
//!          tag 0 NULL     (no payload)
//!          tag 1 BOOL     u8
//!          tag 2 INT64    i64
//!          tag 3 FLOAT64  f64
//!          tag 4 UTF8     u32 byte_length, bytes
//! ```

use crate::error::{BridgeError, Result};
use bytes::BufMut;
use tracing::trace;

/// A restartable, lazily produced sequence of rows.
pub trait RowSource {
    type Row;

    /// The next row, or `None` once the sequence is exhausted.
    fn next_row(&mut self) -> Option<Self::Row>;

    /// Rewind to the first row.
    fn restart(&mut self);
}

/// Serializes one row into a byte buffer.
pub trait TupleWriter<R> {
    /// Write `row` at the start of `buf` and return the number of bytes written, or
    /// `None` (writing nothing) if the row does not fit.
    fn marshal(&mut self, row: &R, buf: &mut [u8]) -> Option<usize>;
}

/// Row source over an in-memory vector.
#[derive(Debug, Clone)]
pub struct VecRowSource<R> {
    rows: Vec<R>,
    pos: usize,
}

impl<R> VecRowSource<R> {
    pub fn new(rows: Vec<R>) -> Self {
        Self { rows, pos: 0 }
    }
}

impl<R: Clone> RowSource for VecRowSource<R> {
    type Row = R;

    fn next_row(&mut self) -> Option<R> {
        let row = self.rows.get(self.pos)?.clone();
        self.pos += 1;
        Some(row)
    }

    fn restart(&mut self) {
        self.pos = 0;
    }
}

/// Row source that re-creates an iterator on restart. The iterator may be unbounded.
pub struct IterRowSource<F, I> {
    make: F,
    iter: I,
}

impl<F, I> IterRowSource<F, I>
where
    F: FnMut() -> I,
    I: Iterator,
{
    pub fn new(mut make: F) -> Self {
        let iter = make();
        Self { make, iter }
    }
}

impl<F, I> RowSource for IterRowSource<F, I>
where
    F: FnMut() -> I,
    I: Iterator,
{
    type Row = I::Item;

    fn next_row(&mut self) -> Option<I::Item> {
        self.iter.next()
    }

    fn restart(&mut self) {
        self.iter = (self.make)();
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

impl Datum {
    const TAG_NULL: u8 = 0;
    const TAG_BOOL: u8 = 1;
    const TAG_INT64: u8 = 2;
    const TAG_FLOAT64: u8 = 3;
    const TAG_UTF8: u8 = 4;

    fn encoded_len(&self) -> usize {
        1 + match self {
            Datum::Null => 0,
            Datum::Bool(_) => 1,
            Datum::Int64(_) | Datum::Float64(_) => 8,
            Datum::Utf8(s) => 4 + s.len(),
        }
    }
}

/// Reference [`TupleWriter`] for rows of [`Datum`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeTupleWriter;

impl NativeTupleWriter {
    /// Bytes needed to marshal `row`, or `None` if it cannot be represented (more
    /// than `u16::MAX` fields or a string longer than `u32::MAX` bytes).
    pub fn encoded_len(row: &[Datum]) -> Option<usize> {
        if row.len() > usize::from(u16::MAX) {
            return None;
        }
        row.iter().try_fold(2usize, |acc, datum| {
            if let Datum::Utf8(s) = datum {
                u32::try_from(s.len()).ok()?;
            }
            acc.checked_add(datum.encoded_len())
        })
    }
}

impl TupleWriter<Vec<Datum>> for NativeTupleWriter {
    fn marshal(&mut self, row: &Vec<Datum>, buf: &mut [u8]) -> Option<usize> {
        let len = Self::encoded_len(row)?;
        if len > buf.len() {
            return None;
        }
        let mut out = &mut buf[..len];
        out.put_u16_ne(row.len() as u16);
        for datum in row {
            match datum {
                Datum::Null => out.put_u8(Datum::TAG_NULL),
                Datum::Bool(b) => {
                    out.put_u8(Datum::TAG_BOOL);
                    out.put_u8(u8::from(*b));
                }
                Datum::Int64(v) => {
                    out.put_u8(Datum::TAG_INT64);
                    out.put_i64_ne(*v);
                }
                Datum::Float64(v) => {
                    out.put_u8(Datum::TAG_FLOAT64);
                    out.put_f64_ne(*v);
                }
                Datum::Utf8(s) => {
                    out.put_u8(Datum::TAG_UTF8);
                    out.put_u32_ne(s.len() as u32);
                    out.put_slice(s.as_bytes());
                }
            }
        }
        Some(len)
    }
}

/// Fills caller-owned buffers with marshaled rows on demand.
pub struct PullTupleStream<S: RowSource, W> {
    source: S,
    writer: W,
    pending: Option<S::Row>,
}

impl<S, W> PullTupleStream<S, W>
where
    S: RowSource,
    W: TupleWriter<S::Row>,
{
    pub fn new(source: S, writer: W) -> Self {
        Self {
            source,
            writer,
            pending: None,
        }
    }

    /// Marshal as many rows as fit into `buf`, starting with the look-ahead row.
    ///
    /// Returns the number of bytes written; `0` means the source is exhausted.
    pub fn fill_buffer(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut written = 0;
        let mut rows = 0usize;
        loop {
            let Some(row) = self.pending.take().or_else(|| self.source.next_row()) else {
                break;
            };
            match self.writer.marshal(&row, &mut buf[written..]) {
                Some(n) => {
                    written += n;
                    rows += 1;
                }
                None => {
                    self.pending = Some(row);
                    if written == 0 {
                        return Err(BridgeError::RowTooLarge {
                            capacity: buf.len(),
                        });
                    }
                    break;
                }
            }
        }
        trace!(rows, bytes = written, capacity = buf.len(), "filled tuple buffer");
        Ok(written)
    }

    /// Rewind the source and drop the look-ahead row.
    pub fn restart(&mut self) {
        self.source.restart();
        self.pending = None;
    }

    pub fn into_parts(self) -> (S, W) {
        (self.source, self.writer)
    }
}
