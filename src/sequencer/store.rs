//! Event stores
//!
//! The sequencer never owns song bytes. It keeps a cursor and asks an
//! [`EventStore`] for the record at that offset.

use std::io::{self, Read, Seek, SeekFrom};

/// Addressable byte source holding a song
pub trait EventStore {
    /// Number of readable bytes; a record crossing this is an overrun
    fn bound(&self) -> usize;

    /// Fill `buf` with the bytes starting at `offset`
    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> io::Result<()>;
}

impl<S: EventStore + ?Sized> EventStore for &mut S {
    fn bound(&self) -> usize {
        (**self).bound()
    }

    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_at(offset, buf)
    }
}

/// Song held in addressable memory (ROM, RAM, `include_bytes!`)
#[derive(Debug, Clone, Copy)]
pub struct SliceStore<'a> {
    data: &'a [u8],
}

impl<'a> SliceStore<'a> {
    /// Wrap a byte slice
    pub const fn new(data: &'a [u8]) -> Self {
        SliceStore { data }
    }

    /// Underlying bytes
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}

impl EventStore for SliceStore<'_> {
    fn bound(&self) -> usize {
        self.data.len()
    }

    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> io::Result<()> {
        let bytes = offset
            .checked_add(buf.len())
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        buf.copy_from_slice(bytes);
        Ok(())
    }
}

/// Song read through a seekable reader (a file on a host, a streamed asset)
#[derive(Debug)]
pub struct ReaderStore<R> {
    reader: R,
    len: usize,
    position: usize,
}

impl<R: Read + Seek> ReaderStore<R> {
    /// Wrap `reader`; its length is measured once here
    pub fn new(mut reader: R) -> io::Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        Ok(ReaderStore {
            reader,
            len: usize::try_from(len).unwrap_or(usize::MAX),
            position: 0,
        })
    }

    /// Release the reader
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read + Seek> EventStore for ReaderStore<R> {
    fn bound(&self) -> usize {
        self.len
    }

    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> io::Result<()> {
        // sequential playback never seeks except when looping
        if offset != self.position {
            self.position = usize::MAX;
            self.reader.seek(SeekFrom::Start(offset as u64))?;
        }
        match self.reader.read_exact(buf) {
            Ok(()) => {
                self.position = offset + buf.len();
                Ok(())
            }
            Err(err) => {
                self.position = usize::MAX;
                Err(err)
            }
        }
    }
}
