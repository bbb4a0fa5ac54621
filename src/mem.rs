use crate::types::Address;
use std::io;

/// Byte source backing a handle.
///
/// For a dead target this is the captured image, addressed by file offset.
/// For a live target it is a kernel-memory device, addressed directly by
/// kernel address.
pub trait MemSource {
    /// pread-style exact read: fill `buf` from `offset` or fail.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// One-shot kernel-table snapshot starting at `head`, filling `buf` with
    /// as many records as fit. Returns the number of bytes written.
    ///
    /// Only live sources answer this; the default refuses.
    fn table_snapshot(&mut self, head: Address, buf: &mut [u8]) -> io::Result<usize> {
        let _ = (head, buf);
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "no kernel table source",
        ))
    }
}

#[cfg(unix)]
impl MemSource for std::fs::File {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        use std::os::unix::fs::FileExt;
        FileExt::read_exact_at(self, buf, offset)
    }
}
