//! Synthetic images and fake sources shared by the integration tests.
#![allow(dead_code)]

use kmemview::{Address, Arch, DumpHeader, MemSource};

use std::io;

pub const PAGE: u64 = 4096;

/// In-memory captured image that counts pread calls.
pub struct SnapshotSource {
    pub data: Vec<u8>,
    pub reads: usize,
}

impl SnapshotSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, reads: 0 }
    }
}

impl MemSource for SnapshotSource {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.reads += 1;
        let offset = offset as usize;
        if offset.checked_add(buf.len()).map_or(true, |end| end > self.data.len()) {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read past end of image",
            ));
        }
        buf.copy_from_slice(&self.data[offset..offset + buf.len()]);
        Ok(())
    }
}

/// Fake live kernel: direct reads against a flat address space plus a
/// canned table snapshot.
pub struct LiveSource {
    pub mem: Vec<u8>,
    pub table: Vec<u8>,
    pub reads: usize,
}

impl MemSource for LiveSource {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.reads += 1;
        let offset = offset as usize;
        if offset + buf.len() > self.mem.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "bad address"));
        }
        buf.copy_from_slice(&self.mem[offset..offset + buf.len()]);
        Ok(())
    }

    fn table_snapshot(&mut self, _head: Address, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.table.len().min(buf.len());
        buf[..n].copy_from_slice(&self.table[..n]);
        Ok(n)
    }
}

/// Builds a page-granular physical image, identity-mapped to file offsets.
pub struct DumpBuilder {
    pub data: Vec<u8>,
}

impl DumpBuilder {
    pub fn new(pages: usize) -> Self {
        Self {
            data: vec![0u8; pages * PAGE as usize],
        }
    }

    pub fn put_u64(&mut self, offset: u64, val: u64) {
        let offset = offset as usize;
        self.data[offset..offset + 8].copy_from_slice(&val.to_le_bytes());
    }

    pub fn put_u32(&mut self, offset: u64, val: u32) {
        let offset = offset as usize;
        self.data[offset..offset + 4].copy_from_slice(&val.to_le_bytes());
    }

    pub fn put_bytes(&mut self, offset: u64, bytes: &[u8]) {
        let offset = offset as usize;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// 64-bit table entry: `table[idx] = val`.
    pub fn entry64(&mut self, table: u64, idx: u64, val: u64) {
        self.put_u64(table + idx * 8, val);
    }

    /// 32-bit table entry: `table[idx] = val`.
    pub fn entry32(&mut self, table: u64, idx: u64, val: u32) {
        self.put_u32(table + idx * 4, val);
    }

    pub fn header(&self, arch: Arch, root: u64) -> DumpHeader {
        DumpHeader::new(arch, Address::new(root), Vec::new(), 0)
    }

    pub fn into_source(self) -> SnapshotSource {
        SnapshotSource::new(self.data)
    }
}

pub const PTE_V: u64 = 1;
pub const PTE_PS: u64 = 1 << 7;

/// Wire up an x64 4-level path: L4@0x2000, L3@0x3000, L2@0x4000, L1@0x5000,
/// with high-level indices taken from `va`.
pub fn map_x64_page(b: &mut DumpBuilder, va: u64, frame: u64) {
    let (l4, l3, l2, l1) = (0x2000, 0x3000, 0x4000, 0x5000);
    b.entry64(l4, (va >> 39) & 0x1ff, l3 | PTE_V);
    b.entry64(l3, (va >> 30) & 0x1ff, l2 | PTE_V);
    b.entry64(l2, (va >> 21) & 0x1ff, l1 | PTE_V);
    b.entry64(l1, (va >> 12) & 0x1ff, frame | PTE_V);
}

pub const X64_ROOT: u64 = 0x2000;
