use crate::error::{Error, Result};
use crate::types::Address;

use goblin::elf::header::{EM_386, EM_X86_64};
use goblin::elf::program_header::PT_LOAD;
use goblin::elf::Elf;

use log::debug;

use std::io;

/// Target architecture of a captured image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arch {
    /// 4-level paging, 64-bit entries.
    X64,
    /// 2-level non-PAE paging, 32-bit entries.
    X86,
}

impl Arch {
    pub fn pointer_size(self) -> usize {
        match self {
            Arch::X64 => 8,
            Arch::X86 => 4,
        }
    }
}

/// One captured physical-memory range.
#[derive(Clone, Copy, Debug)]
pub struct MemSegment {
    pub start: Address,
    pub len: u64,
}

/// Parsed dump header, supplied by whoever opened the image.
///
/// The core consumes this as-is; only [`from_elf_core`] does any parsing, as
/// a convenience for ELF core images.
///
/// [`from_elf_core`]: DumpHeader::from_elf_core
#[derive(Clone, Debug)]
pub struct DumpHeader {
    pub arch: Arch,
    /// Physical address of the root page table (the CR3 equivalent).
    pub root_table: Address,
    /// Captured ranges in dump order. Segments must not overlap. An empty
    /// table means physical addresses and file offsets coincide.
    pub segments: Vec<MemSegment>,
    /// File offset of the first captured byte.
    pub base_offset: u64,
}

impl DumpHeader {
    pub fn new(
        arch: Arch,
        root_table: Address,
        segments: Vec<MemSegment>,
        base_offset: u64,
    ) -> Self {
        Self {
            arch,
            root_table,
            segments,
            base_offset,
        }
    }

    /// Derive architecture and segment table from an ELF core image.
    ///
    /// ELF cores do not record the root page table, so it stays
    /// caller-supplied.
    pub fn from_elf_core(bytes: &[u8], root_table: Address) -> Result<Self> {
        let elf = Elf::parse(bytes).map_err(|e| Error::Io {
            what: "dump header".into(),
            source: io::Error::new(io::ErrorKind::InvalidData, e.to_string()),
        })?;

        let arch = match elf.header.e_machine {
            EM_X86_64 => Arch::X64,
            EM_386 => Arch::X86,
            other => {
                return Err(Error::Io {
                    what: "dump header".into(),
                    source: io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("unsupported machine {}", other),
                    ),
                })
            }
        };

        let mut loads = elf
            .program_headers
            .iter()
            .filter(|ph| ph.p_type == PT_LOAD && ph.p_filesz != 0)
            .collect::<Vec<_>>();
        loads.sort_by_key(|ph| ph.p_offset);

        let base_offset = loads.first().map(|ph| ph.p_offset).unwrap_or(0);
        let segments = loads
            .iter()
            .map(|ph| MemSegment {
                start: Address::new(ph.p_paddr),
                len: ph.p_filesz,
            })
            .collect::<Vec<_>>();

        debug!(
            "elf core: {:?}, {} segments, data at {:x}",
            arch,
            segments.len(),
            base_offset
        );

        Ok(Self::new(arch, root_table, segments, base_offset))
    }

    /// Map a physical address to its byte offset inside the image.
    ///
    /// Segments are scanned in table order, first match wins. An address
    /// outside every segment maps one past the captured bytes, so the
    /// following read fails with an ordinary out-of-range I/O error instead
    /// of a mapping error.
    pub fn file_offset(&self, pa: Address) -> u64 {
        let pa = pa.to_u64();
        let mut run = 0u64;
        for seg in &self.segments {
            let start = seg.start.to_u64();
            if pa >= start && pa - start < seg.len {
                return self.base_offset + run + (pa - start);
            }
            run += seg.len;
        }
        self.base_offset + run
    }
}

/// How physical addresses map to image offsets, fixed when the handle opens.
#[derive(Clone, Copy, Debug)]
pub(crate) enum PhysLayout {
    /// Physical addresses and file offsets coincide by construction.
    Identity,
    /// Ordered segment-table scan.
    Segmented,
}

impl PhysLayout {
    pub(crate) fn for_header(header: &DumpHeader) -> Self {
        if header.segments.is_empty() {
            PhysLayout::Identity
        } else {
            PhysLayout::Segmented
        }
    }

    pub(crate) fn file_offset(self, header: &DumpHeader, pa: Address) -> u64 {
        match self {
            PhysLayout::Identity => pa.to_u64(),
            PhysLayout::Segmented => header.file_offset(pa),
        }
    }
}
