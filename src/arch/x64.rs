use crate::error::{Error, Result};
use crate::header::{DumpHeader, PhysLayout};
use crate::mem::MemSource;
use crate::types::Address;

use bitflags::bitflags;

pub const PAGE_SIZE: u64 = 4096;
const PAGE_MASK: u64 = PAGE_SIZE - 1;
const INDEX_MASK: u64 = 0x1ff;
const ENTRY_SIZE: u64 = 8;
// Bits 12..52 carry the next-level frame.
const FRAME: u64 = 0x000f_ffff_ffff_f000;

bitflags! {
    /// Entry bits shared by all four levels.
    pub struct PteFlags: u64 {
        const VALID    = 1 << 0;
        const WRITE    = 1 << 1;
        const USER     = 1 << 2;
        const ACCESSED = 1 << 5;
        const DIRTY    = 1 << 6;
        /// Large mapping; ends the walk at level 3 (1 GiB) or 2 (2 MiB).
        const PS       = 1 << 7;
        const NX       = 1 << 63;
    }
}

/// Nothing to cache beyond the root the header already carries.
#[derive(Clone, Copy, Debug)]
pub struct X64Vm {
    root: Address,
}

impl X64Vm {
    pub(crate) fn new(root: Address) -> Self {
        // CR3 carries PCID bits in the low word; only the frame matters.
        Self {
            root: Address::new(root.to_u64() & FRAME),
        }
    }
}

fn level_shift(level: u8) -> u32 {
    12 + 9 * (level as u32 - 1)
}

pub(crate) fn vtop<M: MemSource>(
    vm: &X64Vm,
    mem: &mut M,
    header: &DumpHeader,
    layout: PhysLayout,
    va: Address,
) -> Result<(Address, u64)> {
    let raw = va.to_u64();
    let mut table = vm.root.to_u64();

    for level in (1..=4u8).rev() {
        let idx = (raw >> level_shift(level)) & INDEX_MASK;
        let entry_pa = Address::new(table + idx * ENTRY_SIZE);
        let word = read_entry(mem, header, layout, entry_pa)?;
        let flags = PteFlags::from_bits_truncate(word);

        if !flags.contains(PteFlags::VALID) {
            return Err(Error::InvalidTranslation { va, level });
        }

        if flags.contains(PteFlags::PS) && (level == 2 || level == 3) {
            let span = 1u64 << level_shift(level);
            let frame = word & FRAME & !(span - 1);
            let in_page = raw & (span - 1);
            return Ok((Address::new(frame | in_page), span - in_page));
        }

        table = word & FRAME;
    }

    let in_page = raw & PAGE_MASK;
    Ok((Address::new(table | in_page), PAGE_SIZE - in_page))
}

fn read_entry<M: MemSource>(
    mem: &mut M,
    header: &DumpHeader,
    layout: PhysLayout,
    pa: Address,
) -> Result<u64> {
    let mut buf = [0u8; ENTRY_SIZE as usize];
    mem.read_at(layout.file_offset(header, pa), &mut buf)
        .map_err(|e| Error::Io {
            what: format!("page table entry at {:x}", pa),
            source: e,
        })?;
    Ok(u64::from_le_bytes(buf))
}
