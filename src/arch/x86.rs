use crate::error::{Error, Result};
use crate::header::{DumpHeader, PhysLayout};
use crate::mem::MemSource;
use crate::types::Address;

use bitflags::bitflags;

use std::convert::TryInto;

pub const PAGE_SIZE: u64 = 4096;
const PAGE_MASK: u64 = PAGE_SIZE - 1;
const ENTRY_SIZE: u64 = 4;
const FRAME: u32 = 0xffff_f000;
const FRAME_4M: u32 = 0xffc0_0000;
const SPAN_4M: u64 = 1 << 22;

pub(crate) const PD_ENTRIES: usize = 1024;
pub(crate) const PD_BYTES: usize = PD_ENTRIES * ENTRY_SIZE as usize;

bitflags! {
    /// Non-PAE entry bits, same layout in directory and table.
    pub struct PteFlags: u32 {
        const VALID    = 1 << 0;
        const WRITE    = 1 << 1;
        const USER     = 1 << 2;
        const ACCESSED = 1 << 5;
        const DIRTY    = 1 << 6;
        /// 4 MiB mapping, directory level only.
        const PS       = 1 << 7;
    }
}

/// Cached copy of the page directory.
///
/// `Uninitialized` translates identity: the directory fetch itself goes
/// through the normal read path and must terminate without a walk.
#[derive(Clone, Debug)]
pub enum X86Vm {
    Uninitialized,
    Ready(Box<[u32; PD_ENTRIES]>),
}

impl X86Vm {
    pub(crate) fn from_bytes(bytes: &[u8]) -> Self {
        let mut pd = Box::new([0u32; PD_ENTRIES]);
        for (slot, chunk) in pd.iter_mut().zip(bytes.chunks_exact(4)) {
            *slot = u32::from_le_bytes(chunk.try_into().unwrap());
        }
        X86Vm::Ready(pd)
    }
}

pub(crate) fn vtop<M: MemSource>(
    vm: &X86Vm,
    mem: &mut M,
    header: &DumpHeader,
    layout: PhysLayout,
    va: Address,
) -> Result<(Address, u64)> {
    let raw = va.to_u64() as u32;
    let in_page = va.to_u64() & PAGE_MASK;

    let pd = match vm {
        X86Vm::Uninitialized => return Ok((va, PAGE_SIZE - in_page)),
        X86Vm::Ready(pd) => pd,
    };

    let pde = pd[(raw >> 22) as usize];
    let pde_flags = PteFlags::from_bits_truncate(pde);
    if !pde_flags.contains(PteFlags::VALID) {
        return Err(Error::InvalidTranslation { va, level: 2 });
    }

    if pde_flags.contains(PteFlags::PS) {
        let in_large = (raw & !FRAME_4M) as u64;
        return Ok((
            Address::new((pde & FRAME_4M) as u64 | in_large),
            SPAN_4M - in_large,
        ));
    }

    let table = (pde & FRAME) as u64;
    let entry_pa = Address::new(table + ((raw >> 12) & 0x3ff) as u64 * ENTRY_SIZE);
    let pte = read_entry(mem, header, layout, entry_pa)?;
    if !PteFlags::from_bits_truncate(pte).contains(PteFlags::VALID) {
        return Err(Error::InvalidTranslation { va, level: 1 });
    }

    Ok((
        Address::new((pte & FRAME) as u64 | in_page),
        PAGE_SIZE - in_page,
    ))
}

fn read_entry<M: MemSource>(
    mem: &mut M,
    header: &DumpHeader,
    layout: PhysLayout,
    pa: Address,
) -> Result<u32> {
    let mut buf = [0u8; ENTRY_SIZE as usize];
    mem.read_at(layout.file_offset(header, pa), &mut buf)
        .map_err(|e| Error::Io {
            what: format!("page table entry at {:x}", pa),
            source: e,
        })?;
    Ok(u32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_decodes_little_endian() {
        let mut bytes = vec![0u8; PD_BYTES];
        bytes[4..8].copy_from_slice(&0x0040_0067u32.to_le_bytes());
        match X86Vm::from_bytes(&bytes) {
            X86Vm::Ready(pd) => {
                assert_eq!(pd[0], 0);
                assert_eq!(pd[1], 0x0040_0067);
            }
            X86Vm::Uninitialized => panic!("expected a cached directory"),
        }
    }

    #[test]
    fn uninitialized_translates_identity() {
        let h = DumpHeader::new(crate::header::Arch::X86, Address::NULL, vec![], 0);
        let mut mem = NoRead;
        let (pa, run) = vtop(
            &X86Vm::Uninitialized,
            &mut mem,
            &h,
            PhysLayout::Identity,
            Address::new(0x1234),
        )
        .unwrap();
        assert_eq!(pa, Address::new(0x1234));
        assert_eq!(run, PAGE_SIZE - 0x234);
    }

    struct NoRead;

    impl MemSource for NoRead {
        fn read_at(&mut self, _offset: u64, _buf: &mut [u8]) -> std::io::Result<()> {
            panic!("identity translation must not read");
        }
    }
}
