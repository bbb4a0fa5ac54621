use crate::error::Result;
use crate::header::{Arch, DumpHeader, PhysLayout};
use crate::mem::MemSource;
use crate::types::Address;

pub mod x64;
pub mod x86;

/// Per-architecture translation state, fixed when the handle opens.
///
/// The set of supported architectures is closed; adding one means adding a
/// variant here and a walker module next to the existing two.
#[derive(Clone, Debug)]
pub enum VmState {
    X64(x64::X64Vm),
    X86(x86::X86Vm),
}

impl VmState {
    pub(crate) fn for_header(header: &DumpHeader) -> Self {
        match header.arch {
            Arch::X64 => VmState::X64(x64::X64Vm::new(header.root_table)),
            Arch::X86 => VmState::X86(x86::X86Vm::Uninitialized),
        }
    }

    /// Walk the page tables for `va`.
    ///
    /// Returns the physical address and the length of the contiguous run
    /// from `va` to the end of its page.
    pub(crate) fn vtop<M: MemSource>(
        &self,
        mem: &mut M,
        header: &DumpHeader,
        layout: PhysLayout,
        va: Address,
    ) -> Result<(Address, u64)> {
        match self {
            VmState::X64(vm) => x64::vtop(vm, mem, header, layout, va),
            VmState::X86(vm) => x86::vtop(vm, mem, header, layout, va),
        }
    }
}
