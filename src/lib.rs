//! Kernel virtual-memory access core for postmortem and live debugging
//! tools.
//!
//! A [`KernelHandle`] wraps a byte source ([`MemSource`]) and a parsed
//! [`DumpHeader`], translates kernel virtual addresses by walking the
//! image's own page tables, and walks kernel-resident intrusive lists
//! through that layer. Live handles skip translation entirely and read at
//! kernel-reported addresses.

use log::debug;

pub mod arch;
pub mod error;
pub mod header;
pub mod list;
pub mod mem;
pub mod read;
pub mod types;

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::header::{Arch, DumpHeader, MemSegment};
pub use crate::mem::MemSource;
pub use crate::types::Address;

pub use dataview::Pod;

use crate::arch::{x86, VmState};
use crate::header::PhysLayout;

/// Whether the target is a captured image or a running kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Dead,
    Alive,
}

pub(crate) enum Target {
    Dead {
        header: DumpHeader,
        layout: PhysLayout,
        vm: VmState,
    },
    Alive,
}

/// The one thing collaborators touch: owns the source, the open-time mode,
/// cached per-architecture VM state, a reusable scratch buffer, and the last
/// error for the diagnostic surface.
///
/// One in-flight operation per handle; nothing is shared across handles.
pub struct KernelHandle<M> {
    pub(crate) mem: M,
    pub(crate) target: Target,
    pub(crate) scratch: Vec<u8>,
    pub(crate) last_error: Option<(ErrorKind, String)>,
}

impl<M: MemSource> KernelHandle<M> {
    /// Open a handle over a captured image.
    pub fn open_dead(mem: M, header: DumpHeader) -> Self {
        debug!(
            "dead {:?} image, root table {:x}, {} segments",
            header.arch,
            header.root_table,
            header.segments.len()
        );
        let layout = PhysLayout::for_header(&header);
        let vm = VmState::for_header(&header);
        Self {
            mem,
            target: Target::Dead { header, layout, vm },
            scratch: Vec::new(),
            last_error: None,
        }
    }

    /// Open a handle over a running kernel's memory device.
    pub fn open_alive(mem: M) -> Self {
        debug!("live kernel target");
        Self {
            mem,
            target: Target::Alive,
            scratch: Vec::new(),
            last_error: None,
        }
    }

    pub fn mode(&self) -> Mode {
        match self.target {
            Target::Dead { .. } => Mode::Dead,
            Target::Alive => Mode::Alive,
        }
    }

    /// Architecture of the captured image; a live target has none.
    pub fn arch(&self) -> Option<Arch> {
        match &self.target {
            Target::Dead { header, .. } => Some(header.arch),
            Target::Alive => None,
        }
    }

    /// Tear the handle down, giving the source back.
    pub fn close(self) -> M {
        self.mem
    }

    pub fn last_error_kind(&self) -> Option<ErrorKind> {
        self.last_error.as_ref().map(|(kind, _)| *kind)
    }

    pub fn last_error_message(&self) -> &str {
        self.last_error
            .as_ref()
            .map(|(_, msg)| msg.as_str())
            .unwrap_or("")
    }

    /// Translate a kernel virtual address.
    ///
    /// Returns the physical address and the contiguous run length left in
    /// its page. Fails with [`ErrorKind::Unsupported`] on a live handle:
    /// live addresses are read directly from the target, never walked.
    pub fn translate(&mut self, va: Address) -> Result<(Address, u64)> {
        let res = match self.ensure_vm() {
            Ok(()) => self.vtop(va),
            Err(e) => Err(e),
        };
        match res {
            Ok(v) => Ok(v),
            Err(e) => self.fail(e),
        }
    }

    pub(crate) fn vtop(&mut self, va: Address) -> Result<(Address, u64)> {
        let KernelHandle { mem, target, .. } = self;
        match target {
            Target::Alive => Err(Error::Unsupported("address translation")),
            Target::Dead { header, layout, vm } => vm.vtop(mem, header, *layout, va),
        }
    }

    /// Fetch the 2-level page-directory copy on first use.
    ///
    /// The fetch runs through the normal read path; translation serves it
    /// through the identity branch while the state is still uninitialized,
    /// so it cannot recurse into a walk.
    pub(crate) fn ensure_vm(&mut self) -> Result<()> {
        let root = match &self.target {
            Target::Dead {
                header,
                vm: VmState::X86(x86::X86Vm::Uninitialized),
                ..
            } => header.root_table,
            _ => return Ok(()),
        };

        debug!("caching page directory from {:x}", root);
        let mut pd = vec![0u8; x86::PD_BYTES];
        self.read_raw(root, &mut pd, "page directory")?;

        if let Target::Dead { vm, .. } = &mut self.target {
            *vm = VmState::X86(x86::X86Vm::from_bytes(&pd));
        }
        Ok(())
    }

    pub(crate) fn fail<T>(&mut self, err: Error) -> Result<T> {
        self.last_error = Some((err.kind(), err.to_string()));
        Err(err)
    }

    pub(crate) fn pointer_size(&self) -> usize {
        match &self.target {
            Target::Dead { header, .. } => header.arch.pointer_size(),
            Target::Alive => std::mem::size_of::<usize>(),
        }
    }
}
