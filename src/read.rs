//! Typed and raw reads at kernel virtual addresses.

use crate::error::{Error, Result};
use crate::mem::MemSource;
use crate::types::Address;
use crate::{KernelHandle, Target};

use dataview::Pod;

impl<M: MemSource> KernelHandle<M> {
    /// Read a typed value at a kernel virtual address.
    ///
    /// `what` names the value for diagnostics ("nfiles", "proc head", ...)
    /// and is carried on every failure. A failure discards any partially
    /// assembled bytes; no partially-filled value is ever returned.
    pub fn read_obj<T: Pod>(&mut self, kva: Address, what: &str) -> Result<T> {
        // Pod: the all-zero byte pattern is a valid T.
        let mut val: T = unsafe { std::mem::zeroed() };
        self.read_virt(kva, val.as_bytes_mut(), what)?;
        Ok(val)
    }

    /// Read raw bytes at a kernel virtual address.
    ///
    /// On error the buffer contents are unspecified.
    pub fn read_virt(&mut self, kva: Address, buf: &mut [u8], what: &str) -> Result<()> {
        let res = match self.ensure_vm() {
            Ok(()) => self.read_raw(kva, buf, what),
            Err(e) => Err(e),
        };
        match res {
            Ok(()) => Ok(()),
            Err(e) => self.fail(e),
        }
    }

    /// Read path shared with VM-state initialization: no lazy init, no
    /// last-error bookkeeping.
    pub(crate) fn read_raw(&mut self, kva: Address, buf: &mut [u8], what: &str) -> Result<()> {
        if let Target::Alive = self.target {
            // One direct read at the kernel-reported address.
            return self.mem.read_at(kva.to_u64(), buf).map_err(|e| Error::Io {
                what: what.into(),
                source: e,
            });
        }

        // Dead target: translate run by run. Values may straddle a page
        // boundary onto a different physical page.
        let mut done = 0usize;
        while done < buf.len() {
            let (pa, run) = self.vtop(kva + done)?;
            let take = (buf.len() - done).min(run as usize);
            let offset = match &self.target {
                Target::Dead { header, layout, .. } => layout.file_offset(header, pa),
                Target::Alive => unreachable!(),
            };
            self.mem
                .read_at(offset, &mut buf[done..done + take])
                .map_err(|e| Error::Io {
                    what: what.into(),
                    source: e,
                })?;
            done += take;
        }
        Ok(())
    }
}
