//! Intrusive-list enumeration over the scratch buffer.

use crate::error::{Error, Result};
use crate::mem::MemSource;
use crate::types::Address;
use crate::{KernelHandle, Target};

use log::trace;

use std::convert::TryInto;

/// Extra record slots beyond the expected count, so a list that grows
/// between reading the kernel's counter and walking still fits.
const LIST_SLACK: usize = 10;

impl<M: MemSource> KernelHandle<M> {
    /// Walk a kernel intrusive list into the handle's scratch buffer.
    ///
    /// `head` is the kernel address of the first record, `expected` the
    /// record count obtained separately from the kernel, `next_offset` the
    /// byte offset of the embedded next pointer inside each `rec_size`-byte
    /// record. Returns the packed records and how many were walked.
    ///
    /// A walk that sees a different count than `expected` fails with
    /// [`ErrorKind::Inconsistent`]: the kernel changed underneath us, and
    /// that must not be hidden from the caller.
    ///
    /// [`ErrorKind::Inconsistent`]: crate::ErrorKind::Inconsistent
    pub fn walk_list(
        &mut self,
        head: Address,
        expected: usize,
        rec_size: usize,
        next_offset: usize,
        what: &str,
    ) -> Result<(&[u8], usize)> {
        debug_assert!(rec_size > 0);
        debug_assert!(next_offset + self.pointer_size() <= rec_size);

        let count = match self.walk_inner(head, expected, rec_size, next_offset, what) {
            Ok(count) => count,
            Err(e) => return self.fail(e),
        };
        Ok((&self.scratch[..count * rec_size], count))
    }

    fn walk_inner(
        &mut self,
        head: Address,
        expected: usize,
        rec_size: usize,
        next_offset: usize,
        what: &str,
    ) -> Result<usize> {
        self.ensure_vm()?;

        let need = (expected + LIST_SLACK + 1) * rec_size;
        let mut scratch = std::mem::take(&mut self.scratch);
        if scratch.len() < need {
            scratch.resize(need, 0);
        }

        let res = if matches!(self.target, Target::Dead { .. }) {
            self.walk_dead(&mut scratch, head, rec_size, next_offset, what)
        } else {
            self.walk_alive(&mut scratch, head, rec_size, next_offset, what)
        };
        self.scratch = scratch;

        let actual = res?;
        trace!("{}: walked {} records, kernel counted {}", what, actual, expected);
        if actual != expected {
            return Err(Error::Inconsistent {
                what: what.to_string(),
                expected,
                actual,
            });
        }
        Ok(actual)
    }

    /// Chase the embedded next pointers record by record through the
    /// translation layer.
    fn walk_dead(
        &mut self,
        scratch: &mut [u8],
        head: Address,
        rec_size: usize,
        next_offset: usize,
        what: &str,
    ) -> Result<usize> {
        if head.is_null() {
            return Ok(0);
        }

        let psize = self.pointer_size();
        let slots = scratch.len() / rec_size;
        let mut count = 0usize;
        let mut cur = head;

        loop {
            self.read_raw(cur, &mut scratch[count * rec_size..(count + 1) * rec_size], what)?;
            count += 1;

            let next = read_ptr(&scratch[(count - 1) * rec_size + next_offset..], psize);
            if next.is_null() || count >= slots {
                break;
            }
            cur = next;
        }
        Ok(count)
    }

    /// One bulk kernel-table snapshot, then a walk purely in user memory:
    /// a record's non-null next pointer means the following snapshot record
    /// is live. No further kernel reads.
    fn walk_alive(
        &mut self,
        scratch: &mut [u8],
        head: Address,
        rec_size: usize,
        next_offset: usize,
        what: &str,
    ) -> Result<usize> {
        let psize = self.pointer_size();
        let filled = self
            .mem
            .table_snapshot(head, scratch)
            .map_err(|e| Error::Io {
                what: what.into(),
                source: e,
            })?;

        let mut count = 0usize;
        let mut offset = 0usize;
        while offset + rec_size <= filled {
            count += 1;
            let next = read_ptr(&scratch[offset + next_offset..], psize);
            if next.is_null() {
                break;
            }
            offset += rec_size;
        }
        Ok(count)
    }
}

fn read_ptr(buf: &[u8], size: usize) -> Address {
    match size {
        4 => Address::new(u32::from_le_bytes(buf[..4].try_into().unwrap()) as u64),
        _ => Address::new(u64::from_le_bytes(buf[..8].try_into().unwrap())),
    }
}
