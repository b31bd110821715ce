// License below.
//! Minimal ELF32 loader: an external collaborator to the translator proper.
//!
//! Parses just enough of an ELF32 LE header and its `PT_LOAD` program
//! headers to build the guest's initial address space, then hands the
//! translator a `GuestImage` (entry address, stack top, and a guest
//! memory region it can fetch ARM words from). Dynamic relocations,
//! symbols, and shared objects are out of scope — see spec's Non-goals.
#![cfg_attr(feature="clippy", warn(result_unwrap_used, option_unwrap_used, print_stdout))]
#![warn(missing_docs)]

use std::fs::File;
use std::io::Read;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};

use crate::translator::error::LoaderError;

const EI_NIDENT: usize = 16;
const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELFCLASS32: u8 = 1;
const ELFDATA2LSB: u8 = 1;
const ET_EXEC: u16 = 2;
const EM_ARM: u16 = 40;
const PT_LOAD: u32 = 1;

/// Default size of the guest address space this loader maps segments
/// into (the source's own budget for a small user-mode ARM image).
pub const GUEST_ADDRESS_SPACE_LEN: usize = 64 * 1024 * 1024;

/// Size of the guest stack region carved out at the top of the guest
/// address space.
pub const GUEST_STACK_LEN: usize = 128 * 1024 * 1024 / 8;

/// The guest process image: a host-allocated byte array standing in
/// for ARM-virtual address space, plus the entry point and initial
/// stack pointer the translator seeds `GuestState` from.
///
/// Every address this crate hands to generated code or stores in a
/// guest register — `entry`, `stack_top`, and any value the ELF's own
/// code computes at runtime from those — must be a real, dereferenceable
/// host address: the CORE's load/store handlers (`handlers::handle_ls_imm`,
/// `handle_ls_reg`, `handle_ls_mult`) emit `MOV EAX, [EDX+disp]` straight
/// against whatever `reg[Rn]` holds, exactly as `examples/original_source`
/// does by mapping the ELF directly into host process memory (there,
/// guest address == host address by construction). This loader achieves
/// the same property for a plain heap `Vec<u8>` by rebasing every
/// guest-visible address onto `bytes`'s actual (ASLR'd) host base.
pub struct GuestImage {
    /// Host-backed bytes standing in for the guest's virtual address
    /// space. Never indexed by a raw guest address directly — always
    /// via [`GuestImage::fetch_u32`], which first subtracts `base`.
    pub bytes: Vec<u8>,

    /// The host address of `bytes[0]`. `entry`, `stack_top`, and every
    /// register value the guest ever computes from them are `base`-
    /// relative host addresses, not small ELF-file virtual addresses.
    pub base: u32,

    /// Host address of the ELF entry point (`base + e_entry`).
    pub entry: u32,

    /// Host address of the top of the mapped stack region (the initial
    /// value for `SP`), `base`-relative like `entry`.
    pub stack_top: u32,
}

impl GuestImage {
    /// Builds a `GuestImage` around `bytes`, rebasing the ELF-relative
    /// `entry_vaddr`/`stack_top_vaddr` onto `bytes`'s real host address
    /// so that a register loaded from `entry` or `stack_top` is always a
    /// valid pointer into `bytes`, not a bare small integer.
    ///
    /// `pub(crate)` rather than private: test helpers elsewhere in the
    /// crate (`translator::block`, `translator::mod`) build small
    /// in-memory images directly and must go through the same rebasing,
    /// never a raw struct literal with `entry`/`stack_top` left as
    /// ELF-file vaddrs.
    pub(crate) fn new(bytes: Vec<u8>, entry_vaddr: u32, stack_top_vaddr: u32) -> GuestImage {
        let base = bytes.as_ptr() as usize as u32;
        GuestImage {
            bytes,
            base,
            entry: base.wrapping_add(entry_vaddr),
            stack_top: base.wrapping_add(stack_top_vaddr),
        }
    }

    /// Fetches the little-endian 32-bit ARM word at a host address
    /// (one previously produced by rebasing a guest-virtual address
    /// onto `base`, e.g. `entry`, `stack_top`, or a branch target
    /// computed from either).
    ///
    /// # Panics
    /// If `addr` falls outside the mapped guest address space; this
    /// indicates the guest program jumped somewhere the loader never
    /// mapped, which this translator treats as an unrecoverable error
    /// at the call site rather than here (no partial/garbage fetch).
    pub fn fetch_u32(&self, addr: u32) -> u32 {
        let i = addr.wrapping_sub(self.base) as usize;
        LittleEndian::read_u32(&self.bytes[i..i + 4])
    }
}

/// Parses an ELF32 LE ARM executable at `path` and maps its `PT_LOAD`
/// segments into a fresh guest address space.
pub fn load_elf(path: &Path) -> Result<GuestImage, LoaderError> {
    let mut raw = Vec::new();
    File::open(path)?.read_to_end(&mut raw)?;
    load_elf_bytes(&raw)
}

/// As [`load_elf`], but parses already-read bytes. Exposed separately
/// so tests can exercise the parser without touching the filesystem.
pub fn load_elf_bytes(raw: &[u8]) -> Result<GuestImage, LoaderError> {
    if raw.len() < EI_NIDENT + 36 || raw[0..4] != ELF_MAGIC {
        return Err(LoaderError::NotElf);
    }
    if raw[4] != ELFCLASS32 || raw[5] != ELFDATA2LSB {
        return Err(LoaderError::UnsupportedTarget);
    }

    let e_type = LittleEndian::read_u16(&raw[16..18]);
    let e_machine = LittleEndian::read_u16(&raw[18..20]);
    if e_type != ET_EXEC || e_machine != EM_ARM {
        return Err(LoaderError::UnsupportedTarget);
    }

    let e_entry = LittleEndian::read_u32(&raw[24..28]);
    let e_phoff = LittleEndian::read_u32(&raw[28..32]) as usize;
    let e_phentsize = LittleEndian::read_u16(&raw[42..44]) as usize;
    let e_phnum = LittleEndian::read_u16(&raw[44..46]) as usize;

    let mut bytes = vec![0u8; GUEST_ADDRESS_SPACE_LEN];

    for i in 0..e_phnum {
        let off = e_phoff + i * e_phentsize;
        let ph = &raw[off..off + e_phentsize];
        let p_type = LittleEndian::read_u32(&ph[0..4]);
        if p_type != PT_LOAD { continue; }

        let p_offset = LittleEndian::read_u32(&ph[4..8]) as usize;
        let p_vaddr = LittleEndian::read_u32(&ph[8..12]);
        let p_filesz = LittleEndian::read_u32(&ph[16..20]) as usize;
        let p_memsz = LittleEndian::read_u32(&ph[20..24]) as usize;

        let dst_end = p_vaddr as usize + p_memsz;
        if dst_end > bytes.len() - GUEST_STACK_LEN {
            return Err(LoaderError::SegmentOutOfRange(p_vaddr));
        }

        let src = &raw[p_offset..p_offset + p_filesz];
        bytes[p_vaddr as usize..p_vaddr as usize + p_filesz].copy_from_slice(src);
        // The remainder of p_memsz beyond p_filesz (.bss) is already zero.
    }

    let stack_top_vaddr = (GUEST_ADDRESS_SPACE_LEN - 16) as u32;
    Ok(GuestImage::new(bytes, e_entry, stack_top_vaddr))
}

#[cfg(test)]
mod test {
    use super::*;

    fn elf_header(entry: u32, phoff: u32, phentsize: u16, phnum: u16) -> Vec<u8> {
        let mut h = vec![0u8; 52];
        h[0..4].copy_from_slice(&ELF_MAGIC);
        h[4] = ELFCLASS32;
        h[5] = ELFDATA2LSB;
        LittleEndian::write_u16(&mut h[16..18], ET_EXEC);
        LittleEndian::write_u16(&mut h[18..20], EM_ARM);
        LittleEndian::write_u32(&mut h[24..28], entry);
        LittleEndian::write_u32(&mut h[28..32], phoff);
        LittleEndian::write_u16(&mut h[42..44], phentsize);
        LittleEndian::write_u16(&mut h[44..46], phnum);
        h
    }

    #[test]
    fn rejects_missing_magic() {
        let raw = vec![0u8; 64];
        assert!(matches!(load_elf_bytes(&raw), Err(LoaderError::NotElf)));
    }

    #[test]
    fn rejects_non_arm_machine() {
        let mut raw = elf_header(0x8000, 52, 32, 0);
        LittleEndian::write_u16(&mut raw[18..20], 3); // EM_386
        assert!(matches!(load_elf_bytes(&raw), Err(LoaderError::UnsupportedTarget)));
    }

    #[test]
    fn loads_a_single_pt_load_segment() {
        let phoff = 52usize;
        let phentsize = 32usize;
        let mut raw = elf_header(0x8000, phoff as u32, phentsize as u16, 1);

        let mut ph = vec![0u8; phentsize];
        LittleEndian::write_u32(&mut ph[0..4], PT_LOAD);
        LittleEndian::write_u32(&mut ph[4..8], (phoff + phentsize) as u32); // p_offset
        LittleEndian::write_u32(&mut ph[8..12], 0x8000); // p_vaddr
        LittleEndian::write_u32(&mut ph[16..20], 4); // p_filesz
        LittleEndian::write_u32(&mut ph[20..24], 4); // p_memsz
        raw.extend_from_slice(&ph);
        raw.extend_from_slice(&[0x05, 0x10, 0xA0, 0xE3]); // MOV R1, #5 (LE bytes)

        let img = load_elf_bytes(&raw).unwrap();
        assert_eq!(img.entry, img.base.wrapping_add(0x8000));
        assert_eq!(img.fetch_u32(img.entry), 0xE3A01005);
    }
}


/*
Licensed to the Apache Software Foundation (ASF) under one
or more contributor license agreements.  See the NOTICE file
distributed with this work for additional information
regarding copyright ownership.  The ASF licenses this file
to you under the Apache License, Version 2.0 (the
"License"); you may not use this file except in compliance
with the License.  You may obtain a copy of the License at

  http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing,
software distributed under the License is distributed on an
"AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
KIND, either express or implied.  See the License for the
specific language governing permissions and limitations
under the License.
*/
