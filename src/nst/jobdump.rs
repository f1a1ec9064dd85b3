//! Textual dump side channel for external diffing.
//!
//! Two plain-text formats, neither of which is part of the computation:
//!
//! - the *job dump*: test name, packed command word, loop bounds, AGU
//!   offsets relative to the TCDM base, and the stride matrix;
//! - the *memory dump*: every TCDM word as an `address value` hex pair.
//!
//! The formats are consumed by an external RTL diffing flow, so the layout
//! (separators, radix, case) is fixed.

use std::io::{self, Write};

use crate::device::{Tcdm, N_AGUS, N_HW_LOOPS};

use super::descriptor::JobDescriptor;

/// Write a job dump for one staged descriptor.
///
/// `tcdm_base` is subtracted from the AGU offsets so dumps are relocatable
/// against differently-placed buffers.
pub fn write_job_dump<W: Write>(
    w: &mut W,
    test_name: &str,
    cmd_word: u32,
    desc: &JobDescriptor,
    tcdm_base: u32,
) -> io::Result<()> {
    writeln!(w, "{}", test_name)?;
    writeln!(w, "{:08X}", cmd_word)?;

    for k in 0..N_HW_LOOPS {
        write!(w, "{} ", desc.loop_bound[k])?;
    }
    writeln!(w)?;

    for k in 0..N_AGUS {
        write!(w, "{} ", desc.agu_off[k].wrapping_sub(tcdm_base))?;
    }
    writeln!(w)?;

    for o in 0..N_AGUS {
        for s in 0..N_HW_LOOPS {
            write!(w, "{} ", desc.agu_stride[o][s])?;
        }
        writeln!(w)?;
    }

    Ok(())
}

/// Write the whole TCDM as `0xADDR 0xWORD` lines.
pub fn write_mem_dump<W: Write>(w: &mut W, tcdm: &Tcdm) -> io::Result<()> {
    for (addr, word) in tcdm.words() {
        writeln!(w, "0x{:08x} 0x{:08x}", addr, word)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nst::command::{pack_cmd_word, JobBuilder};
    use crate::nst::descriptor::OpCode;

    #[test]
    fn test_job_dump_format() {
        let desc = JobBuilder::new(OpCode::Mac)
            .loop_nest(1, 1, 1, &[4], &[&[1], &[1], &[0]])
            .agu_offs(0x100, 0x110, 0x120)
            .cmd(3, 0, false)
            .build()
            .unwrap();
        let word = pack_cmd_word(&desc, 0);

        let mut out = Vec::new();
        write_job_dump(&mut out, "dot_product", word, &desc, 0x100).unwrap();
        let text = String::from_utf8(out).unwrap();

        let expected = "dot_product\n\
                        00006490\n\
                        3 0 0 0 0 \n\
                        0 16 32 \n\
                        4 0 0 0 0 \n\
                        4 0 0 0 0 \n\
                        0 0 0 0 0 \n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_mem_dump_format() {
        let mut tcdm = Tcdm::new(8);
        tcdm.write_word(4, 0xDEAD_BEEF).unwrap();
        let mut out = Vec::new();
        write_mem_dump(&mut out, &tcdm).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "0x00000000 0x00000000\n0x00000004 0xdeadbeef\n"
        );
    }
}
