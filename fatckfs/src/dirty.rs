// SPDX-License-Identifier: BSD-2-Clause

//! Clean-shutdown probe, run before the table is loaded so a clean volume
//! can skip the full check.

use fatckio::prelude::*;

use crate::geometry::{Encoding, FatGeometry};

/// Reads the reserved pseudo-entries straight from the volume and decides
/// whether a full check is required.
///
/// Returns `true` (dirty) unless the header is well-formed *and* both the
/// clean-shutdown and no-hard-error bits are set. Unreadable or
/// unrecognized headers count as dirty; FAT12 has no status bits and is
/// always checked.
pub fn is_dirty<IO: BlockIO + ?Sized>(io: &mut IO, geom: &FatGeometry) -> bool {
    if geom.encoding == Encoding::Fat12 {
        return true;
    }
    let mut buf = [0u8; 8];
    if io.read_at(geom.fat_offset(), &mut buf).is_err() {
        return true;
    }
    if buf[0] != geom.media || buf[1] != 0xFF {
        return true;
    }
    match geom.encoding {
        // Handled above; kept for exhaustiveness.
        Encoding::Fat12 => true,
        Encoding::Fat16 => {
            // Entry 1 stores the status bits in its top two bits.
            if (buf[2] & 0xF8) != 0xF8 || (buf[3] & 0x3F) != 0x3F {
                return true;
            }
            (buf[3] & 0xC0) != 0xC0
        }
        Encoding::Fat32 => {
            if buf[2] != 0xFF
                || (buf[3] & 0x0F) != 0x0F
                || (buf[4] & 0xF8) != 0xF8
                || buf[5] != 0xFF
                || buf[6] != 0xFF
                || (buf[7] & 0x03) != 0x03
            {
                return true;
            }
            (buf[7] & 0x0C) != 0x0C
        }
    }
}
