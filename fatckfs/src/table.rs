// SPDX-License-Identifier: BSD-2-Clause

//! The in-memory allocation table: backing acquisition, per-encoding
//! successor accessors, reserved-entry validation, the initial head scan
//! and write-back.

use fatckio::prelude::*;
use memmap2::MmapMut;

use crate::check::CheckContext;
use crate::errors::*;
use crate::geometry::*;
use crate::policy::RepairPolicy;
use crate::report::{CheckReport, Finding, Outcome};

/// How the table bytes are held in memory.
///
/// A shared mapping aliases the first on-disk copy, so its mutations are
/// already persistent; a private copy must be flushed to every copy at
/// write-back. Callers never branch on the variant except here.
#[derive(Debug)]
pub enum TableBacking {
    /// Shared writable mapping over the first FAT copy.
    Mapped(MmapMut),
    /// Private copy read from the volume.
    Copied(Vec<u8>),
}

impl TableBacking {
    #[inline]
    fn as_slice(&self) -> &[u8] {
        match self {
            TableBacking::Mapped(m) => m,
            TableBacking::Copied(v) => v,
        }
    }

    #[inline]
    fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            TableBacking::Mapped(m) => m,
            TableBacking::Copied(v) => v,
        }
    }
}

/// A loaded allocation table.
///
/// Owns the buffer for its whole lifetime; dropping (or [`FatTable::release`])
/// unmaps or frees it, so release cannot be called twice by construction.
#[derive(Debug)]
pub struct FatTable {
    geom: FatGeometry,
    backing: TableBacking,
    rdonly: bool,
}

impl FatTable {
    /// Acquires the table, preferring a shared mapping and falling back to
    /// a private copy when mapping fails (unaligned FAT offset, backend
    /// without mapping support, ...). Read-only tables always use a copy.
    pub fn load_mapped<IO: BlockIOMapMut + ?Sized>(
        io: &mut IO,
        geom: &FatGeometry,
        rdonly: bool,
    ) -> CheckResult<Self> {
        Self::validate_geometry(geom)?;
        if !rdonly
            && let Ok(map) = io.map_mut(geom.fat_offset(), geom.fat_bytes())
        {
            return Ok(Self {
                geom: geom.clone(),
                backing: TableBacking::Mapped(map),
                rdonly,
            });
        }
        Self::load_copied(io, geom, rdonly)
    }

    /// Reads the first FAT copy into a private buffer.
    pub fn load_copied<IO: BlockIO + ?Sized>(
        io: &mut IO,
        geom: &FatGeometry,
        rdonly: bool,
    ) -> CheckResult<Self> {
        Self::validate_geometry(geom)?;
        let len = geom.fat_bytes();
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|_| CheckError::Alloc("No space for FAT sectors"))?;
        buf.resize(len, 0);
        io.read_at(geom.fat_offset(), &mut buf)?;
        Ok(Self {
            geom: geom.clone(),
            backing: TableBacking::Copied(buf),
            rdonly,
        })
    }

    /// Geometry must describe a table whose last valid entry fits in the
    /// buffer; catching this once up front keeps the accessors panic-free.
    fn validate_geometry(geom: &FatGeometry) -> CheckResult<()> {
        if geom.bytes_per_sector == 0 || geom.num_fats == 0 || geom.fat_sectors == 0 {
            return Err(CheckError::Invalid("Degenerate FAT geometry"));
        }
        if geom.num_clusters <= CLUST_FIRST {
            return Err(CheckError::Invalid("No data clusters"));
        }
        if geom.num_clusters > (CLUST_RSRVD & geom.encoding.mask()) {
            return Err(CheckError::Invalid("Cluster count exceeds encoding range"));
        }
        let last = (geom.num_clusters - 1) as usize;
        let needed = match geom.encoding {
            Encoding::Fat12 => last + (last >> 1) + 2,
            Encoding::Fat16 => last * 2 + 2,
            Encoding::Fat32 => last * 4 + 4,
        };
        if needed > geom.fat_bytes() {
            return Err(CheckError::Invalid("FAT shorter than cluster count"));
        }
        Ok(())
    }

    #[inline]
    pub fn geom(&self) -> &FatGeometry {
        &self.geom
    }

    #[inline]
    pub fn is_mapped(&self) -> bool {
        matches!(self.backing, TableBacking::Mapped(_))
    }

    #[inline]
    pub fn read_only(&self) -> bool {
        self.rdonly
    }

    /// Successor of `cl`, normalized into the shared sentinel space.
    pub fn get_next(&self, cl: Cluster) -> CheckResult<Cluster> {
        if !self.geom.valid_cluster(cl) {
            return Err(CheckError::InvalidCluster(cl));
        }
        let buf = self.backing.as_slice();
        let raw = match self.geom.encoding {
            Encoding::Fat12 => {
                let p = (cl + (cl >> 1)) as usize;
                let mut v = u16::from_le_bytes([buf[p], buf[p + 1]]) as u32;
                // Odd cluster: the low 4 bits belong to the even neighbor.
                if cl & 1 == 1 {
                    v >>= 4;
                }
                v
            }
            Encoding::Fat16 => {
                let p = (cl as usize) * 2;
                u16::from_le_bytes([buf[p], buf[p + 1]]) as u32
            }
            Encoding::Fat32 => {
                let p = (cl as usize) * 4;
                u32::from_le_bytes([buf[p], buf[p + 1], buf[p + 2], buf[p + 3]])
            }
        };
        Ok(self.geom.encoding.normalize(raw))
    }

    /// Overwrites the successor link of `cl`. Values are truncated to the
    /// encoding width; for FAT12 the 4 bits shared with the neighboring
    /// entry are read back and preserved.
    pub fn set_next(&mut self, cl: Cluster, next: Cluster) -> CheckResult<()> {
        if self.rdonly {
            return Err(CheckError::ReadOnly);
        }
        if !self.geom.valid_cluster(cl) {
            return Err(CheckError::InvalidCluster(cl));
        }
        let mut v = next & self.geom.encoding.mask();
        let buf = self.backing.as_mut_slice();
        match self.geom.encoding {
            Encoding::Fat12 => {
                let p = (cl + (cl >> 1)) as usize;
                if cl & 1 == 0 {
                    v |= ((buf[p + 1] & 0xF0) as u32) << 8;
                } else {
                    v <<= 4;
                    v |= (buf[p] & 0x0F) as u32;
                }
                buf[p..p + 2].copy_from_slice(&(v as u16).to_le_bytes());
            }
            Encoding::Fat16 => {
                let p = (cl as usize) * 2;
                buf[p..p + 2].copy_from_slice(&(v as u16).to_le_bytes());
            }
            Encoding::Fat32 => {
                let p = (cl as usize) * 4;
                buf[p..p + 4].copy_from_slice(&v.to_le_bytes());
            }
        }
        Ok(())
    }

    /// Validates the reserved pseudo-entries at the start of the table.
    ///
    /// The Windows 95 OSR2 unclean-shutdown byte patterns are advisory
    /// (DIRTY); any other deviation is reported and optionally corrected
    /// to the canonical signature under policy.
    pub fn check_signature(
        &mut self,
        policy: &mut dyn RepairPolicy,
        rep: &mut CheckReport,
    ) -> Outcome {
        let enc = self.geom.encoding;
        let media = self.geom.media;
        let buf = self.backing.as_slice();

        let canonical = buf[0] == media
            && buf[1] == 0xFF
            && buf[2] == 0xFF
            && match enc {
                Encoding::Fat12 => true,
                Encoding::Fat16 => buf[3] == 0xFF,
                Encoding::Fat32 => {
                    (buf[3] & 0x0F) == 0x0F
                        && buf[4] == 0xFF
                        && buf[5] == 0xFF
                        && buf[6] == 0xFF
                        && (buf[7] & 0x0F) == 0x0F
                }
            };
        if canonical {
            return Outcome::empty();
        }

        // Windows 95 OSR2 (and later) clears a signature bit on boot so an
        // unclean reboot is detectable. Not corruption.
        let win95_dirty = buf[0] == media
            && buf[1] == 0xFF
            && buf[2] == 0xFF
            && match enc {
                Encoding::Fat12 => false,
                Encoding::Fat16 => buf[3] == 0x7F,
                Encoding::Fat32 => {
                    buf[3] == 0x0F
                        && buf[4] == 0xFF
                        && buf[5] == 0xFF
                        && buf[6] == 0xFF
                        && buf[7] == 0x07
                }
            };
        if win95_dirty {
            rep.push(Finding::warn(
                "FAT.DIRTY",
                "FAT signature carries the unclean-shutdown marker",
            ));
            return Outcome::DIRTY;
        }

        let shown: String = buf[..enc.signature_len()]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        rep.push(Finding::warn(
            "FAT.SIG",
            format!("FAT starts with odd byte sequence ({shown})"),
        ));
        if !self.rdonly && policy.ask(true, "Correct") {
            let buf = self.backing.as_mut_slice();
            buf[0] = media;
            buf[1] = 0xFF;
            buf[2] = 0xFF;
            match enc {
                Encoding::Fat12 => {}
                Encoding::Fat16 => buf[3] = 0xFF,
                Encoding::Fat32 => {
                    buf[3] = 0x0F;
                    buf[4] = 0xFF;
                    buf[5] = 0xFF;
                    buf[6] = 0xFF;
                    buf[7] = 0x0F;
                }
            }
            return Outcome::MODIFIED;
        }
        Outcome::empty()
    }

    /// First linear pass over every cluster: counts free and bad entries,
    /// truncates structurally invalid links under policy, and clears head
    /// bits for every referenced cluster.
    ///
    /// A link into a cluster whose head bit is already clear means two
    /// chains converge there; this pass deliberately leaves that alone
    /// (no used bitmap exists yet) and the chain walk reports it later,
    /// so which chain is the victim does not depend on scan order.
    pub fn scan_heads(
        &mut self,
        ctx: &mut CheckContext,
        policy: &mut dyn RepairPolicy,
        rep: &mut CheckReport,
    ) -> CheckResult<Outcome> {
        let mut out = Outcome::empty();
        let num = self.geom.num_clusters;
        let mask = self.geom.encoding.mask();

        for cl in CLUST_FIRST..num {
            let next = self.get_next(cl)?;
            if next == CLUST_FREE {
                ctx.head.clear(cl as usize);
                ctx.num_free += 1;
            } else if next == CLUST_BAD {
                ctx.head.clear(cl as usize);
                ctx.num_bad += 1;
            } else if next < CLUST_FIRST || (next >= num && next < CLUST_EOFS) {
                rep.push(Finding::warn(
                    "FAT.RANGE",
                    format!(
                        "Cluster {cl} continues with {} cluster number {}",
                        if next < CLUST_RSRVD {
                            "out of range"
                        } else {
                            "reserved"
                        },
                        next & mask
                    ),
                ));
                if policy.ask(false, "Truncate") {
                    self.set_next(cl, CLUST_EOF)?;
                    out |= Outcome::MODIFIED;
                }
            } else if next < num {
                // Valid forward link: `next` is referenced, so not a head.
                ctx.head.clear(next as usize);
            }
        }
        Ok(out)
    }

    /// Persists the buffer to every redundant FAT copy. For a mapped table
    /// the first copy is already current and is skipped. A failing copy
    /// does not stop the remaining copies from being attempted; the last
    /// failure is returned.
    pub fn write_back<IO: BlockIO + ?Sized>(&mut self, io: &mut IO) -> CheckResult<()> {
        if self.rdonly {
            return Err(CheckError::ReadOnly);
        }
        let mut failed: Option<BlockIOError> = None;
        let first = if self.is_mapped() { 1 } else { 0 };
        for i in first..self.geom.num_fats {
            if let Err(e) = io.write_at(self.geom.fat_copy_offset(i), self.backing.as_slice()) {
                failed = Some(e);
            }
        }
        if let TableBacking::Mapped(m) = &self.backing
            && let Err(e) = m.flush()
        {
            failed = Some(e.into());
        }
        match failed {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Consumes the table, flushing a mapped backing before it is
    /// unmapped. Idempotence by ownership: there is no handle left to
    /// release twice.
    pub fn release(self) -> CheckResult<()> {
        if let TableBacking::Mapped(m) = &self.backing {
            m.flush().map_err(BlockIOError::from)?;
        }
        Ok(())
    }
}

/// Options for [`load_table`].
#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// Refuse all writes and force a copied backing.
    pub read_only: bool,
    /// Attempt a shared mapping before falling back to a copy.
    pub try_map: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            try_map: true,
        }
    }
}

/// Loads the table and runs the load-time passes: signature validation
/// and the head-populating linear scan. On any fatal error the partially
/// built state is dropped (unmapping/freeing the buffer) before returning.
pub fn load_table<IO: BlockIOMapMut + ?Sized>(
    io: &mut IO,
    geom: &FatGeometry,
    opts: &CheckOptions,
    policy: &mut dyn RepairPolicy,
    rep: &mut CheckReport,
) -> CheckResult<(FatTable, CheckContext, Outcome)> {
    let mut table = if opts.try_map {
        FatTable::load_mapped(io, geom, opts.read_only)?
    } else {
        FatTable::load_copied(io, geom, opts.read_only)?
    };
    let mut ctx = CheckContext::new(geom)?;
    let mut out = table.check_signature(policy, rep);
    out |= table.scan_heads(&mut ctx, policy, rep)?;
    Ok((table, ctx, out))
}
