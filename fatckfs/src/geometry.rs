// SPDX-License-Identifier: BSD-2-Clause

//! Volume geometry as supplied by the boot-sector collaborator, plus the
//! cluster-number constants shared by every FAT encoding.
//!
//! Successor values read from the table are normalized into a single
//! 32-bit sentinel space: after masking to the encoding width, anything at
//! or above the encoding's "bad" value is sign-extended with the mask's
//! complement, so `CLUST_BAD`, the reserved band and the EOF band compare
//! identically for FAT12, FAT16 and FAT32.

/// Cluster index type. FAT32 tables can have up to 2^28 entries.
pub type Cluster = u32;

pub const CLUST_FREE: Cluster = 0;
/// First allocatable cluster; entries 0 and 1 are reserved pseudo-entries.
pub const CLUST_FIRST: Cluster = 2;
/// Start of the reserved band.
pub const CLUST_RSRVD: Cluster = 0xFFFF_FFF6;
pub const CLUST_BAD: Cluster = 0xFFFF_FFF7;
/// Start of the end-of-chain band (`CLUST_EOFS..=CLUST_EOF`).
pub const CLUST_EOFS: Cluster = 0xFFFF_FFF8;
pub const CLUST_EOF: Cluster = 0xFFFF_FFFF;

/// The three on-disk entry encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Fat12,
    Fat16,
    Fat32,
}

impl Encoding {
    /// Mask of the bits an entry actually stores (28 for FAT32).
    #[inline]
    pub const fn mask(self) -> u32 {
        match self {
            Encoding::Fat12 => 0x0FFF,
            Encoding::Fat16 => 0xFFFF,
            Encoding::Fat32 => 0x0FFF_FFFF,
        }
    }

    /// Sign-extends a masked raw entry into the shared sentinel space.
    #[inline]
    pub fn normalize(self, raw: u32) -> Cluster {
        let mask = self.mask();
        let mut v = raw & mask;
        if v >= (CLUST_BAD & mask) {
            v |= !mask;
        }
        v
    }

    /// Encoding selection per the MS thresholds on data-cluster count.
    pub fn from_cluster_count(clusters: u32) -> Self {
        if clusters < 4085 {
            Encoding::Fat12
        } else if clusters < 65525 {
            Encoding::Fat16
        } else {
            Encoding::Fat32
        }
    }

    /// Number of reserved-entry signature bytes at the start of the table.
    #[inline]
    pub const fn signature_len(self) -> usize {
        match self {
            Encoding::Fat12 => 3,
            Encoding::Fat16 => 4,
            Encoding::Fat32 => 8,
        }
    }
}

/// FAT32 FSInfo hint fields, handed over by the boot-sector collaborator.
/// `0xFFFFFFFF` in either field means "unknown" and is left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsInfoHints {
    /// Claimed total free-cluster count.
    pub free: u32,
    /// Claimed next-free cluster.
    pub next_free: u32,
}

pub const FSINFO_UNKNOWN: u32 = 0xFFFF_FFFF;

/// Everything the checker needs to know about the volume layout.
///
/// Produced by boot-sector/BPB parsing, which lives outside this crate.
#[derive(Debug, Clone)]
pub struct FatGeometry {
    pub bytes_per_sector: u16,
    /// Sectors before the first FAT copy (BPB_RsvdSecCnt).
    pub reserved_sectors: u16,
    /// Sectors per FAT copy (FATsecs).
    pub fat_sectors: u32,
    /// Number of FAT copies (BPB_NumFATs).
    pub num_fats: u8,
    /// One past the last valid cluster: valid range is
    /// `[CLUST_FIRST, num_clusters)`.
    pub num_clusters: Cluster,
    pub encoding: Encoding,
    /// BPB media descriptor byte, mirrored in the table's entry 0.
    pub media: u8,
    /// FSInfo hints, present on FAT32 volumes that carry the sector.
    pub fsinfo: Option<FsInfoHints>,
}

impl FatGeometry {
    /// Byte offset of the first FAT copy from the start of the volume.
    #[inline]
    pub fn fat_offset(&self) -> u64 {
        self.reserved_sectors as u64 * self.bytes_per_sector as u64
    }

    /// Byte offset of the `index`th FAT copy.
    #[inline]
    pub fn fat_copy_offset(&self, index: u8) -> u64 {
        self.fat_offset() + index as u64 * self.fat_sectors as u64 * self.bytes_per_sector as u64
    }

    /// Byte length of one FAT copy.
    #[inline]
    pub fn fat_bytes(&self) -> usize {
        self.fat_sectors as usize * self.bytes_per_sector as usize
    }

    #[inline]
    pub fn valid_cluster(&self, cl: Cluster) -> bool {
        (CLUST_FIRST..self.num_clusters).contains(&cl)
    }
}

/// Human-readable class of a sentinel successor, for messages.
pub fn rsrvd_kind(cl: Cluster) -> &'static str {
    if cl == CLUST_FREE {
        "free"
    } else if cl < CLUST_BAD {
        "reserved"
    } else if cl > CLUST_BAD {
        "as EOF"
    } else {
        "bad"
    }
}
