// SPDX-License-Identifier: BSD-2-Clause

//! Boot-sector (BPB) parsing: derives the volume geometry the checker
//! needs and locates the FAT32 FSInfo sector.

use anyhow::{bail, Context, Result};
use fatckio::prelude::*;
use fatckfs::{Encoding, FatGeometry, FsInfoHints, CLUST_FIRST};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const SECTOR_SIGNATURE: u16 = 0xAA55;
const FSINFO_LEAD_SIGNATURE: [u8; 4] = *b"RRaA";
const FSINFO_STRUCT_SIGNATURE: [u8; 4] = *b"rrAa";
const FSINFO_TRAIL_SIGNATURE: [u8; 4] = [0x00, 0x00, 0x55, 0xAA];

/// Classic boot sector with the FAT32 extended BPB. FAT12/16 volumes lay
/// their extension out differently from offset 36 on, but none of those
/// fields are consulted for them, so one layout serves all three.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct BootSector {
    pub jump_boot: [u8; 3],
    pub oem_name: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_entry_count: u16,
    pub total_sectors_16: u16,
    pub media: u8,
    pub fat_size_16: u16,
    pub sectors_per_track: u16,
    pub num_heads: u16,
    pub hidden_sectors: u32,
    pub total_sectors_32: u32,

    // FAT32 Extended BPB
    pub fat_size_32: u32,
    pub ext_flags: u16,
    pub fs_version: u16,
    pub root_cluster: u32,
    pub fsinfo_sector: u16,
    pub backup_boot_sector: u16,
    pub reserved: [u8; 12],

    pub drive_number: u8,
    pub reserved1: u8,
    pub boot_signature: u8,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],

    pub boot_code: [u8; 420],
    pub signature: u16,
}

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct FsInfoSector {
    pub lead_signature: [u8; 4],
    pub reserved1: [u8; 480],
    pub struct_signature: [u8; 4],
    pub free_cluster_count: u32,
    pub next_free_cluster: u32,
    pub reserved2: [u8; 12],
    pub trail_signature: [u8; 4],
}

/// Everything parsed out of the reserved area.
#[derive(Debug)]
pub struct ParsedBoot {
    pub geom: FatGeometry,
    /// Byte offset of a recognized FSInfo sector, for writing hints back.
    pub fsinfo_offset: Option<u64>,
}

pub fn read_boot<IO: BlockIO + ?Sized>(io: &mut IO) -> Result<ParsedBoot> {
    let bs: BootSector = io.read_struct(0).context("cannot read boot sector")?;

    let signature = bs.signature;
    if signature != SECTOR_SIGNATURE {
        bail!("invalid boot sector signature ({signature:#06x})");
    }
    let bps = bs.bytes_per_sector;
    if !bps.is_power_of_two() || !(512..=4096).contains(&bps) {
        bail!("unsupported sector size ({bps})");
    }
    let spc = bs.sectors_per_cluster;
    if spc == 0 || !spc.is_power_of_two() {
        bail!("invalid sectors per cluster ({spc})");
    }
    if bs.reserved_sectors == 0 {
        bail!("no reserved sectors");
    }
    if bs.num_fats == 0 {
        bail!("no FAT copies");
    }

    let fat_sectors = if bs.fat_size_16 != 0 {
        bs.fat_size_16 as u32
    } else {
        bs.fat_size_32
    };
    if fat_sectors == 0 {
        bail!("FAT size is zero");
    }
    let total_sectors = if bs.total_sectors_16 != 0 {
        bs.total_sectors_16 as u64
    } else {
        bs.total_sectors_32 as u64
    };
    let root_dir_sectors = (bs.root_entry_count as u64 * 32).div_ceil(bps as u64);
    let data_start = bs.reserved_sectors as u64
        + bs.num_fats as u64 * fat_sectors as u64
        + root_dir_sectors;
    if total_sectors <= data_start {
        bail!("volume has no data region");
    }
    let clusters = (total_sectors - data_start) / spc as u64;
    let encoding = Encoding::from_cluster_count(clusters.min(u32::MAX as u64) as u32);

    // The data region may claim more clusters than one FAT copy can
    // describe; trust the smaller of the two, capped to the encoding's
    // representable range.
    let fat_bytes = fat_sectors as u64 * bps as u64;
    let fat_capacity = match encoding {
        Encoding::Fat12 => fat_bytes * 2 / 3,
        Encoding::Fat16 => fat_bytes / 2,
        Encoding::Fat32 => fat_bytes / 4,
    };
    let limit = (fatckfs::CLUST_RSRVD & encoding.mask()) as u64;
    let num_clusters = (clusters + CLUST_FIRST as u64)
        .min(fat_capacity)
        .min(limit) as u32;

    let mut fsinfo = None;
    let mut fsinfo_offset = None;
    if encoding == Encoding::Fat32 {
        let fs_version = bs.fs_version;
        if fs_version != 0 {
            bail!("unknown filesystem version ({fs_version})");
        }
        let root_cluster = bs.root_cluster;
        if root_cluster < CLUST_FIRST || root_cluster >= num_clusters {
            bail!("root directory starts at invalid cluster ({root_cluster})");
        }
        let fsinfo_sector = bs.fsinfo_sector;
        if fsinfo_sector != 0 && fsinfo_sector != 0xFFFF {
            let off = fsinfo_sector as u64 * bps as u64;
            // An unreadable or unrecognized FSInfo sector just means no
            // hints; the table check proceeds without it.
            if let Ok(fsi) = io.read_struct::<FsInfoSector>(off)
                && { fsi.lead_signature } == FSINFO_LEAD_SIGNATURE
                && { fsi.struct_signature } == FSINFO_STRUCT_SIGNATURE
                && { fsi.trail_signature } == FSINFO_TRAIL_SIGNATURE
            {
                fsinfo = Some(FsInfoHints {
                    free: fsi.free_cluster_count,
                    next_free: fsi.next_free_cluster,
                });
                fsinfo_offset = Some(off);
            }
        }
    }

    Ok(ParsedBoot {
        geom: FatGeometry {
            bytes_per_sector: bps,
            reserved_sectors: bs.reserved_sectors,
            fat_sectors,
            num_fats: bs.num_fats,
            num_clusters,
            encoding,
            media: bs.media,
            fsinfo,
        },
        fsinfo_offset,
    })
}

/// Writes corrected hints back into the FSInfo sector, leaving every
/// other field as found.
pub fn write_fsinfo<IO: BlockIO + ?Sized>(
    io: &mut IO,
    boot: &ParsedBoot,
    hints: &FsInfoHints,
) -> Result<()> {
    let Some(off) = boot.fsinfo_offset else {
        return Ok(());
    };
    let mut fsi: FsInfoSector = io.read_struct(off).context("cannot reread FSInfo sector")?;
    fsi.free_cluster_count = hints.free;
    fsi.next_free_cluster = hints.next_free;
    io.write_struct(off, &fsi)
        .context("cannot write FSInfo sector")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fatckio::prelude::*;
    use zerocopy::FromZeros;

    fn base_boot() -> BootSector {
        let mut bs = BootSector::new_zeroed();
        bs.bytes_per_sector = 512;
        bs.sectors_per_cluster = 1;
        bs.reserved_sectors = 1;
        bs.num_fats = 2;
        bs.media = 0xF8;
        bs.signature = SECTOR_SIGNATURE;
        bs
    }

    #[test]
    fn test_small_volume_is_fat12() {
        let mut bs = base_boot();
        bs.root_entry_count = 32;
        bs.fat_size_16 = 12;
        bs.total_sectors_16 = 2048;

        let mut bytes = vec![0u8; 512];
        bytes.copy_from_slice(bs.as_bytes());
        let mut io = MemBlockIO::new(&mut bytes);

        let boot = read_boot(&mut io).unwrap();
        assert_eq!(boot.geom.encoding, Encoding::Fat12);
        // 1 reserved + 24 FAT + 2 root dir sectors before the data area.
        assert_eq!(boot.geom.num_clusters, (2048 - 27) + 2);
        assert_eq!(boot.geom.fat_offset(), 512);
        assert!(boot.geom.fsinfo.is_none());
    }

    #[test]
    fn test_fat32_with_fsinfo_hints() {
        let mut bs = base_boot();
        bs.fat_size_32 = 1024;
        bs.total_sectors_32 = 200_000;
        bs.root_cluster = 2;
        bs.fsinfo_sector = 1;
        bs.reserved_sectors = 2;

        let mut fsi = FsInfoSector::new_zeroed();
        fsi.lead_signature = FSINFO_LEAD_SIGNATURE;
        fsi.struct_signature = FSINFO_STRUCT_SIGNATURE;
        fsi.trail_signature = FSINFO_TRAIL_SIGNATURE;
        fsi.free_cluster_count = 1234;
        fsi.next_free_cluster = 77;

        let mut bytes = vec![0u8; 1024];
        bytes[..512].copy_from_slice(bs.as_bytes());
        bytes[512..].copy_from_slice(fsi.as_bytes());
        let mut io = MemBlockIO::new(&mut bytes);

        let boot = read_boot(&mut io).unwrap();
        assert_eq!(boot.geom.encoding, Encoding::Fat32);
        assert_eq!(
            boot.geom.fsinfo,
            Some(FsInfoHints {
                free: 1234,
                next_free: 77
            })
        );
        assert_eq!(boot.fsinfo_offset, Some(512));

        // Round-trip a hint correction.
        write_fsinfo(
            &mut io,
            &boot,
            &FsInfoHints {
                free: 99,
                next_free: 3,
            },
        )
        .unwrap();
        let reread: FsInfoSector = io.read_struct(512).unwrap();
        assert_eq!({ reread.free_cluster_count }, 99);
        assert_eq!({ reread.next_free_cluster }, 3);
        assert_eq!({ reread.lead_signature }, FSINFO_LEAD_SIGNATURE);
    }

    #[test]
    fn test_bad_fsinfo_signature_means_no_hints() {
        let mut bs = base_boot();
        bs.fat_size_32 = 1024;
        bs.total_sectors_32 = 200_000;
        bs.root_cluster = 2;
        bs.fsinfo_sector = 1;
        bs.reserved_sectors = 2;

        let mut bytes = vec![0u8; 1024];
        bytes[..512].copy_from_slice(bs.as_bytes());
        let mut io = MemBlockIO::new(&mut bytes);

        let boot = read_boot(&mut io).unwrap();
        assert!(boot.geom.fsinfo.is_none());
        assert!(boot.fsinfo_offset.is_none());
    }

    #[test]
    fn test_bad_signature_rejected() {
        let mut bs = base_boot();
        bs.fat_size_16 = 12;
        bs.total_sectors_16 = 2048;
        bs.signature = 0x1234;

        let mut bytes = vec![0u8; 512];
        bytes.copy_from_slice(bs.as_bytes());
        let mut io = MemBlockIO::new(&mut bytes);
        assert!(read_boot(&mut io).is_err());
    }

    #[test]
    fn test_degenerate_geometry_rejected() {
        let mut bs = base_boot();
        bs.fat_size_16 = 12;
        bs.total_sectors_16 = 20; // smaller than the reserved area
        let mut bytes = vec![0u8; 512];
        bytes.copy_from_slice(bs.as_bytes());
        assert!(read_boot(&mut MemBlockIO::new(&mut bytes)).is_err());

        let mut bs = base_boot();
        bs.fat_size_16 = 12;
        bs.total_sectors_16 = 2048;
        bs.sectors_per_cluster = 3; // not a power of two
        let mut bytes = vec![0u8; 512];
        bytes.copy_from_slice(bs.as_bytes());
        assert!(read_boot(&mut MemBlockIO::new(&mut bytes)).is_err());
    }
}
