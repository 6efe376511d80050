// SPDX-License-Identifier: BSD-2-Clause

//! Allocation-table integrity checking for FAT12/16/32 volumes.
//!
//! The crate owns everything between "here is the volume geometry" and
//! "here is the repaired table": loading a FAT copy (shared mapping or
//! private buffer), validating its reserved signature entries, scanning
//! for chain heads, walking chains with cross-link detection, recovering
//! lost chains and reconciling FAT32 FSInfo hints. Boot-sector parsing,
//! directory traversal and user interaction stay outside; they plug in
//! through [`FatGeometry`], [`CheckContext::claim_head`],
//! [`ReconnectSink`] and [`RepairPolicy`].
//!
//! A typical table-only check:
//!
//! ```ignore
//! let (mut table, mut ctx, mut out) =
//!     load_table(&mut io, &geom, &CheckOptions::default(), &mut policy, &mut rep)?;
//! let lost = check_lost(&mut table, &mut ctx, &mut policy, &mut DropLost, &mut rep)?;
//! out |= lost.outcome;
//! if out.contains(Outcome::MODIFIED) {
//!     table.write_back(&mut io)?;
//! }
//! table.release()?;
//! ```

pub mod bitmap;
pub mod check;
pub mod dirty;
pub mod errors;
pub mod geometry;
pub mod lost;
pub mod policy;
pub mod report;
pub mod table;

pub use bitmap::{ClusterBitmap, WORD_BITS};
pub use check::{clear_chain, walk_chain, CheckContext};
pub use dirty::is_dirty;
pub use errors::{CheckError, CheckResult};
pub use geometry::{
    rsrvd_kind, Cluster, Encoding, FatGeometry, FsInfoHints, CLUST_BAD, CLUST_EOF, CLUST_EOFS,
    CLUST_FIRST, CLUST_FREE, CLUST_RSRVD, FSINFO_UNKNOWN,
};
pub use lost::{check_lost, DropLost, LostCheck, Reconnect, ReconnectSink};
pub use policy::{FixAll, RepairPolicy, ReportOnly, UseDefault};
pub use report::{CheckReport, Finding, Outcome, Severity};
pub use table::{load_table, CheckOptions, FatTable, TableBacking};
