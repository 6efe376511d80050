// SPDX-License-Identifier: BSD-2-Clause

//! Lost-chain recovery: after directory traversal has claimed its chains,
//! every head bit still set marks an orphaned allocation. Each orphan is
//! walked, offered to a reconnection sink, and cleared under policy if
//! nobody takes it. FAT32 FSInfo hints are reconciled at the end, once
//! the free count is final.

use crate::bitmap::WORD_BITS;
use crate::check::{clear_chain, walk_chain, CheckContext};
use crate::errors::CheckResult;
use crate::geometry::*;
use crate::policy::RepairPolicy;
use crate::report::{CheckReport, Finding, Outcome};
use crate::table::FatTable;

/// What a [`ReconnectSink`] did with an offered chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconnect {
    /// The chain was grafted somewhere reachable; the table changed.
    Reconnected,
    /// Not taken; the chain stays lost and may be cleared instead.
    Declined,
}

/// Receives lost-but-consistent chains. A directory-aware caller can graft
/// them into a recovery directory; this crate itself never creates
/// directory entries.
pub trait ReconnectSink {
    fn reconnect(
        &mut self,
        table: &mut FatTable,
        ctx: &mut CheckContext,
        head: Cluster,
        length: usize,
    ) -> CheckResult<Reconnect>;

    /// Called once after the sweep, for sinks that batch their work.
    fn finish(&mut self) -> CheckResult<()> {
        Ok(())
    }
}

/// The no-op sink: declines everything, so lost chains are only ever
/// reported or cleared.
#[derive(Debug, Default, Clone, Copy)]
pub struct DropLost;

impl ReconnectSink for DropLost {
    fn reconnect(
        &mut self,
        _table: &mut FatTable,
        _ctx: &mut CheckContext,
        _head: Cluster,
        _length: usize,
    ) -> CheckResult<Reconnect> {
        Ok(Reconnect::Declined)
    }
}

/// Result of [`check_lost`].
#[derive(Debug)]
pub struct LostCheck {
    pub outcome: Outcome,
    /// Corrected FSInfo hints, `Some` only when a hint was actually
    /// changed and the caller should persist the FSInfo sector.
    pub fsinfo: Option<FsInfoHints>,
}

/// Sweeps the head bitmap for orphaned chains, then reconciles the FSInfo
/// hints against the final free count.
///
/// The sweep is bounded two ways: by cluster range and by the number of
/// set head bits, so a table whose tail is fully claimed terminates
/// early. All-clear 64-bit blocks are skipped whole.
pub fn check_lost(
    table: &mut FatTable,
    ctx: &mut CheckContext,
    policy: &mut dyn RepairPolicy,
    sink: &mut dyn ReconnectSink,
    rep: &mut CheckReport,
) -> CheckResult<LostCheck> {
    let mut out = Outcome::empty();
    let num = table.geom().num_clusters;
    let mut head = CLUST_FIRST;

    // Bits 0 and 1 are never cleared, so the count settles at 2 once
    // every real head has been visited.
    while ctx.head.count() > CLUST_FIRST as usize && head < num {
        if head as usize % WORD_BITS == 0 && !ctx.head.any_in_word(head as usize) {
            head += WORD_BITS as Cluster;
            continue;
        }
        if !ctx.is_head(head) {
            head += 1;
            continue;
        }
        let (length, wout) = walk_chain(table, ctx, head, policy, rep)?;
        out |= wout & Outcome::MODIFIED;
        let mut orphaned = true;
        if !wout.contains(Outcome::UNRESOLVED) {
            rep.push(Finding::warn(
                "LOST.CHAIN",
                format!("Lost cluster chain at cluster {head}, {length} cluster(s) lost"),
            ));
            if sink.reconnect(table, ctx, head, length)? == Reconnect::Reconnected {
                out |= Outcome::MODIFIED;
                orphaned = false;
            }
        }
        if orphaned {
            if policy.ask(false, "Clear") {
                clear_chain(table, ctx, head)?;
                out |= Outcome::MODIFIED;
            } else {
                out |= Outcome::UNRESOLVED;
            }
        }
        ctx.head.clear(head as usize);
        head += 1;
    }
    sink.finish()?;

    let fsinfo = reconcile_fsinfo(table, ctx, policy, rep)?;
    Ok(LostCheck { outcome: out, fsinfo })
}

/// Compares the FAT32 FSInfo hints with the counts just established and
/// corrects them under policy. A hint holding the "unknown" marker is
/// left alone. Only returns `Some` when something changed; persisting the
/// sector is the caller's job, so no table outcome flag is raised here.
fn reconcile_fsinfo(
    table: &mut FatTable,
    ctx: &CheckContext,
    policy: &mut dyn RepairPolicy,
    rep: &mut CheckReport,
) -> CheckResult<Option<FsInfoHints>> {
    let Some(mut hints) = table.geom().fsinfo else {
        return Ok(None);
    };
    let num = table.geom().num_clusters;
    let mut changed = false;

    if hints.free != FSINFO_UNKNOWN && hints.free != ctx.num_free {
        rep.push(Finding::warn(
            "FSI.FREE",
            format!(
                "Free space in FSInfo block ({}) not correct ({})",
                hints.free, ctx.num_free
            ),
        ));
        if policy.ask(true, "Fix") {
            hints.free = ctx.num_free;
            changed = true;
        }
    }

    if hints.next_free != FSINFO_UNKNOWN {
        let out_of_range = hints.next_free < CLUST_FIRST || hints.next_free >= num;
        let stale = !out_of_range
            && ctx.num_free > 0
            && table.get_next(hints.next_free)? != CLUST_FREE;
        if out_of_range || stale {
            rep.push(Finding::warn(
                "FSI.NEXT",
                format!(
                    "Next free cluster in FSInfo block ({}) {}",
                    hints.next_free,
                    if out_of_range { "invalid" } else { "not free" }
                ),
            ));
            if policy.ask(true, "Fix") {
                for cl in CLUST_FIRST..num {
                    if table.get_next(cl)? == CLUST_FREE {
                        hints.next_free = cl;
                        changed = true;
                        break;
                    }
                }
            }
        }
    }

    Ok(if changed { Some(hints) } else { None })
}
