// SPDX-License-Identifier: BSD-2-Clause

//! Chain traversal: the used/head bitmap state and the walk that claims
//! clusters, measures chain length and catches cross-links.

use crate::bitmap::ClusterBitmap;
use crate::errors::CheckResult;
use crate::geometry::*;
use crate::policy::RepairPolicy;
use crate::report::{CheckReport, Finding, Outcome};
use crate::table::FatTable;

/// Mark-and-sweep state shared by every traversal over one table.
///
/// `head` starts all-set and the linear scan clears a bit for every
/// cluster some entry points at; what survives are chain heads. `used`
/// starts all-clear and [`walk_chain`] sets a bit the moment a traversal
/// claims a cluster, so a second claim is a cross-link.
#[derive(Debug)]
pub struct CheckContext {
    pub used: ClusterBitmap,
    pub head: ClusterBitmap,
    /// Free entries seen (maintained through repairs, so it stays
    /// comparable to the FSInfo free-count hint).
    pub num_free: u32,
    /// Entries marked bad.
    pub num_bad: u32,
}

impl CheckContext {
    pub fn new(geom: &FatGeometry) -> CheckResult<Self> {
        let bits = geom.num_clusters as usize;
        Ok(Self {
            used: ClusterBitmap::try_new(bits, false)?,
            head: ClusterBitmap::try_new(bits, true)?,
            num_free: 0,
            num_bad: 0,
        })
    }

    #[inline]
    pub fn is_head(&self, cl: Cluster) -> bool {
        self.head.get(cl as usize)
    }

    /// Clears the head bit when an external reference (a directory entry)
    /// claims `cl` as a chain start. Returns `false` if it was already
    /// claimed or linked to.
    #[inline]
    pub fn claim_head(&mut self, cl: Cluster) -> bool {
        self.head.clear(cl as usize)
    }

    #[inline]
    pub fn is_used(&self, cl: Cluster) -> bool {
        self.used.get(cl as usize)
    }
}

/// Walks the chain starting at `head`, claiming every visited cluster in
/// the used bitmap and counting the chain length.
///
/// Three exits:
/// - the successor is in the EOF band: clean end, empty [`Outcome`];
/// - the successor is free/reserved/bad/out of range: the link is bogus
///   and the chain is truncated at the current cluster under policy;
/// - the successor is already used: cross-link, same truncation offer.
///
/// Declined truncations return `UNRESOLVED` so the caller knows the chain
/// still reaches forbidden territory. Cycles need no special case: a
/// cycle always re-enters a cluster this walk already claimed.
pub fn walk_chain(
    table: &mut FatTable,
    ctx: &mut CheckContext,
    head: Cluster,
    policy: &mut dyn RepairPolicy,
    rep: &mut CheckReport,
) -> CheckResult<(usize, Outcome)> {
    let mut len = 0usize;
    if !ctx.used.set(head as usize) {
        rep.push(Finding::warn(
            "CHAIN.CROSS",
            format!("Chain starting at cluster {head} is already claimed"),
        ));
        return Ok((0, Outcome::UNRESOLVED));
    }
    let mut cur = head;
    loop {
        let next = table.get_next(cur)?;
        if !table.geom().valid_cluster(next) {
            if next >= CLUST_EOFS {
                // Clean termination; the terminal cluster counts.
                return Ok((len + 1, Outcome::empty()));
            }
            rep.push(Finding::warn(
                "CHAIN.END",
                format!(
                    "Cluster chain starting at {head} continues with cluster marked {} at {cur}",
                    rsrvd_kind(next)
                ),
            ));
            return truncate_at(table, cur, len, policy);
        }
        if !ctx.used.set(next as usize) {
            rep.push(Finding::warn(
                "CHAIN.CROSS",
                format!("Cluster chain starting at {head} crosses another chain at {cur} -> {next}"),
            ));
            return truncate_at(table, cur, len, policy);
        }
        len += 1;
        cur = next;
    }
}

fn truncate_at(
    table: &mut FatTable,
    cur: Cluster,
    len: usize,
    policy: &mut dyn RepairPolicy,
) -> CheckResult<(usize, Outcome)> {
    if policy.ask(false, "Truncate") {
        table.set_next(cur, CLUST_EOF)?;
        Ok((len + 1, Outcome::MODIFIED))
    } else {
        Ok((len + 1, Outcome::UNRESOLVED))
    }
}

/// Frees every cluster of the chain starting at `head`, dropping used
/// claims and crediting the free counter as it goes. Safe on cycles:
/// a freed entry reads back as `CLUST_FREE`, which ends the loop.
pub fn clear_chain(table: &mut FatTable, ctx: &mut CheckContext, head: Cluster) -> CheckResult<()> {
    let mut cur = head;
    while table.geom().valid_cluster(cur) {
        let next = table.get_next(cur)?;
        if next == CLUST_FREE {
            // Entry already free (counted as free at scan time); a walk
            // may still hold a claim on it, which must not outlive the
            // chain.
            if ctx.used.get(cur as usize) {
                ctx.used.clear(cur as usize);
            }
            break;
        }
        table.set_next(cur, CLUST_FREE)?;
        if ctx.used.get(cur as usize) {
            ctx.used.clear(cur as usize);
        }
        ctx.num_free += 1;
        cur = next;
    }
    Ok(())
}
