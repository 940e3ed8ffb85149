//! Partitions a batch of records into pages and tiling positions. Records
//! fill pages in order; the final page may be partially occupied.

use crate::error::CertPressError;

/// One record's slot in the output document. Positions are 1-based to match
/// the position-table numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub record_index: usize,
    pub page: usize,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilingPlan {
    instances_per_page: usize,
    slots: Vec<Slot>,
    page_count: usize,
}

impl TilingPlan {
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn instances_per_page(&self) -> usize {
        self.instances_per_page
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Record indices on one page, in position order.
    pub fn page(&self, page: usize) -> impl Iterator<Item = &Slot> {
        self.slots.iter().filter(move |slot| slot.page == page)
    }

    pub fn occupancy(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.page_count];
        for slot in &self.slots {
            counts[slot.page] += 1;
        }
        counts
    }
}

/// `instances_per_page` is trusted here; template validation rejects values
/// outside 1..=3 before a plan is ever built.
pub fn allocate(record_count: usize, instances_per_page: usize) -> Result<TilingPlan, CertPressError> {
    if record_count == 0 {
        return Err(CertPressError::EmptyBatch);
    }
    let page_count = record_count.div_ceil(instances_per_page);
    let mut slots = Vec::with_capacity(record_count);
    for record_index in 0..record_count {
        slots.push(Slot {
            record_index,
            page: record_index / instances_per_page,
            position: record_index % instances_per_page + 1,
        });
    }
    Ok(TilingPlan {
        instances_per_page,
        slots,
        page_count,
    })
}
