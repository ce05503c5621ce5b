//! Status - coalescer と resolver のカウンタをまとめたビュー

use serde::{Deserialize, Serialize};

use crate::batch::ResolverStats;
use crate::coalescer::CoalescerStats;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub coalescer: CoalescerStats,
    pub resolver: ResolverStats,
    /// Locations still showing their placeholder.
    pub unresolved_locations: usize,
}

impl Status {
    /// No queued work and no request in flight.
    pub fn is_idle(&self) -> bool {
        self.coalescer.backlog == 0 && self.resolver.in_flight == 0
    }
}
