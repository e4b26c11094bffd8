//! Task registries: haul, processing, wall, defense maintenance, migration
//!
//! All five share one claim discipline, [`Lease`]: a task is claimable when
//! unclaimed, when its lease has run out, or by the goblin already holding
//! it. A lease claimed at tick `t` for `n` ticks is held through `t + n - 1`
//! and lapses at `t + n`.

pub mod defense;
pub mod haul;
pub mod migration;
pub mod processing;
pub mod wall;

use serde::{Deserialize, Serialize};

use crate::core::types::{AgentId, Tick};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub claimed_by: Option<AgentId>,
    pub claimed_until: Tick,
}

impl Lease {
    /// Current holder, if the lease has not lapsed
    pub fn holder(&self, tick: Tick) -> Option<AgentId> {
        self.claimed_by.filter(|_| tick < self.claimed_until)
    }

    pub fn is_held_by(&self, agent: AgentId, tick: Tick) -> bool {
        self.holder(tick) == Some(agent)
    }

    pub fn is_claimable_by(&self, agent: AgentId, tick: Tick) -> bool {
        self.holder(tick).map_or(true, |holder| holder == agent)
    }

    /// Claim or renew; false if someone else holds it
    pub fn claim(&mut self, agent: AgentId, tick: Tick, lease_ticks: u64) -> bool {
        if !self.is_claimable_by(agent, tick) {
            return false;
        }
        self.claimed_by = Some(agent);
        self.claimed_until = tick + lease_ticks;
        true
    }

    /// Extend a lease the agent already holds
    pub fn renew(&mut self, agent: AgentId, tick: Tick, lease_ticks: u64) -> bool {
        if !self.is_held_by(agent, tick) {
            return false;
        }
        self.claimed_until = tick + lease_ticks;
        true
    }

    pub fn release(&mut self) {
        self.claimed_by = None;
        self.claimed_until = 0;
    }

    /// Clear a lapsed claim; true if one was cleared
    pub fn expire(&mut self, tick: Tick) -> bool {
        if self.claimed_by.is_some() && self.holder(tick).is_none() {
            self.release();
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_exclusive_until_expiry() {
        let a = AgentId(1);
        let b = AgentId(2);
        let mut lease = Lease::default();
        assert!(lease.claim(a, 10, 16));
        assert!(!lease.claim(b, 10, 16));
        assert!(!lease.is_claimable_by(b, 25));
        assert!(lease.is_claimable_by(a, 25));
        assert!(lease.is_claimable_by(b, 26));
        assert!(lease.claim(b, 26, 16));
        assert_eq!(lease.holder(26), Some(b));
    }

    #[test]
    fn test_renew_requires_holder() {
        let mut lease = Lease::default();
        assert!(!lease.renew(AgentId(1), 0, 10));
        lease.claim(AgentId(1), 0, 10);
        assert!(lease.renew(AgentId(1), 8, 10));
        assert_eq!(lease.claimed_until, 18);
        assert!(!lease.renew(AgentId(1), 18, 10));
    }

    #[test]
    fn test_expire_clears_only_lapsed() {
        let mut lease = Lease::default();
        lease.claim(AgentId(1), 0, 5);
        assert!(!lease.expire(4));
        assert!(lease.expire(5));
        assert_eq!(lease.claimed_by, None);
        assert!(!lease.expire(6));
    }
}
