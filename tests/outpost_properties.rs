//! Property tests for outpost lifecycle hysteresis

use ashcap::city::outpost::{Outpost, OutpostStatus};
use ashcap::core::config::OutpostConfig;
use ashcap::core::types::{OutpostId, TilePos};
use ashcap::entity::role::Role;
use ashcap::simulation::outposts::{is_unstable, next_status};
use proptest::prelude::*;

const TARGET: u32 = 10;

fn config() -> OutpostConfig {
    OutpostConfig {
        failing_after_ticks: 6,
        evacuate_after_ticks: 1_000,
        ..OutpostConfig::default()
    }
}

fn outpost() -> Outpost {
    Outpost::new(OutpostId(1), "Mossden", TilePos::new(40, 40), false)
        .with_target_mix([(Role::Miner, TARGET)])
}

fn set_population(outpost: &mut Outpost, population: u32) {
    outpost.runtime.population = population;
    outpost.runtime.target_population = TARGET;
    outpost.runtime.deficit_by_role = [(Role::Miner, TARGET.saturating_sub(population))]
        .into_iter()
        .filter(|(_, n)| *n > 0)
        .collect();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_failing_needs_a_long_unstable_streak(pops in proptest::collection::vec(0u32..=12, 1..80)) {
        let cfg = config();
        let mut outpost = outpost();
        let mut streak_start: Option<u64> = None;

        for (i, pop) in pops.iter().enumerate() {
            let tick = i as u64 + 1;
            set_population(&mut outpost, *pop);
            let unstable = is_unstable(&outpost, &cfg);
            if unstable {
                streak_start.get_or_insert(tick);
            } else {
                streak_start = None;
            }

            let before = outpost.status;
            let after = next_status(&mut outpost, tick, &cfg);
            if after == OutpostStatus::Failing && before != OutpostStatus::Failing {
                outpost.failing_since = Some(tick);
                let start = streak_start.expect("failing without an unstable streak");
                prop_assert!(tick - start >= cfg.failing_after_ticks);
            }
            if !unstable {
                prop_assert_ne!(after, OutpostStatus::Failing);
            }
            outpost.status = after;
        }
    }

    #[test]
    fn prop_steady_population_never_fails(pop in 8u32..=12, ticks in 1usize..200) {
        let cfg = config();
        let mut outpost = outpost();
        for tick in 1..=ticks as u64 {
            set_population(&mut outpost, pop);
            outpost.status = next_status(&mut outpost, tick, &cfg);
            prop_assert!(matches!(outpost.status, OutpostStatus::Viable | OutpostStatus::Stable));
        }
    }

    #[test]
    fn prop_abandoned_is_terminal(pops in proptest::collection::vec(0u32..=12, 1..40)) {
        let cfg = config();
        let mut outpost = outpost();
        outpost.status = OutpostStatus::Abandoned;
        for (i, pop) in pops.iter().enumerate() {
            set_population(&mut outpost, *pop);
            outpost.status = next_status(&mut outpost, i as u64 + 1, &cfg);
            prop_assert_eq!(outpost.status, OutpostStatus::Abandoned);
        }
    }
}
