//! Leaderboard ranking: full recompute of weekly and all-time dense ranks.
//! Ranks are derived state; running this redundantly is always safe.

use std::collections::HashMap;

use tracing::info;
use uuid::Uuid;

use breakwire_common::{BreakwireError, UserReputation};
use breakwire_store::Store;

pub struct LeaderboardRanker {
    store: Store,
}

impl LeaderboardRanker {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Rebuild every user's weekly and all-time rank from totals.
    pub async fn recompute(&self) -> Result<(), BreakwireError> {
        let reputations = self.store.all_reputations().await?;
        let ranks = compute_ranks(&reputations);
        self.store.write_ranks(&ranks).await?;
        info!(users = ranks.len(), "Leaderboard ranks recomputed");
        Ok(())
    }
}

/// Dense ranks (1, 2, 3, no gaps) for both boards. Ties break on user id so
/// repeated runs over the same totals produce identical orderings. Users
/// with zero weekly kudos are left unranked on the weekly board.
pub fn compute_ranks(reputations: &[UserReputation]) -> Vec<(Uuid, Option<i32>, Option<i32>)> {
    let all_time = ranked_by(reputations, |r| r.total_kudos, false);
    let weekly = ranked_by(reputations, |r| r.weekly_kudos, true);

    reputations
        .iter()
        .map(|r| {
            (
                r.user_id,
                all_time.get(&r.user_id).copied(),
                weekly.get(&r.user_id).copied(),
            )
        })
        .collect()
}

fn ranked_by(
    reputations: &[UserReputation],
    kudos: impl Fn(&UserReputation) -> i64,
    exclude_zero: bool,
) -> HashMap<Uuid, i32> {
    let mut eligible: Vec<&UserReputation> = reputations
        .iter()
        .filter(|r| !exclude_zero || kudos(r) != 0)
        .collect();
    eligible.sort_by(|a, b| kudos(b).cmp(&kudos(a)).then_with(|| a.user_id.cmp(&b.user_id)));
    eligible
        .iter()
        .enumerate()
        .map(|(i, r)| (r.user_id, i as i32 + 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rep(user_id: Uuid, total: i64, weekly: i64) -> UserReputation {
        UserReputation {
            user_id,
            total_kudos: total,
            weekly_kudos: weekly,
            all_time_rank: None,
            weekly_rank: None,
        }
    }

    #[test]
    fn ranks_are_dense_and_descending() {
        let users: Vec<UserReputation> = [500, 300, 300, 100]
            .iter()
            .map(|&k| rep(Uuid::new_v4(), k, k))
            .collect();
        let ranks = compute_ranks(&users);
        let mut all_time: Vec<i32> = ranks.iter().filter_map(|(_, a, _)| *a).collect();
        all_time.sort_unstable();
        assert_eq!(all_time, vec![1, 2, 3, 4]);
    }

    #[test]
    fn ties_break_on_user_id_stably() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let users = vec![rep(b, 300, 300), rep(a, 300, 300)];
        let first = compute_ranks(&users);
        let second = compute_ranks(&users);
        assert_eq!(first, second);
        let rank_of = |id: Uuid, ranks: &[(Uuid, Option<i32>, Option<i32>)]| {
            ranks.iter().find(|(u, _, _)| *u == id).unwrap().1.unwrap()
        };
        assert_eq!(rank_of(a, &first), 1);
        assert_eq!(rank_of(b, &first), 2);
    }

    #[test]
    fn zero_weekly_kudos_is_unranked_weekly_but_ranked_all_time() {
        let dormant = Uuid::from_u128(7);
        let users = vec![rep(dormant, 900, 0), rep(Uuid::from_u128(8), 100, 100)];
        let ranks = compute_ranks(&users);
        let entry = ranks.iter().find(|(u, _, _)| *u == dormant).unwrap();
        assert_eq!(entry.1, Some(1));
        assert_eq!(entry.2, None);
    }

    #[test]
    fn empty_input_yields_no_ranks() {
        assert!(compute_ranks(&[]).is_empty());
    }
}
