use std::{cmp::Ordering, collections::HashMap};

use shared::domain::{Athlete, AthleteId, LiftKind, ATTEMPTS_PER_LIFT};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryRanks {
    pub snatch: Option<usize>,
    pub clean_jerk: Option<usize>,
    pub total: Option<usize>,
}

fn start_key(a: &Athlete) -> (u32, u32) {
    (
        a.start_number.unwrap_or(u32::MAX),
        a.lot_number.unwrap_or(u32::MAX),
    )
}

fn lift_rank(kind: LiftKind) -> u8 {
    match kind {
        LiftKind::Snatch => 0,
        LiftKind::CleanJerk => 1,
    }
}

/// Lifting order: snatch before clean & jerk, lighter bar first, fewer
/// attempts first, then whoever took their previous attempt earlier, then
/// start number. Athletes with no attempts left go last.
pub fn compare_for_lifting(a: &Athlete, b: &Athlete) -> Ordering {
    a.is_done()
        .cmp(&b.is_done())
        .then_with(|| {
            if a.is_done() {
                return Ordering::Equal;
            }
            lift_rank(a.lift_kind())
                .cmp(&lift_rank(b.lift_kind()))
                .then(a.next_requested_weight().cmp(&b.next_requested_weight()))
                .then(a.attempt_number().cmp(&b.attempt_number()))
                .then(a.previous_lift_time.cmp(&b.previous_lift_time))
        })
        .then_with(|| start_key(a).cmp(&start_key(b)))
}

pub fn lifting_order(athletes: &[Athlete]) -> Vec<AthleteId> {
    sorted_ids(athletes, compare_for_lifting)
}

/// Start-list order used by the bottom section of scoreboards.
pub fn display_order(athletes: &[Athlete]) -> Vec<AthleteId> {
    sorted_ids(athletes, |a, b| {
        start_key(a)
            .cmp(&start_key(b))
            .then_with(|| a.last_name.cmp(&b.last_name))
    })
}

pub fn results_order(athletes: &[Athlete]) -> Vec<AthleteId> {
    sorted_ids(athletes, |a, b| {
        a.category
            .cmp(&b.category)
            .then_with(|| compare_totals(a, b))
    })
}

/// Ranking across every category by total.
pub fn global_ranking(athletes: &[Athlete]) -> Vec<AthleteId> {
    sorted_ids(athletes, compare_totals)
}

fn compare_totals(a: &Athlete, b: &Athlete) -> Ordering {
    let (ta, tb) = (a.total(), b.total());
    (ta == 0)
        .cmp(&(tb == 0))
        .then(tb.cmp(&ta))
        .then_with(|| {
            achieved_at(a, LiftKind::CleanJerk, a.best_clean_jerk())
                .cmp(&achieved_at(b, LiftKind::CleanJerk, b.best_clean_jerk()))
        })
        .then_with(|| start_key(a).cmp(&start_key(b)))
}

fn sorted_ids(athletes: &[Athlete], cmp: impl Fn(&Athlete, &Athlete) -> Ordering) -> Vec<AthleteId> {
    let mut sorted: Vec<&Athlete> = athletes.iter().collect();
    sorted.sort_by(|a, b| cmp(a, b));
    sorted.into_iter().map(|a| a.id).collect()
}

/// Attempt index (0-based over the card) at which `weight` was first made.
fn achieved_at(a: &Athlete, lift: LiftKind, weight: i32) -> usize {
    let offset = match lift {
        LiftKind::Snatch => 0,
        LiftKind::CleanJerk => ATTEMPTS_PER_LIFT,
    };
    (0..ATTEMPTS_PER_LIFT)
        .find(|i| a.card(offset + i).actual_lift == Some(weight))
        .map(|i| offset + i)
        .unwrap_or(usize::MAX)
}

fn rank_by(
    members: &[&Athlete],
    value: impl Fn(&Athlete) -> i32,
    tie: impl Fn(&Athlete) -> usize,
) -> HashMap<AthleteId, usize> {
    let mut ranked: Vec<&Athlete> = members.iter().copied().filter(|a| value(a) > 0).collect();
    ranked.sort_by(|a, b| {
        value(b)
            .cmp(&value(a))
            .then(tie(a).cmp(&tie(b)))
            .then_with(|| start_key(a).cmp(&start_key(b)))
    });
    ranked
        .into_iter()
        .enumerate()
        .map(|(i, a)| (a.id, i + 1))
        .collect()
}

pub fn assign_category_ranks(athletes: &[Athlete]) -> HashMap<AthleteId, CategoryRanks> {
    let mut by_category: HashMap<&str, Vec<&Athlete>> = HashMap::new();
    for athlete in athletes {
        by_category
            .entry(athlete.category.as_str())
            .or_default()
            .push(athlete);
    }

    let mut ranks: HashMap<AthleteId, CategoryRanks> =
        athletes.iter().map(|a| (a.id, CategoryRanks::default())).collect();
    for members in by_category.values() {
        let snatch = rank_by(members, Athlete::best_snatch, |a| {
            achieved_at(a, LiftKind::Snatch, a.best_snatch())
        });
        let clean_jerk = rank_by(members, Athlete::best_clean_jerk, |a| {
            achieved_at(a, LiftKind::CleanJerk, a.best_clean_jerk())
        });
        let total = rank_by(members, Athlete::total, |a| {
            achieved_at(a, LiftKind::CleanJerk, a.best_clean_jerk())
        });
        for member in members {
            if let Some(entry) = ranks.get_mut(&member.id) {
                entry.snatch = snatch.get(&member.id).copied();
                entry.clean_jerk = clean_jerk.get(&member.id).copied();
                entry.total = total.get(&member.id).copied();
            }
        }
    }
    ranks
}

#[cfg(test)]
#[path = "tests/order_tests.rs"]
mod tests;
