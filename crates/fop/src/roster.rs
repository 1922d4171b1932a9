use std::collections::{BTreeMap, BTreeSet, HashMap};

use rules::order::{self, CategoryRanks};
use shared::{
    domain::{Athlete, AthleteId, Group, GroupId},
    error::FopError,
    protocol::AthleteSummary,
};
use storage::GroupRoster;

/// Athletes of the loaded group with the orders derived from them.
#[derive(Debug, Default)]
pub struct Roster {
    group: Option<Group>,
    athletes: Vec<Athlete>,
    lifting_order: Vec<AthleteId>,
    display_order: Vec<AthleteId>,
    results_order: Vec<AthleteId>,
    ranks: HashMap<AthleteId, CategoryRanks>,
}

impl Roster {
    pub fn load(roster: GroupRoster) -> Self {
        let mut loaded = Self {
            group: Some(roster.group),
            athletes: roster.athletes,
            ..Self::default()
        };
        loaded.recompute();
        loaded
    }

    pub fn group(&self) -> Option<&Group> {
        self.group.as_ref()
    }

    pub fn group_id(&self) -> Option<GroupId> {
        self.group.as_ref().map(|g| g.id)
    }

    pub fn athletes(&self) -> &[Athlete] {
        &self.athletes
    }

    pub fn len(&self) -> usize {
        self.athletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.athletes.is_empty()
    }

    pub fn get(&self, id: AthleteId) -> Option<&Athlete> {
        self.athletes.iter().find(|a| a.id == id)
    }

    pub fn get_mut(&mut self, id: AthleteId) -> Option<&mut Athlete> {
        self.athletes.iter_mut().find(|a| a.id == id)
    }

    /// Replaces the stored copy of an athlete of this group.
    pub fn replace(&mut self, athlete: Athlete) -> Result<(), FopError> {
        let slot = self
            .get_mut(athlete.id)
            .ok_or(FopError::UnknownAthlete(athlete.id))?;
        *slot = athlete;
        Ok(())
    }

    /// Rebuilds every derived order wholesale.
    pub fn recompute(&mut self) {
        self.lifting_order = order::lifting_order(&self.athletes);
        self.display_order = order::display_order(&self.athletes);
        self.results_order = order::results_order(&self.athletes);
        self.ranks = order::assign_category_ranks(&self.athletes);
    }

    pub fn lifting_order(&self) -> &[AthleteId] {
        &self.lifting_order
    }

    pub fn display_order(&self) -> &[AthleteId] {
        &self.display_order
    }

    pub fn results_order(&self) -> &[AthleteId] {
        &self.results_order
    }

    pub fn ranks(&self, id: AthleteId) -> Option<CategoryRanks> {
        self.ranks.get(&id).copied()
    }

    /// First athlete of the lifting order that still has attempts left.
    pub fn first_to_lift(&self) -> Option<AthleteId> {
        self.lifting_order
            .iter()
            .copied()
            .find(|id| self.get(*id).is_some_and(|a| !a.is_done()))
    }

    /// Athlete following `current` in the lifting order.
    pub fn next_after(&self, current: Option<AthleteId>) -> Option<AthleteId> {
        self.lifting_order
            .iter()
            .copied()
            .filter(|id| Some(*id) != current)
            .find(|id| self.get(*id).is_some_and(|a| !a.is_done()))
    }

    pub fn all_done(&self) -> bool {
        self.athletes.iter().all(Athlete::is_done)
    }

    pub fn all_snatch_done(&self) -> bool {
        self.athletes.iter().all(Athlete::snatch_done)
    }

    pub fn summary(&self, id: AthleteId) -> Option<AthleteSummary> {
        self.get(id).map(|a| AthleteSummary {
            id: a.id,
            name: a.full_name(),
            team: a.team.clone(),
            category: a.category.clone(),
            start_number: a.start_number,
            attempt_number: a.attempt_number(),
            lift_kind: a.lift_kind(),
            requested_weight: a.next_requested_weight(),
            done: a.is_done(),
        })
    }

    pub fn summaries(&self, ids: &[AthleteId]) -> Vec<AthleteSummary> {
        ids.iter().filter_map(|id| self.summary(*id)).collect()
    }

    /// Age groups present in the group, flagged with whether `current`
    /// competes in them.
    pub fn participation(&self, current: Option<AthleteId>) -> BTreeMap<String, bool> {
        let current_groups: BTreeSet<&str> = current
            .and_then(|id| self.get(id))
            .map(|a| a.age_groups.iter().map(String::as_str).collect())
            .unwrap_or_default();
        self.athletes
            .iter()
            .flat_map(|a| a.age_groups.iter())
            .map(|g| (g.clone(), current_groups.contains(g.as_str())))
            .collect()
    }
}
