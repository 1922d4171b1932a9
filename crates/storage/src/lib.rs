use std::{
    collections::BTreeMap,
    fs,
    path::Path,
    sync::{Arc, RwLock},
};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use shared::domain::{Athlete, AthleteId, Group, GroupId, RecordEntry, RecordId};

/// Athletes of one group as loaded from the repository.
#[derive(Debug, Clone)]
pub struct GroupRoster {
    pub group: Group,
    pub athletes: Vec<Athlete>,
}

/// Persistence boundary used by the field-of-play controller. Calls are
/// synchronous and each one is expected to be individually consistent.
pub trait AthleteRepository: Send + Sync {
    fn load_group(&self, group_id: GroupId) -> Result<GroupRoster>;
    fn load_athlete(&self, athlete_id: AthleteId) -> Result<Athlete>;
    fn save_athlete(&self, athlete: &Athlete) -> Result<()>;
    fn assign_start_numbers(&self, group_id: GroupId) -> Result<()>;
    fn list_records(&self) -> Result<Vec<RecordEntry>>;
    /// Stores a record set during the competition and returns it with its id.
    fn save_record(&self, record: RecordEntry) -> Result<RecordEntry>;
    /// Removes the records set by one attempt and returns them.
    fn remove_records_for_attempt(
        &self,
        athlete_id: AthleteId,
        attempt: usize,
    ) -> Result<Vec<RecordEntry>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompetitionData {
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub athletes: Vec<Athlete>,
    #[serde(default)]
    pub records: Vec<RecordEntry>,
}

#[derive(Default)]
struct Inner {
    groups: BTreeMap<GroupId, Group>,
    athletes: BTreeMap<AthleteId, Athlete>,
    records: Vec<RecordEntry>,
    next_record_id: i64,
}

#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStorage {
    pub fn new(data: CompetitionData) -> Self {
        let next_record_id = data.records.iter().map(|r| r.id.0).max().unwrap_or(0) + 1;
        let inner = Inner {
            groups: data.groups.into_iter().map(|g| (g.id, g)).collect(),
            athletes: data.athletes.into_iter().map(|a| (a.id, a)).collect(),
            records: data.records,
            next_record_id,
        };
        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read competition file '{}'", path.display()))?;
        let data: CompetitionData = serde_json::from_str(&raw)
            .with_context(|| format!("invalid competition file '{}'", path.display()))?;
        Ok(Self::new(data))
    }

    pub fn write_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let raw = serde_json::to_string_pretty(&self.export()?)?;
        fs::write(path, raw)
            .with_context(|| format!("failed to write competition file '{}'", path.display()))?;
        Ok(())
    }

    pub fn export(&self) -> Result<CompetitionData> {
        let guard = self.read()?;
        Ok(CompetitionData {
            groups: guard.groups.values().cloned().collect(),
            athletes: guard.athletes.values().cloned().collect(),
            records: guard.records.clone(),
        })
    }

    pub fn groups(&self) -> Result<Vec<Group>> {
        Ok(self.read()?.groups.values().cloned().collect())
    }

    /// Edits an athlete card in place, as a marshal or announcer screen would.
    pub fn update_athlete(
        &self,
        athlete_id: AthleteId,
        edit: impl FnOnce(&mut Athlete),
    ) -> Result<Athlete> {
        let mut guard = self.write()?;
        let athlete = guard
            .athletes
            .get_mut(&athlete_id)
            .ok_or_else(|| anyhow!("athlete {} not found", athlete_id.0))?;
        edit(athlete);
        Ok(athlete.clone())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| anyhow!("competition storage lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| anyhow!("competition storage lock poisoned"))
    }
}

impl AthleteRepository for MemoryStorage {
    fn load_group(&self, group_id: GroupId) -> Result<GroupRoster> {
        let guard = self.read()?;
        let group = guard
            .groups
            .get(&group_id)
            .cloned()
            .ok_or_else(|| anyhow!("group {} not found", group_id.0))?;
        let athletes = guard
            .athletes
            .values()
            .filter(|a| a.group == Some(group_id))
            .cloned()
            .collect();
        Ok(GroupRoster { group, athletes })
    }

    fn load_athlete(&self, athlete_id: AthleteId) -> Result<Athlete> {
        self.read()?
            .athletes
            .get(&athlete_id)
            .cloned()
            .ok_or_else(|| anyhow!("athlete {} not found", athlete_id.0))
    }

    fn save_athlete(&self, athlete: &Athlete) -> Result<()> {
        let mut guard = self.write()?;
        if !guard.athletes.contains_key(&athlete.id) {
            return Err(anyhow!("athlete {} not found", athlete.id.0));
        }
        guard.athletes.insert(athlete.id, athlete.clone());
        Ok(())
    }

    fn assign_start_numbers(&self, group_id: GroupId) -> Result<()> {
        let mut guard = self.write()?;
        let mut members: Vec<&mut Athlete> = guard
            .athletes
            .values_mut()
            .filter(|a| a.group == Some(group_id))
            .collect();
        members.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then(a.lot_number.unwrap_or(u32::MAX).cmp(&b.lot_number.unwrap_or(u32::MAX)))
                .then_with(|| a.last_name.cmp(&b.last_name))
                .then_with(|| a.first_name.cmp(&b.first_name))
        });
        for (position, athlete) in members.into_iter().enumerate() {
            athlete.start_number = Some(position as u32 + 1);
        }
        Ok(())
    }

    fn list_records(&self) -> Result<Vec<RecordEntry>> {
        Ok(self.read()?.records.clone())
    }

    fn save_record(&self, mut record: RecordEntry) -> Result<RecordEntry> {
        let mut guard = self.write()?;
        record.id = RecordId(guard.next_record_id);
        guard.next_record_id += 1;
        guard.records.push(record.clone());
        Ok(record)
    }

    fn remove_records_for_attempt(
        &self,
        athlete_id: AthleteId,
        attempt: usize,
    ) -> Result<Vec<RecordEntry>> {
        let mut guard = self.write()?;
        let (removed, kept): (Vec<_>, Vec<_>) = guard
            .records
            .drain(..)
            .partition(|r| r.athlete == Some(athlete_id) && r.attempt == Some(attempt));
        guard.records = kept;
        Ok(removed)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
