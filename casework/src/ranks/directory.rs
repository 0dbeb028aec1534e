//! Rank directory: the static staff hierarchy
//!
//! Ranks form one strict total order across every category. The directory is
//! built once from a [`RankTable`] (listed lowest rank first) and is
//! read-only afterwards.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::escalation;

/// Coarse grouping of adjacent ranks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankCategory {
    Moderation,
    Administration,
    InternalAffairs,
    Supervision,
    Management,
    Directive,
}

impl RankCategory {
    /// All categories, lowest first
    pub fn all() -> &'static [RankCategory] {
        &[
            Self::Moderation,
            Self::Administration,
            Self::InternalAffairs,
            Self::Supervision,
            Self::Management,
            Self::Directive,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Moderation => "moderation",
            Self::Administration => "administration",
            Self::InternalAffairs => "internal_affairs",
            Self::Supervision => "supervision",
            Self::Management => "management",
            Self::Directive => "directive",
        }
    }
}

impl std::fmt::Display for RankCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RankCategory {
    type Err = RankTableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == normalized || c.as_str().replace('_', "") == normalized)
            .ok_or_else(|| RankTableError::UnknownCategory(s.to_string()))
    }
}

/// A named position in the hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rank {
    pub key: String,
    pub name: String,
    pub category: RankCategory,
    /// 1-based position in the ascending order
    pub level: u32,
}

/// One rank entry as supplied by configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankSpec {
    pub key: String,
    pub name: String,
    pub category: RankCategory,
}

impl RankSpec {
    fn new(key: &str, name: &str, category: RankCategory) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            category,
        }
    }
}

/// Role granted to every member of a category alongside their rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRole {
    pub category: RankCategory,
    pub role: String,
}

/// Hierarchy table, ranks listed lowest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankTable {
    #[serde(default)]
    pub ranks: Vec<RankSpec>,
    #[serde(default)]
    pub category_roles: Vec<CategoryRole>,
}

impl Default for RankTable {
    fn default() -> Self {
        use RankCategory::*;
        Self {
            ranks: vec![
                RankSpec::new("trial_moderator", "Trial Moderator", Moderation),
                RankSpec::new("moderator", "Moderator", Moderation),
                RankSpec::new("senior_moderator", "Senior Moderator", Moderation),
                RankSpec::new("head_moderator", "Head Moderator", Moderation),
                RankSpec::new("trial_admin", "Trial Administrator", Administration),
                RankSpec::new("admin", "Administrator", Administration),
                RankSpec::new("senior_admin", "Senior Administrator", Administration),
                RankSpec::new("internal_affairs_agent", "Internal Affairs Agent", InternalAffairs),
                RankSpec::new(
                    "internal_affairs_director",
                    "Internal Affairs Director",
                    InternalAffairs,
                ),
                RankSpec::new("supervisor", "Supervisor", Supervision),
                RankSpec::new("manager", "Manager", Management),
                RankSpec::new("director", "Director", Directive),
            ],
            category_roles: vec![
                CategoryRole {
                    category: Moderation,
                    role: "moderation_team".to_string(),
                },
                CategoryRole {
                    category: Administration,
                    role: "administration_team".to_string(),
                },
                CategoryRole {
                    category: InternalAffairs,
                    role: "internal_affairs_team".to_string(),
                },
                CategoryRole {
                    category: Supervision,
                    role: "supervision_team".to_string(),
                },
                CategoryRole {
                    category: Management,
                    role: "management_team".to_string(),
                },
                CategoryRole {
                    category: Directive,
                    role: "directive_team".to_string(),
                },
            ],
        }
    }
}

/// Rejected rank tables
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RankTableError {
    #[error("Rank table is empty")]
    Empty,

    #[error("Duplicate rank key: {0}")]
    DuplicateKey(String),

    #[error("Category {0} has more than one category role")]
    DuplicateCategoryRole(RankCategory),

    #[error("Category role {0} collides with a rank key")]
    RoleCollidesWithRank(String),

    #[error("Unknown rank category: {0}")]
    UnknownCategory(String),
}

/// Read-only staff hierarchy
#[derive(Debug, Clone)]
pub struct RankDirectory {
    /// Ascending, index = level - 1
    ranks: Vec<Rank>,
    by_key: HashMap<String, usize>,
    category_roles: HashMap<RankCategory, String>,
}

impl RankDirectory {
    /// Build and validate a directory from a table
    pub fn from_table(table: &RankTable) -> Result<Self, RankTableError> {
        if table.ranks.is_empty() {
            return Err(RankTableError::Empty);
        }

        let mut seen = HashSet::new();
        for spec in &table.ranks {
            if !seen.insert(spec.key.as_str()) {
                return Err(RankTableError::DuplicateKey(spec.key.clone()));
            }
        }

        let mut categories = HashSet::new();
        for cr in &table.category_roles {
            if !categories.insert(cr.category) {
                return Err(RankTableError::DuplicateCategoryRole(cr.category));
            }
            if seen.contains(cr.role.as_str()) {
                return Err(RankTableError::RoleCollidesWithRank(cr.role.clone()));
            }
        }

        Ok(Self::build(table))
    }

    /// The built-in hierarchy
    pub fn standard() -> Self {
        Self::build(&RankTable::default())
    }

    fn build(table: &RankTable) -> Self {
        let ranks: Vec<Rank> = table
            .ranks
            .iter()
            .enumerate()
            .map(|(idx, spec)| Rank {
                key: spec.key.clone(),
                name: spec.name.clone(),
                category: spec.category,
                level: idx as u32 + 1,
            })
            .collect();
        let by_key = ranks
            .iter()
            .enumerate()
            .map(|(idx, r)| (r.key.clone(), idx))
            .collect();
        let category_roles = table
            .category_roles
            .iter()
            .map(|cr| (cr.category, cr.role.clone()))
            .collect();
        Self {
            ranks,
            by_key,
            category_roles,
        }
    }

    /// Look up a rank by key
    pub fn rank_of(&self, key: &str) -> Option<&Rank> {
        self.by_key.get(key).map(|&idx| &self.ranks[idx])
    }

    /// Viewing category a report against `category` escalates to
    pub fn category_escalation_target(&self, category: RankCategory) -> RankCategory {
        escalation::escalation_category(Some(category)).viewing_category
    }

    /// Highest rank first
    pub fn all_ranks_ordered_high_to_low(&self) -> impl Iterator<Item = &Rank> + '_ {
        self.ranks.iter().rev()
    }

    /// Lowest rank first
    pub fn ranks_low_to_high(&self) -> &[Rank] {
        &self.ranks
    }

    /// Top of the hierarchy
    pub fn top_rank(&self) -> &Rank {
        // build() is only reached with a non-empty table
        &self.ranks[self.ranks.len() - 1]
    }

    pub fn category_role(&self, category: RankCategory) -> Option<&str> {
        self.category_roles.get(&category).map(String::as_str)
    }

    /// Rank keys plus category roles count as staff roles
    pub fn is_staff_role(&self, key: &str) -> bool {
        self.by_key.contains_key(key) || self.category_roles.values().any(|r| r == key)
    }

    /// Staff roles among `held`
    pub fn staff_roles_in<I, S>(&self, held: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        held.into_iter()
            .filter(|k| self.is_staff_role(k.as_ref()))
            .map(|k| k.as_ref().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }
}

impl Default for RankDirectory {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_levels_ascend() {
        let dir = RankDirectory::standard();
        assert_eq!(dir.rank_of("trial_moderator").unwrap().level, 1);
        assert_eq!(dir.rank_of("moderator").unwrap().level, 2);
        assert_eq!(dir.rank_of("admin").unwrap().level, 6);
        assert_eq!(dir.top_rank().key, "director");
        assert_eq!(dir.top_rank().level as usize, dir.len());
    }

    #[test]
    fn test_high_to_low_is_reverse_of_levels() {
        let dir = RankDirectory::standard();
        let levels: Vec<u32> = dir.all_ranks_ordered_high_to_low().map(|r| r.level).collect();
        let mut sorted = levels.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(levels, sorted);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut table = RankTable::default();
        table.ranks.push(RankSpec::new("admin", "Admin Again", RankCategory::Administration));
        assert_eq!(
            RankDirectory::from_table(&table).unwrap_err(),
            RankTableError::DuplicateKey("admin".into())
        );
    }

    #[test]
    fn test_empty_table_rejected() {
        let table = RankTable {
            ranks: vec![],
            category_roles: vec![],
        };
        assert_eq!(RankDirectory::from_table(&table).unwrap_err(), RankTableError::Empty);
    }

    #[test]
    fn test_staff_roles_exclude_markers() {
        let dir = RankDirectory::standard();
        let held = ["moderator", "moderation_team", "suspended", "nitro_booster"];
        let staff = dir.staff_roles_in(held);
        assert_eq!(
            staff.into_iter().collect::<Vec<_>>(),
            vec!["moderation_team".to_string(), "moderator".to_string()]
        );
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!(
            "internal-affairs".parse::<RankCategory>().unwrap(),
            RankCategory::InternalAffairs
        );
        assert_eq!("internalAffairs".parse::<RankCategory>().unwrap(), RankCategory::InternalAffairs);
        assert!("janitorial".parse::<RankCategory>().is_err());
    }
}
