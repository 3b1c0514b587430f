// Record id selectors: everything, a single id, or an inclusive range with optional bounds
use crate::error::ValidationError;
use crate::record::{Partition, RecordId};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdRange {
    #[default]
    All,
    Single(RecordId),
    Between {
        min: Option<RecordId>,
        max: Option<RecordId>,
    },
}

impl IdRange {
    /// Build a range from the `--id`, `--ini` and `--fin` command line selectors.
    ///
    /// Every given id is validated; a malformed selector aborts before any work.
    pub fn from_selectors(
        id: Option<&str>,
        ini: Option<&str>,
        fin: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let parse = |value: Option<&str>| value.map(RecordId::parse).transpose();
        let id = parse(id)?;
        let min = parse(ini)?;
        let max = parse(fin)?;

        match (id, min, max) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                Err(ValidationError::ConflictingSelectors)
            }
            (Some(id), None, None) => Ok(IdRange::Single(id)),
            (None, None, None) => Ok(IdRange::All),
            (None, min, max) => {
                if let (Some(lo), Some(hi)) = (&min, &max) {
                    if lo > hi {
                        return Err(ValidationError::InvertedRange {
                            min: lo.to_string(),
                            max: hi.to_string(),
                        });
                    }
                }
                Ok(IdRange::Between { min, max })
            }
        }
    }

    /// Whole numeric span of a partition
    pub fn partition(partition: Partition) -> Self {
        IdRange::Between {
            min: Some(partition.first_id()),
            max: Some(partition.last_id()),
        }
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.contains_str(id.as_str())
    }

    /// Range check on a raw id string, as found embedded in object names
    pub fn contains_str(&self, id: &str) -> bool {
        match self {
            IdRange::All => true,
            IdRange::Single(single) => single.as_str() == id,
            IdRange::Between { min, max } => {
                min.as_ref().map_or(true, |lo| lo.as_str() <= id)
                    && max.as_ref().map_or(true, |hi| id <= hi.as_str())
            }
        }
    }

    /// Lower bound, if any
    pub fn lower(&self) -> Option<&RecordId> {
        match self {
            IdRange::All => None,
            IdRange::Single(id) => Some(id),
            IdRange::Between { min, .. } => min.as_ref(),
        }
    }

    /// Upper bound, if any
    pub fn upper(&self) -> Option<&RecordId> {
        match self {
            IdRange::All => None,
            IdRange::Single(id) => Some(id),
            IdRange::Between { max, .. } => max.as_ref(),
        }
    }

    /// Intersect with a partition, yielding inclusive numeric bounds
    pub fn numbers_within(&self, partition: Partition) -> Option<(u64, u64)> {
        let lo = self
            .lower()
            .map_or(partition.start(), |id| id.number().max(partition.start()));
        let hi = self
            .upper()
            .map_or(partition.end(), |id| id.number().min(partition.end()));
        (lo <= hi).then_some((lo, hi))
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdRange::All => f.write_str("all"),
            IdRange::Single(id) => write!(f, "{}", id),
            IdRange::Between { min, max } => write!(
                f,
                "{}..={}",
                min.as_ref().map_or("*", |id| id.as_str()),
                max.as_ref().map_or("*", |id| id.as_str())
            ),
        }
    }
}
