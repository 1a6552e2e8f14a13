//! Query criteria and sort order over stored attachment rows.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use vault_types::{uploader, AttachmentRecord, SignerKey, Version};

/// A condition on a single column.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate<T> {
    Equal(T),
    NotEqual(T),
    In(Vec<T>),
    NotIn(Vec<T>),
    GreaterThan(T),
    GreaterThanOrEqual(T),
    LessThan(T),
    LessThanOrEqual(T),
    /// Inclusive on both ends.
    Between(T, T),
}

impl<T: PartialOrd> Predicate<T> {
    pub fn matches(&self, value: &T) -> bool {
        match self {
            Self::Equal(v) => value == v,
            Self::NotEqual(v) => value != v,
            Self::In(vs) => vs.contains(value),
            Self::NotIn(vs) => !vs.contains(value),
            Self::GreaterThan(v) => value > v,
            Self::GreaterThanOrEqual(v) => value >= v,
            Self::LessThan(v) => value < v,
            Self::LessThanOrEqual(v) => value <= v,
            Self::Between(lo, hi) => value >= lo && value <= hi,
        }
    }

    /// Matches a nullable column; absent values only match negative conditions.
    fn matches_option(&self, value: Option<&T>) -> bool {
        match value {
            Some(v) => self.matches(v),
            None => matches!(self, Self::NotEqual(_) | Self::NotIn(_)),
        }
    }
}

/// Conditions combined with AND. Unset fields match everything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttachmentQuery {
    pub uploader: Option<Predicate<String>>,
    pub filename: Option<Predicate<String>>,
    pub inserted_at: Option<Predicate<DateTime<Utc>>>,
    /// Matches if any of the attachment's contract class names satisfies it.
    pub contract_class_name: Option<Predicate<String>>,
    /// Matches if any of the attachment's signers satisfies it.
    pub signer: Option<Predicate<SignerKey>>,
    pub is_signed: Option<bool>,
    pub version: Option<Predicate<Version>>,
}

impl AttachmentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uploader(mut self, predicate: Predicate<String>) -> Self {
        self.uploader = Some(predicate);
        self
    }

    /// Restrict to the trusted uploader set.
    pub fn trusted_only(self) -> Self {
        self.uploader(Predicate::In(
            uploader::TRUSTED_UPLOADERS.iter().map(|s| s.to_string()).collect(),
        ))
    }

    pub fn filename(mut self, predicate: Predicate<String>) -> Self {
        self.filename = Some(predicate);
        self
    }

    pub fn inserted_at(mut self, predicate: Predicate<DateTime<Utc>>) -> Self {
        self.inserted_at = Some(predicate);
        self
    }

    pub fn contract_class_name(mut self, predicate: Predicate<String>) -> Self {
        self.contract_class_name = Some(predicate);
        self
    }

    pub fn signer(mut self, predicate: Predicate<SignerKey>) -> Self {
        self.signer = Some(predicate);
        self
    }

    pub fn signed(mut self, is_signed: bool) -> Self {
        self.is_signed = Some(is_signed);
        self
    }

    pub fn version(mut self, predicate: Predicate<Version>) -> Self {
        self.version = Some(predicate);
        self
    }

    pub fn matches(&self, record: &AttachmentRecord) -> bool {
        if let Some(p) = &self.uploader {
            if !p.matches_option(record.uploader.as_ref()) {
                return false;
            }
        }
        if let Some(p) = &self.filename {
            if !p.matches_option(record.filename.as_ref()) {
                return false;
            }
        }
        if let Some(p) = &self.inserted_at {
            if !p.matches(&record.inserted_at) {
                return false;
            }
        }
        if let Some(p) = &self.contract_class_name {
            if !record.contract_class_names.iter().any(|n| p.matches(n)) {
                return false;
            }
        }
        if let Some(p) = &self.signer {
            if !record.signers.iter().any(|s| p.matches(s)) {
                return false;
            }
        }
        if let Some(signed) = self.is_signed {
            if record.is_signed() != signed {
                return false;
            }
        }
        if let Some(p) = &self.version {
            if !p.matches(&record.version) {
                return false;
            }
        }
        true
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortAttribute {
    Version,
    InsertionDate,
    Uploader,
    Filename,
    Id,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// Sort columns applied left to right.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttachmentSort {
    pub columns: Vec<(SortAttribute, Direction)>,
}

impl AttachmentSort {
    pub fn by(attribute: SortAttribute, direction: Direction) -> Self {
        Self {
            columns: vec![(attribute, direction)],
        }
    }

    pub fn then(mut self, attribute: SortAttribute, direction: Direction) -> Self {
        self.columns.push((attribute, direction));
        self
    }

    /// Newest version first, most recently inserted first within a version.
    pub fn latest_first() -> Self {
        Self::by(SortAttribute::Version, Direction::Descending)
            .then(SortAttribute::InsertionDate, Direction::Descending)
    }

    pub fn compare(&self, a: &AttachmentRecord, b: &AttachmentRecord) -> Ordering {
        for (attribute, direction) in &self.columns {
            let ordering = match attribute {
                SortAttribute::Version => a.version.cmp(&b.version),
                SortAttribute::InsertionDate => a.inserted_at.cmp(&b.inserted_at),
                SortAttribute::Uploader => a.uploader.cmp(&b.uploader),
                SortAttribute::Filename => a.filename.cmp(&b.filename),
                SortAttribute::Id => a.id.cmp(&b.id),
            };
            let ordering = match direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}
