// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Registry identifiers and the bidirectional identifier map.
//!
//! Registries hand out [`Uid`]s and must be able to answer both "which object
//! has this uid" and "which uid does this object have". [`UidMap`] keeps both
//! directions behind a single interface so they are always updated together.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Opaque identifier of an object within its owning registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    /// Wraps an identifier string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uid {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Uid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl FromStr for Uid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::Parse("empty uid".to_string()));
        }
        Ok(Self::new(s))
    }
}

/// Identity of a registrable object, independent of any registry uid.
pub(crate) type ObjectKey = uuid::Uuid;

/// Objects that can be stored in a [`UidMap`].
pub(crate) trait Keyed {
    fn key(&self) -> ObjectKey;
}

/// Bidirectional `Uid <-> object` map with monotonic uid generation.
///
/// Not synchronised on its own; registries keep it behind their state mutex so
/// that "generate candidate, check absence, insert" is one critical section.
pub(crate) struct UidMap<T> {
    prefix: &'static str,
    next: u64,
    by_uid: BTreeMap<Uid, T>,
    uid_by_key: HashMap<ObjectKey, Uid>,
}

impl<T: Keyed> UidMap<T> {
    pub(crate) fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            next: 0,
            by_uid: BTreeMap::new(),
            uid_by_key: HashMap::new(),
        }
    }

    /// Registers `value` under a freshly generated uid.
    pub(crate) fn insert_new(&mut self, value: T) -> Result<Uid> {
        let uid = self.next_free_uid();
        self.insert(uid.clone(), value)?;
        Ok(uid)
    }

    /// Registers `value` under `uid`.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyManaged`] if either the uid or the object is present.
    pub(crate) fn insert(&mut self, uid: Uid, value: T) -> Result<()> {
        let key = value.key();
        if let Some(existing) = self.uid_by_key.get(&key) {
            return Err(Error::AlreadyManaged(format!(
                "object is already registered as {existing}"
            )));
        }
        if self.by_uid.contains_key(&uid) {
            return Err(Error::AlreadyManaged(format!("uid {uid} is already in use")));
        }
        self.uid_by_key.insert(key, uid.clone());
        self.by_uid.insert(uid, value);
        Ok(())
    }

    pub(crate) fn get(&self, uid: &Uid) -> Option<&T> {
        self.by_uid.get(uid)
    }

    pub(crate) fn uid_of(&self, key: ObjectKey) -> Option<&Uid> {
        self.uid_by_key.get(&key)
    }

    pub(crate) fn contains_key(&self, key: ObjectKey) -> bool {
        self.uid_by_key.contains_key(&key)
    }

    /// Removes the object registered under `uid`, updating both directions.
    pub(crate) fn remove(&mut self, uid: &Uid) -> Option<T> {
        let value = self.by_uid.remove(uid)?;
        self.uid_by_key.remove(&value.key());
        Some(value)
    }

    pub(crate) fn remove_key(&mut self, key: ObjectKey) -> Option<(Uid, T)> {
        let uid = self.uid_by_key.remove(&key)?;
        let value = self.by_uid.remove(&uid)?;
        Some((uid, value))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&Uid, &T)> {
        self.by_uid.iter()
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &T> {
        self.by_uid.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_uid.len()
    }

    fn next_free_uid(&mut self) -> Uid {
        loop {
            let candidate = Uid(format!("{}{}", self.prefix, self.next));
            self.next += 1;
            if !self.by_uid.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item(ObjectKey);

    impl Keyed for Item {
        fn key(&self) -> ObjectKey {
            self.0
        }
    }

    fn item() -> Item {
        Item(uuid::Uuid::new_v4())
    }

    #[test]
    fn generated_uids_skip_taken_ones() {
        let mut map = UidMap::new("X");
        map.insert(Uid::new("X1"), item()).unwrap();
        let first = map.insert_new(item()).unwrap();
        let second = map.insert_new(item()).unwrap();
        assert_eq!(first.as_str(), "X0");
        assert_eq!(second.as_str(), "X2");
    }

    #[test]
    fn removed_uids_are_not_regenerated() {
        let mut map = UidMap::new("X");
        let uid = map.insert_new(item()).unwrap();
        assert!(map.remove(&uid).is_some());
        let next = map.insert_new(item()).unwrap();
        assert_ne!(uid, next);
    }

    #[test]
    fn duplicate_object_or_uid_is_rejected() {
        let mut map = UidMap::new("X");
        let shared = uuid::Uuid::new_v4();
        map.insert(Uid::new("a"), Item(shared)).unwrap();
        assert!(matches!(
            map.insert(Uid::new("b"), Item(shared)),
            Err(Error::AlreadyManaged(_))
        ));
        assert!(matches!(
            map.insert(Uid::new("a"), item()),
            Err(Error::AlreadyManaged(_))
        ));
        assert_eq!(map.len(), 1);
        assert_eq!(map.uid_of(shared), Some(&Uid::new("a")));
    }
}
