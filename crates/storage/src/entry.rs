//! Stored-entry variants
//!
//! The container holds one [`StoredEntry`] per key. Its [`StoredValue`] is a
//! tagged union over the four `{lifespan?, max_idle?}` combinations plus the
//! tombstone marker, and each variant carries only the timestamps it uses:
//!
//! | Variant | created | lifespan | last_used | max_idle |
//! |---------|---------|----------|-----------|----------|
//! | `Immortal` | - | - | - | - |
//! | `Mortal` | yes | yes | - | - |
//! | `Transient` | - | - | yes | yes |
//! | `TransientMortal` | yes | yes | yes | yes |
//!
//! Accessors for an absent field return `-1`. Version and the private stamp
//! live in the shared [`Payload`] as optional fields, so an unversioned entry
//! pays one discriminant byte for them and nothing more.
//!
//! Field order is part of the serialized form and must stay stable.

use crate::expiry;
use serde::{Deserialize, Serialize};
use strata_cache_core::{EntryVersion, Error, Key, Metadata, PrivateMetadata, Result, Value};

/// Which stored-entry variant a value is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// No expiration
    Immortal,
    /// Lifespan only
    Mortal,
    /// Max idle only
    Transient,
    /// Both bounds
    TransientMortal,
    /// Removed-but-version-tracked marker
    Tombstone,
}

impl EntryKind {
    /// Variant required for the given bounds (negative = unbounded)
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_cache_storage::entry::EntryKind;
    ///
    /// assert_eq!(EntryKind::for_bounds(-1, -1), EntryKind::Immortal);
    /// assert_eq!(EntryKind::for_bounds(1000, -1), EntryKind::Mortal);
    /// assert_eq!(EntryKind::for_bounds(-1, 500), EntryKind::Transient);
    /// assert_eq!(EntryKind::for_bounds(1000, 500), EntryKind::TransientMortal);
    /// ```
    pub fn for_bounds(lifespan: i64, max_idle: i64) -> Self {
        match (lifespan >= 0, max_idle >= 0) {
            (false, false) => EntryKind::Immortal,
            (true, false) => EntryKind::Mortal,
            (false, true) => EntryKind::Transient,
            (true, true) => EntryKind::TransientMortal,
        }
    }

    /// True for variants that store a lifespan
    pub fn has_lifespan(&self) -> bool {
        matches!(self, EntryKind::Mortal | EntryKind::TransientMortal)
    }

    /// True for variants that store a max idle
    pub fn has_max_idle(&self) -> bool {
        matches!(self, EntryKind::Transient | EntryKind::TransientMortal)
    }
}

/// Fields shared by every live variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    value: Value,
    version: Option<EntryVersion>,
    internal: Option<Box<PrivateMetadata>>,
}

impl Payload {
    /// Payload with a value and optional version, no private stamp
    pub fn new(value: Value, version: Option<EntryVersion>) -> Self {
        Self {
            value,
            version,
            internal: None,
        }
    }

    /// Attach (or drop) the private stamp
    pub fn with_internal(mut self, internal: Option<PrivateMetadata>) -> Self {
        self.internal = internal.map(Box::new);
        self
    }
}

/// Key-less stored entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoredValue {
    /// Never expires
    Immortal(Payload),
    /// Expires `lifespan` ms after `created`
    Mortal {
        /// Shared fields
        payload: Payload,
        /// Creation time
        created: i64,
        /// Lifespan
        lifespan: i64,
    },
    /// Expires `max_idle` ms after `last_used`
    Transient {
        /// Shared fields
        payload: Payload,
        /// Last access time
        last_used: i64,
        /// Max idle
        max_idle: i64,
    },
    /// Expires on whichever bound is hit first
    TransientMortal {
        /// Shared fields
        payload: Payload,
        /// Creation time
        created: i64,
        /// Lifespan
        lifespan: i64,
        /// Last access time
        last_used: i64,
        /// Max idle
        max_idle: i64,
    },
    /// Removed key kept for causal ordering; immutable
    Tombstone {
        /// Version/origin stamp of the removal
        internal: PrivateMetadata,
    },
}

impl StoredValue {
    /// Variant tag
    pub fn kind(&self) -> EntryKind {
        match self {
            StoredValue::Immortal(_) => EntryKind::Immortal,
            StoredValue::Mortal { .. } => EntryKind::Mortal,
            StoredValue::Transient { .. } => EntryKind::Transient,
            StoredValue::TransientMortal { .. } => EntryKind::TransientMortal,
            StoredValue::Tombstone { .. } => EntryKind::Tombstone,
        }
    }

    fn payload(&self) -> Option<&Payload> {
        match self {
            StoredValue::Immortal(payload)
            | StoredValue::Mortal { payload, .. }
            | StoredValue::Transient { payload, .. }
            | StoredValue::TransientMortal { payload, .. } => Some(payload),
            StoredValue::Tombstone { .. } => None,
        }
    }

    fn payload_mut(&mut self, operation: &'static str) -> Result<&mut Payload> {
        match self {
            StoredValue::Immortal(payload)
            | StoredValue::Mortal { payload, .. }
            | StoredValue::Transient { payload, .. }
            | StoredValue::TransientMortal { payload, .. } => Ok(payload),
            StoredValue::Tombstone { .. } => Err(Error::UnsupportedOperation { operation }),
        }
    }

    /// Stored value, `None` for tombstones
    pub fn value(&self) -> Option<&Value> {
        self.payload().map(|p| &p.value)
    }

    /// Consume into the stored value
    pub fn into_value(self) -> Option<Value> {
        match self {
            StoredValue::Immortal(payload)
            | StoredValue::Mortal { payload, .. }
            | StoredValue::Transient { payload, .. }
            | StoredValue::TransientMortal { payload, .. } => Some(payload.value),
            StoredValue::Tombstone { .. } => None,
        }
    }

    /// Version of record; a tombstone reports the version in its stamp
    pub fn version(&self) -> Option<&EntryVersion> {
        match self {
            StoredValue::Tombstone { internal } => internal.version(),
            _ => self.payload().and_then(|p| p.version.as_ref()),
        }
    }

    /// Private stamp, if any
    pub fn internal_metadata(&self) -> Option<&PrivateMetadata> {
        match self {
            StoredValue::Tombstone { internal } => Some(internal),
            _ => self.payload().and_then(|p| p.internal.as_deref()),
        }
    }

    /// Expiration bounds and version as a [`Metadata`]
    pub fn metadata(&self) -> Metadata {
        let builder = Metadata::builder()
            .lifespan(self.lifespan())
            .max_idle(self.max_idle());
        match self.version() {
            Some(version) => builder.version(*version).build(),
            None => builder.build(),
        }
    }

    /// Creation time, `-1` if the variant has no lifespan
    pub fn created(&self) -> i64 {
        match self {
            StoredValue::Mortal { created, .. } | StoredValue::TransientMortal { created, .. } => {
                *created
            }
            _ => -1,
        }
    }

    /// Lifespan, `-1` if unbounded
    pub fn lifespan(&self) -> i64 {
        match self {
            StoredValue::Mortal { lifespan, .. }
            | StoredValue::TransientMortal { lifespan, .. } => *lifespan,
            _ => -1,
        }
    }

    /// Last access time, `-1` if the variant has no max idle
    pub fn last_used(&self) -> i64 {
        match self {
            StoredValue::Transient { last_used, .. }
            | StoredValue::TransientMortal { last_used, .. } => *last_used,
            _ => -1,
        }
    }

    /// Max idle, `-1` if unbounded
    pub fn max_idle(&self) -> i64 {
        match self {
            StoredValue::Transient { max_idle, .. }
            | StoredValue::TransientMortal { max_idle, .. } => *max_idle,
            _ => -1,
        }
    }

    /// Instant of expiry, `-1` if the entry never expires
    pub fn expiry_time(&self) -> i64 {
        match self {
            StoredValue::Mortal {
                created, lifespan, ..
            } => expiry::mortal_expiry_time(*lifespan, *created),
            StoredValue::Transient {
                last_used,
                max_idle,
                ..
            } => expiry::transient_expiry_time(*max_idle, *last_used),
            StoredValue::TransientMortal {
                created,
                lifespan,
                last_used,
                max_idle,
                ..
            } => expiry::transient_mortal_expiry_time(*max_idle, *last_used, *lifespan, *created),
            StoredValue::Immortal(_) | StoredValue::Tombstone { .. } => -1,
        }
    }

    /// True if the entry is past its deadline at `now`
    pub fn is_expired(&self, now: i64) -> bool {
        match self {
            StoredValue::Mortal {
                created, lifespan, ..
            } => expiry::is_expired_mortal(*lifespan, *created, now),
            StoredValue::Transient {
                last_used,
                max_idle,
                ..
            } => expiry::is_expired_transient(*max_idle, *last_used, now),
            StoredValue::TransientMortal {
                created,
                lifespan,
                last_used,
                max_idle,
                ..
            } => expiry::is_expired_transient_mortal(*max_idle, *last_used, *lifespan, *created, now),
            StoredValue::Immortal(_) | StoredValue::Tombstone { .. } => false,
        }
    }

    /// True for variants with at least one bound
    pub fn can_expire(&self) -> bool {
        matches!(
            self,
            StoredValue::Mortal { .. }
                | StoredValue::Transient { .. }
                | StoredValue::TransientMortal { .. }
        )
    }

    /// True for the tombstone marker
    pub fn is_tombstone(&self) -> bool {
        matches!(self, StoredValue::Tombstone { .. })
    }

    pub(crate) fn refresh_last_used(&mut self, now: i64) {
        if let StoredValue::Transient { last_used, .. }
        | StoredValue::TransientMortal { last_used, .. } = self
        {
            *last_used = now;
        }
    }

    /// Record an access at `now`.
    ///
    /// Only variants with a max idle bound store an access time; the others
    /// accept the call and change nothing.
    pub fn touch(&mut self, now: i64) -> Result<()> {
        self.payload_mut("touch")?;
        self.refresh_last_used(now);
        Ok(())
    }

    /// Restart the lifespan at `now` (no-op without a lifespan bound).
    pub fn reincarnate(&mut self, now: i64) -> Result<()> {
        self.payload_mut("reincarnate")?;
        if let StoredValue::Mortal { created, .. } | StoredValue::TransientMortal { created, .. } =
            self
        {
            *created = now;
        }
        Ok(())
    }

    /// Replace the stored value
    pub fn set_value(&mut self, value: Value) -> Result<()> {
        self.payload_mut("set_value")?.value = value;
        Ok(())
    }

    /// Replace the version
    pub fn set_version(&mut self, version: Option<EntryVersion>) -> Result<()> {
        self.payload_mut("set_version")?.version = version;
        Ok(())
    }

    /// Replace the private stamp
    pub fn set_internal_metadata(&mut self, internal: Option<PrivateMetadata>) -> Result<()> {
        self.payload_mut("set_internal_metadata")?.internal = internal.map(Box::new);
        Ok(())
    }

    /// Attach a key, producing the container-resident form
    pub fn to_entry(self, key: Key) -> StoredEntry {
        StoredEntry { key, value: self }
    }
}

/// A key with its stored value: the unit the container holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    key: Key,
    value: StoredValue,
}

impl StoredEntry {
    /// Pair a key with a stored value
    pub fn new(key: Key, value: StoredValue) -> Self {
        Self { key, value }
    }

    /// The key
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Borrow the key-less part
    pub fn stored(&self) -> &StoredValue {
        &self.value
    }

    /// Copy out the key-less part; inverse of [`StoredValue::to_entry`]
    pub fn to_stored_value(&self) -> StoredValue {
        self.value.clone()
    }

    /// Split into key and stored value
    pub fn into_parts(self) -> (Key, StoredValue) {
        (self.key, self.value)
    }

    /// Variant tag
    pub fn kind(&self) -> EntryKind {
        self.value.kind()
    }

    /// Stored value, `None` for tombstones
    pub fn value(&self) -> Option<&Value> {
        self.value.value()
    }

    /// Version of record
    pub fn version(&self) -> Option<&EntryVersion> {
        self.value.version()
    }

    /// Expiration bounds and version
    pub fn metadata(&self) -> Metadata {
        self.value.metadata()
    }

    /// Private stamp, if any
    pub fn internal_metadata(&self) -> Option<&PrivateMetadata> {
        self.value.internal_metadata()
    }

    /// Creation time, `-1` if absent
    pub fn created(&self) -> i64 {
        self.value.created()
    }

    /// Lifespan, `-1` if unbounded
    pub fn lifespan(&self) -> i64 {
        self.value.lifespan()
    }

    /// Last access time, `-1` if absent
    pub fn last_used(&self) -> i64 {
        self.value.last_used()
    }

    /// Max idle, `-1` if unbounded
    pub fn max_idle(&self) -> i64 {
        self.value.max_idle()
    }

    /// Instant of expiry, `-1` if never
    pub fn expiry_time(&self) -> i64 {
        self.value.expiry_time()
    }

    /// True if past its deadline at `now`
    pub fn is_expired(&self, now: i64) -> bool {
        self.value.is_expired(now)
    }

    /// True for variants with at least one bound
    pub fn can_expire(&self) -> bool {
        self.value.can_expire()
    }

    /// True for the tombstone marker
    pub fn is_tombstone(&self) -> bool {
        self.value.is_tombstone()
    }

    pub(crate) fn refresh_last_used(&mut self, now: i64) {
        self.value.refresh_last_used(now);
    }

    /// See [`StoredValue::touch`]
    pub fn touch(&mut self, now: i64) -> Result<()> {
        self.value.touch(now)
    }

    /// See [`StoredValue::reincarnate`]
    pub fn reincarnate(&mut self, now: i64) -> Result<()> {
        self.value.reincarnate(now)
    }

    /// Replace the stored value
    pub fn set_value(&mut self, value: Value) -> Result<()> {
        self.value.set_value(value)
    }

    /// Replace the version
    pub fn set_version(&mut self, version: Option<EntryVersion>) -> Result<()> {
        self.value.set_version(version)
    }

    /// Replace the private stamp
    pub fn set_internal_metadata(&mut self, internal: Option<PrivateMetadata>) -> Result<()> {
        self.value.set_internal_metadata(internal)
    }
}
