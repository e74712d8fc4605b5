//! Per-transaction entry flags

bitflags::bitflags! {
    /// State bits of a transaction-local entry.
    ///
    /// The bits are independent of each other. Commit and rollback reset the
    /// whole set to `VALID`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EntryFlags: u8 {
        /// The working copy differs from what was read
        const CHANGED = 1;
        /// The key did not exist when first touched
        const CREATED = 1 << 1;
        /// The key is to be removed on commit
        const REMOVED = 1 << 2;
        /// The working copy is usable
        const VALID = 1 << 3;
        /// The key is to be evicted on commit
        const EVICTED = 1 << 4;
        /// The stored entry had expired when it was read
        const EXPIRED = 1 << 5;
        /// Reads must use the working copy, not the shared store
        const SKIP_LOOKUP = 1 << 6;
        /// The entry was read by the transaction
        const READ = 1 << 7;
    }
}
