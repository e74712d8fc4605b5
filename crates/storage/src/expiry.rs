//! Expiry evaluation
//!
//! Pure time comparisons over `(bound, timestamp, now)` triples, all in
//! milliseconds. A negative bound or timestamp disables the check, and an
//! entry is expired only when `now` is strictly past its deadline.

/// True when a lifespan-bounded entry has outlived `created + lifespan`.
///
/// # Examples
///
/// ```
/// use strata_cache_storage::expiry::is_expired_mortal;
///
/// assert!(!is_expired_mortal(1000, 0, 1000));
/// assert!(is_expired_mortal(1000, 0, 1001));
/// assert!(!is_expired_mortal(-1, 0, i64::MAX));
/// ```
#[inline]
pub fn is_expired_mortal(lifespan: i64, created: i64, now: i64) -> bool {
    lifespan >= 0 && created >= 0 && now > created.saturating_add(lifespan)
}

/// True when an idle-bounded entry has not been used for more than `max_idle`.
#[inline]
pub fn is_expired_transient(max_idle: i64, last_used: i64, now: i64) -> bool {
    max_idle >= 0 && last_used >= 0 && now > last_used.saturating_add(max_idle)
}

/// Either bound expired.
#[inline]
pub fn is_expired_transient_mortal(
    max_idle: i64,
    last_used: i64,
    lifespan: i64,
    created: i64,
    now: i64,
) -> bool {
    is_expired_transient(max_idle, last_used, now) || is_expired_mortal(lifespan, created, now)
}

/// Instant at which a lifespan-bounded entry expires, `-1` if it never does.
#[inline]
pub fn mortal_expiry_time(lifespan: i64, created: i64) -> i64 {
    if lifespan < 0 || created < 0 {
        -1
    } else {
        created.saturating_add(lifespan)
    }
}

/// Instant at which an idle-bounded entry expires unless touched, `-1` if it never does.
#[inline]
pub fn transient_expiry_time(max_idle: i64, last_used: i64) -> i64 {
    if max_idle < 0 || last_used < 0 {
        -1
    } else {
        last_used.saturating_add(max_idle)
    }
}

/// The sooner of the two deadlines; whichever exists if only one does.
#[inline]
pub fn transient_mortal_expiry_time(
    max_idle: i64,
    last_used: i64,
    lifespan: i64,
    created: i64,
) -> i64 {
    let idle = transient_expiry_time(max_idle, last_used);
    let life = mortal_expiry_time(lifespan, created);
    match (idle >= 0, life >= 0) {
        (true, true) => idle.min(life),
        (true, false) => idle,
        (false, true) => life,
        (false, false) => -1,
    }
}
