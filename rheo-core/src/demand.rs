// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Saturating demand accounting.
//!
//! Outstanding demand is a 64-bit counter that saturates at [`UNBOUNDED`];
//! the saturated value means "no limit" and is never decremented. All
//! operations use sequentially consistent ordering — the drain-ownership
//! idiom ("if the previous value was zero, I own the loop") is not correct
//! under weaker orderings.

use rheo_error::{Result, RheoError};
use std::sync::atomic::{AtomicU64, Ordering};

/// The demand value denoting "unbounded".
pub const UNBOUNDED: u64 = u64::MAX;

/// Validate a `request` amount per protocol rule: zero is a violation.
pub fn validate(n: u64) -> Result<()> {
    if n == 0 {
        Err(RheoError::BadRequest)
    } else {
        Ok(())
    }
}

/// Add `n` to `demand` with saturation, returning the value *before* the
/// addition. A zero return means the caller now owns the drain loop.
pub fn get_and_add_cap(demand: &AtomicU64, n: u64) -> u64 {
    let mut current = demand.load(Ordering::SeqCst);
    loop {
        if current == UNBOUNDED {
            return UNBOUNDED;
        }
        let next = current.saturating_add(n);
        match demand.compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return current,
            Err(actual) => current = actual,
        }
    }
}

/// Subtract `n` produced items from `demand`, returning the value *after*
/// the subtraction. Unbounded demand is left untouched.
pub fn produced(demand: &AtomicU64, n: u64) -> u64 {
    let mut current = demand.load(Ordering::SeqCst);
    loop {
        if current == UNBOUNDED {
            return UNBOUNDED;
        }
        debug_assert!(current >= n, "produced more than was requested");
        let next = current.saturating_sub(n);
        match demand.compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return next,
            Err(actual) => current = actual,
        }
    }
}

/// Saturating multiplication for demand translation (windows request
/// `size * n` upstream items for `n` requested windows).
#[must_use]
pub const fn multiply_cap(a: u64, b: u64) -> u64 {
    a.saturating_mul(b)
}

/// Saturating addition for demand translation.
#[must_use]
pub const fn add_cap(a: u64, b: u64) -> u64 {
    a.saturating_add(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_and_add_returns_previous_value() {
        let demand = AtomicU64::new(0);
        assert_eq!(get_and_add_cap(&demand, 5), 0);
        assert_eq!(get_and_add_cap(&demand, 3), 5);
        assert_eq!(demand.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn addition_saturates_at_unbounded() {
        let demand = AtomicU64::new(UNBOUNDED - 1);
        get_and_add_cap(&demand, 10);
        assert_eq!(demand.load(Ordering::SeqCst), UNBOUNDED);

        // Once saturated the counter stays pinned.
        get_and_add_cap(&demand, 1);
        assert_eq!(demand.load(Ordering::SeqCst), UNBOUNDED);
    }

    #[test]
    fn produced_decrements_but_never_touches_unbounded() {
        let demand = AtomicU64::new(10);
        assert_eq!(produced(&demand, 4), 6);
        assert_eq!(produced(&demand, 6), 0);

        let unbounded = AtomicU64::new(UNBOUNDED);
        assert_eq!(produced(&unbounded, 100), UNBOUNDED);
        assert_eq!(unbounded.load(Ordering::SeqCst), UNBOUNDED);
    }

    #[test]
    fn zero_requests_are_rejected() {
        assert!(validate(0).is_err());
        assert!(validate(1).is_ok());
        assert!(validate(UNBOUNDED).is_ok());
    }

    #[test]
    fn multiply_saturates() {
        assert_eq!(multiply_cap(3, 4), 12);
        assert_eq!(multiply_cap(UNBOUNDED / 2, 3), UNBOUNDED);
        assert_eq!(add_cap(UNBOUNDED, 1), UNBOUNDED);
    }
}
