//! Shared imports and collection aliases used across the engine.

// ═══════════════════════════════════════════════════════════════════════════════
// Core types
// ═══════════════════════════════════════════════════════════════════════════════

pub use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fmt,
    rc::{Rc, Weak},
};

// ═══════════════════════════════════════════════════════════════════════════════
// Hash collections - rustc-hash for speed, the engine never hashes untrusted keys
// ═══════════════════════════════════════════════════════════════════════════════

pub use rustc_hash::{FxHashMap, FxHashSet};

// ═══════════════════════════════════════════════════════════════════════════════
// IndexMap/IndexSet - insertion ordered, FxHasher
// ═══════════════════════════════════════════════════════════════════════════════

pub type IndexMap<K, V> =
    indexmap::IndexMap<K, V, core::hash::BuildHasherDefault<rustc_hash::FxHasher>>;

pub type IndexSet<T> =
    indexmap::IndexSet<T, core::hash::BuildHasherDefault<rustc_hash::FxHasher>>;

/// Create an empty IndexMap
#[inline]
pub fn index_map_new<K, V>() -> IndexMap<K, V>
where
    K: core::hash::Hash + Eq,
{
    indexmap::IndexMap::with_hasher(Default::default())
}

/// Create an empty IndexSet
#[inline]
pub fn index_set_new<T>() -> IndexSet<T>
where
    T: core::hash::Hash + Eq,
{
    indexmap::IndexSet::with_hasher(Default::default())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Math functions - libm gives identical results on every target
// ═══════════════════════════════════════════════════════════════════════════════

/// Numeric helpers with JavaScript semantics
pub mod math {
    #[inline]
    pub fn trunc(x: f64) -> f64 {
        libm::trunc(x)
    }

    /// `**` operator. Unlike C `pow`, `1 ** NaN` and `(-1) ** ±Infinity` are NaN.
    #[inline]
    pub fn pow(base: f64, exp: f64) -> f64 {
        if exp.is_nan() || (base.abs() == 1.0 && exp.is_infinite()) {
            return f64::NAN;
        }
        libm::pow(base, exp)
    }

    /// `%` operator: remainder with the sign of the dividend
    #[inline]
    pub fn rem(x: f64, y: f64) -> f64 {
        libm::fmod(x, y)
    }

    /// ToInt32 abstract operation
    pub fn to_int32(x: f64) -> i32 {
        to_uint32(x) as i32
    }

    /// ToUint32 abstract operation
    pub fn to_uint32(x: f64) -> u32 {
        if !x.is_finite() {
            return 0;
        }
        let int = trunc(x);
        let modulo = libm::fmod(int, 4_294_967_296.0);
        let positive = if modulo < 0.0 {
            modulo + 4_294_967_296.0
        } else {
            modulo
        };
        positive as u32
    }
}
