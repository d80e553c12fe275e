//! `Offset` and `Index`: strong, zero-cost handles for detail elements
//!
//! Every element of a [`Detail`](crate::detail::Detail) lives in a storage
//! slot identified by an [`Offset`]. Slots may be vacant (freed) or active;
//! offsets stay put until the class is explicitly defragmented. The dense
//! traversal position of an active element is its [`Index`].
//!
//! Both handles wrap an `i64` and reserve `-1` as the invalid sentinel, so
//! they have the same layout as the raw values stored in topology links.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable slot identifier of an element within its class.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Offset(i64);

/// Dense ordinal position of an element within its class.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Index(i64);

macro_rules! handle_impl {
    ($name:ident) => {
        impl $name {
            /// The invalid sentinel.
            pub const INVALID: Self = $name(-1);

            /// Creates a handle from a slot number.
            #[inline]
            pub const fn new(raw: usize) -> Self {
                $name(raw as i64)
            }

            /// Creates a handle from a raw signed value; negatives map to `INVALID`.
            #[inline]
            pub const fn from_raw(raw: i64) -> Self {
                if raw < 0 { Self::INVALID } else { $name(raw) }
            }

            /// Raw signed value, `-1` when invalid.
            #[inline]
            pub const fn raw(self) -> i64 {
                self.0
            }

            /// Slot number.
            ///
            /// Only meaningful for valid handles; callers check [`is_valid`](Self::is_valid)
            /// first.
            #[inline]
            pub const fn get(self) -> usize {
                debug_assert!(self.0 >= 0);
                self.0 as usize
            }

            #[inline]
            pub const fn is_valid(self) -> bool {
                self.0 >= 0
            }

            /// Returns `Some(self)` for valid handles.
            #[inline]
            pub const fn valid(self) -> Option<Self> {
                if self.0 >= 0 { Some(self) } else { None }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    f.debug_tuple(stringify!($name)).field(&self.0).finish()
                } else {
                    write!(f, concat!(stringify!($name), "(INVALID)"))
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, "{}", self.0)
                } else {
                    f.write_str("invalid")
                }
            }
        }

        impl From<usize> for $name {
            fn from(raw: usize) -> Self {
                Self::new(raw)
            }
        }
    };
}

handle_impl!(Offset);
handle_impl!(Index);

impl Offset {
    /// Offset `n` slots after this one.
    #[inline]
    pub const fn add(self, n: usize) -> Self {
        Offset(self.0 + n as i64)
    }
}

/// Half-open range of offsets `[start, end)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OffsetRange {
    pub start: Offset,
    pub end: Offset,
}

impl OffsetRange {
    pub const EMPTY: Self = OffsetRange {
        start: Offset(0),
        end: Offset(0),
    };

    #[inline]
    pub fn new(start: Offset, end: Offset) -> Self {
        debug_assert!(start.is_valid() && end.is_valid() && start <= end);
        OffsetRange { start, end }
    }

    /// Range of `len` offsets beginning at `start`; empty when `start` is invalid.
    #[inline]
    pub fn with_len(start: Offset, len: usize) -> Self {
        if !start.is_valid() {
            return Self::EMPTY;
        }
        OffsetRange {
            start,
            end: start.add(len),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        (self.end.raw() - self.start.raw()).max(0) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn contains(&self, off: Offset) -> bool {
        off >= self.start && off < self.end
    }

    pub fn iter(&self) -> <OffsetRange as IntoIterator>::IntoIter {
        (*self).into_iter()
    }
}

impl IntoIterator for OffsetRange {
    type Item = Offset;
    type IntoIter = std::iter::Map<std::ops::Range<i64>, fn(i64) -> Offset>;

    fn into_iter(self) -> Self::IntoIter {
        let end = self.end.raw().max(self.start.raw());
        (self.start.raw()..end).map(Offset as fn(i64) -> Offset)
    }
}

/// The four element classes of a detail.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementClass {
    Point,
    Vertex,
    Primitive,
    /// Exactly one global (detail) record always exists.
    Global,
}

impl ElementClass {
    /// All classes in storage order.
    pub const ALL: [ElementClass; 4] = [
        ElementClass::Point,
        ElementClass::Vertex,
        ElementClass::Primitive,
        ElementClass::Global,
    ];

    /// Position of this class in per-class arrays.
    #[inline]
    pub const fn slot(self) -> usize {
        match self {
            ElementClass::Point => 0,
            ElementClass::Vertex => 1,
            ElementClass::Primitive => 2,
            ElementClass::Global => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ElementClass::Point => "point",
            ElementClass::Vertex => "vertex",
            ElementClass::Primitive => "primitive",
            ElementClass::Global => "global",
        }
    }
}

impl fmt::Display for ElementClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
