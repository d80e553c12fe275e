//! Element markers: remember where each element class ended so the
//! elements appended afterwards can be addressed as ranges.

use super::Detail;
use crate::topology::offset::{ElementClass, Offset, OffsetRange};

/// Offset sizes of the point, vertex and primitive classes at capture time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElementMarker {
    begin: [usize; 3],
}

/// Offsets appended since an [`ElementMarker`] was captured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarkedRanges {
    pub points: OffsetRange,
    pub vertices: OffsetRange,
    pub primitives: OffsetRange,
}

impl ElementMarker {
    pub fn capture(detail: &Detail) -> Self {
        ElementMarker {
            begin: [
                detail.index_map(ElementClass::Point).offset_size(),
                detail.index_map(ElementClass::Vertex).offset_size(),
                detail.index_map(ElementClass::Primitive).offset_size(),
            ],
        }
    }

    /// First offset of `class` issued after the capture.
    pub fn begin(&self, class: ElementClass) -> Offset {
        match class {
            ElementClass::Global => Offset::new(0),
            c => Offset::new(self.begin[c.slot()]),
        }
    }

    /// Offsets of `class` issued since the capture. Empty when the class
    /// was cleared or compacted below the marker in between.
    pub fn range_since(&self, detail: &Detail, class: ElementClass) -> OffsetRange {
        if class == ElementClass::Global {
            return OffsetRange::EMPTY;
        }
        let begin = self.begin[class.slot()];
        let end = detail.index_map(class).offset_size();
        if end <= begin {
            return OffsetRange::EMPTY;
        }
        OffsetRange::new(Offset::new(begin), Offset::new(end))
    }

    pub fn ranges(&self, detail: &Detail) -> MarkedRanges {
        MarkedRanges {
            points: self.range_since(detail, ElementClass::Point),
            vertices: self.range_since(detail, ElementClass::Vertex),
            primitives: self.range_since(detail, ElementClass::Primitive),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::kind::PrimitiveTypeId;

    #[test]
    fn ranges_cover_appended_blocks() {
        let mut d = Detail::new();
        d.append_points(3);
        let marker = ElementMarker::capture(&d);
        d.append_points(2);
        d.append_primitives_and_vertices(PrimitiveTypeId::POLYGON, 2, 3)
            .unwrap();
        let r = marker.ranges(&d);
        assert_eq!(r.points, OffsetRange::with_len(Offset::new(3), 2));
        assert_eq!(r.vertices.len(), 6);
        assert_eq!(r.primitives.len(), 2);
        assert_eq!(marker.begin(ElementClass::Vertex), Offset::new(0));
    }

    #[test]
    fn cleared_class_yields_empty_range() {
        let mut d = Detail::new();
        d.append_points(4);
        let marker = ElementMarker::capture(&d);
        d.clear();
        assert!(marker.range_since(&d, ElementClass::Point).is_empty());
    }
}
