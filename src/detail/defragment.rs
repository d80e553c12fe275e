//! Defragmentation: compact indices and, optionally, offsets of a class
//! and carry the resulting remap through every dependent structure.

use super::Detail;
use crate::config::DefragmentOptions;
use crate::data::storage::OffsetStorage;
use crate::topology::index_map::OffsetRemap;
use crate::topology::offset::ElementClass;

impl Detail {
    /// Defragments one class. Returns whether anything moved; a class with
    /// nothing to compact keeps every data id.
    pub fn defragment(&mut self, class: ElementClass, options: &DefragmentOptions) -> bool {
        if class == ElementClass::Global {
            return false;
        }
        let slot = class.slot();
        let map = &self.index_maps[slot];
        if options.min_hole_fraction > 0.0 && map.offset_size() > 0 {
            let fraction = map.hole_count() as f64 / map.offset_size() as f64;
            if fraction < options.min_hole_fraction {
                log::trace!("{class}: hole fraction {fraction:.3} below threshold; skipped");
                return false;
            }
        }
        let outcome = self.index_maps[slot].defragment(options.remove_holes);
        if let Some(remap) = outcome.remap.as_ref() {
            self.apply_offset_remap(remap);
        }
        let moved = outcome.moved();
        if moved {
            self.meta_cache_count += 1;
        }
        moved
    }

    /// Defragments every element class with the configured options:
    /// vertices, then points, then primitives.
    pub fn defragment_all(&mut self) -> bool {
        let options = self.config.defragment;
        let mut moved = false;
        for class in [ElementClass::Vertex, ElementClass::Point, ElementClass::Primitive] {
            moved |= self.defragment(class, &options);
        }
        moved
    }

    fn apply_offset_remap(&mut self, remap: &OffsetRemap) {
        let class = remap.class();
        let slot = class.slot();
        self.topology.defragment_links(class, remap);
        self.topology.defragment_elements(class, remap);
        match class {
            ElementClass::Vertex => self.primitives.remap_vertices(remap),
            ElementClass::Primitive => self.primitives.remap(remap),
            _ => {}
        }
        self.attributes[slot].remap(remap);
        for g in self.groups[slot].iter_mut() {
            g.remap(remap);
        }
        self.topology.check_storage_change();
        log::debug!(
            "{class}: compacted {} offsets into {}",
            remap.old_size(),
            remap.new_size()
        );
    }
}
