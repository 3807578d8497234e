//! Shared matching context
//!
//! Bundles the two images, their precomputed reference caches, and the
//! in-progress match store into one borrow so that classifier features and
//! the driver don't each thread four separate parameters through every call.

use crate::model::Image;
use crate::refs::RefCache;
use crate::store::MatchStore;

/// Everything a classifier feature or the driver needs to compare entities
/// across the two images. `a` is the named reference image, `b` the unnamed
/// (obfuscated) one being matched against it.
pub struct Graphs<'a> {
    pub a: &'a Image,
    pub b: &'a Image,
    pub refs_a: RefCache,
    pub refs_b: RefCache,
    pub store: MatchStore,
}

impl<'a> Graphs<'a> {
    pub fn new(a: &'a Image, b: &'a Image) -> Self {
        let refs_a = RefCache::build(a);
        let refs_b = RefCache::build(b);
        Graphs {
            a,
            b,
            refs_a,
            refs_b,
            store: MatchStore::new(),
        }
    }

    /// True if `a` and `b` are the same image under pointer identity — the
    /// degenerate case of matching an image against itself.
    pub fn same_image(&self) -> bool {
        std::ptr::eq(self.a, self.b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ImageBuilder;
    use crate::model::AccessFlags;

    #[test]
    fn same_image_detects_pointer_identity() {
        let mut b = ImageBuilder::new();
        b.add_class("A", AccessFlags::empty(), true);
        let image = b.build().unwrap();
        let g = Graphs::new(&image, &image);
        assert!(g.same_image());
    }

    #[test]
    fn distinct_images_are_not_same() {
        let mut ba = ImageBuilder::new();
        ba.add_class("A", AccessFlags::empty(), true);
        let image_a = ba.build().unwrap();
        let mut bb = ImageBuilder::new();
        bb.add_class("A", AccessFlags::empty(), true);
        let image_b = bb.build().unwrap();
        let g = Graphs::new(&image_a, &image_b);
        assert!(!g.same_image());
    }
}
