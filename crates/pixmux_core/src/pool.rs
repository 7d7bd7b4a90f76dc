//! Surface pool with most-recently-used ordering
//!
//! Records live in a [`SlotMap`] and are chained by key. The head is the most
//! recently used surface; the tail is the first eviction candidate. Insertion,
//! removal and move-to-front are O(1).

use slotmap::SlotMap;

use crate::surface::PixelSurface;

slotmap::new_key_type! {
    /// Stable identifier of a pixel surface
    pub struct SurfaceId;
}

#[derive(Debug)]
struct Node {
    surface: PixelSurface,
    prev: Option<SurfaceId>,
    next: Option<SurfaceId>,
}

#[derive(Debug, Default)]
pub struct SurfacePool {
    nodes: SlotMap<SurfaceId, Node>,
    head: Option<SurfaceId>,
    tail: Option<SurfaceId>,
}

impl SurfacePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: SurfaceId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn head(&self) -> Option<SurfaceId> {
        self.head
    }

    pub fn tail(&self) -> Option<SurfaceId> {
        self.tail
    }

    /// Neighbor towards the head.
    pub fn prev(&self, id: SurfaceId) -> Option<SurfaceId> {
        self.nodes.get(id).and_then(|n| n.prev)
    }

    /// Neighbor towards the tail.
    pub fn next(&self, id: SurfaceId) -> Option<SurfaceId> {
        self.nodes.get(id).and_then(|n| n.next)
    }

    pub fn get(&self, id: SurfaceId) -> Option<&PixelSurface> {
        self.nodes.get(id).map(|n| &n.surface)
    }

    pub(crate) fn get_mut(&mut self, id: SurfaceId) -> Option<&mut PixelSurface> {
        self.nodes.get_mut(id).map(|n| &mut n.surface)
    }

    /// Register a surface as the most recently used.
    pub(crate) fn insert(&mut self, surface: PixelSurface) -> SurfaceId {
        let id = self.nodes.insert(Node {
            surface,
            prev: None,
            next: None,
        });
        self.link_front(id);
        id
    }

    pub(crate) fn remove(&mut self, id: SurfaceId) -> Option<PixelSurface> {
        if !self.nodes.contains_key(id) {
            return None;
        }
        self.unlink(id);
        self.nodes.remove(id).map(|n| n.surface)
    }

    pub(crate) fn move_to_front(&mut self, id: SurfaceId) {
        if self.head == Some(id) || !self.nodes.contains_key(id) {
            return;
        }
        self.unlink(id);
        self.link_front(id);
    }

    /// Surfaces from most to least recently used.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            pool: self,
            cursor: self.head,
        }
    }

    fn link_front(&mut self, id: SurfaceId) {
        let old_head = self.head;
        if let Some(node) = self.nodes.get_mut(id) {
            node.prev = None;
            node.next = old_head;
        }
        match old_head.and_then(|h| self.nodes.get_mut(h)) {
            Some(head) => head.prev = Some(id),
            None => self.tail = Some(id),
        }
        self.head = Some(id);
    }

    fn unlink(&mut self, id: SurfaceId) {
        let Some((prev, next)) = self.nodes.get(id).map(|n| (n.prev, n.next)) else {
            return;
        };
        match prev.and_then(|p| self.nodes.get_mut(p)) {
            Some(p) => p.next = next,
            None => self.head = next,
        }
        match next.and_then(|n| self.nodes.get_mut(n)) {
            Some(n) => n.prev = prev,
            None => self.tail = prev,
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.prev = None;
            node.next = None;
        }
    }
}

pub struct Iter<'a> {
    pool: &'a SurfacePool,
    cursor: Option<SurfaceId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (SurfaceId, &'a PixelSurface);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let node = self.pool.nodes.get(id)?;
        self.cursor = node.next;
        Some((id, &node.surface))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface() -> PixelSurface {
        PixelSurface::new(1, 1, 8, 8)
    }

    fn order(pool: &SurfacePool) -> Vec<SurfaceId> {
        pool.iter().map(|(id, _)| id).collect()
    }

    /// Walking backwards from the tail must mirror the forward walk.
    fn assert_links(pool: &SurfacePool) {
        let forward = order(pool);
        let mut backward = Vec::new();
        let mut cursor = pool.tail();
        while let Some(id) = cursor {
            backward.push(id);
            cursor = pool.prev(id);
        }
        backward.reverse();
        assert_eq!(forward, backward);
        assert_eq!(forward.len(), pool.len());
        assert_eq!(pool.head(), forward.first().copied());
        assert_eq!(pool.tail(), forward.last().copied());
    }

    #[test]
    fn test_insert_at_head() {
        let mut pool = SurfacePool::new();
        let a = pool.insert(surface());
        assert_eq!(pool.head(), Some(a));
        assert_eq!(pool.tail(), Some(a));

        let b = pool.insert(surface());
        let c = pool.insert(surface());
        assert_eq!(order(&pool), vec![c, b, a]);
        assert_links(&pool);
    }

    #[test]
    fn test_move_to_front() {
        let mut pool = SurfacePool::new();
        let a = pool.insert(surface());
        let b = pool.insert(surface());
        let c = pool.insert(surface());

        pool.move_to_front(a);
        assert_eq!(order(&pool), vec![a, c, b]);
        assert_links(&pool);

        pool.move_to_front(c);
        assert_eq!(order(&pool), vec![c, a, b]);
        pool.move_to_front(c);
        assert_eq!(order(&pool), vec![c, a, b]);
        assert_links(&pool);
    }

    #[test]
    fn test_remove_relinks() {
        let mut pool = SurfacePool::new();
        let a = pool.insert(surface());
        let b = pool.insert(surface());
        let c = pool.insert(surface());

        assert!(pool.remove(b).is_some());
        assert_eq!(order(&pool), vec![c, a]);
        assert_links(&pool);

        assert!(pool.remove(c).is_some());
        assert_eq!(pool.head(), Some(a));
        assert_links(&pool);

        assert!(pool.remove(a).is_some());
        assert!(pool.is_empty());
        assert_eq!(pool.head(), None);
        assert_eq!(pool.tail(), None);
        assert!(pool.remove(a).is_none());
    }

    #[test]
    fn test_interleaved_operations_keep_links() {
        let mut pool = SurfacePool::new();
        let mut ids = Vec::new();
        for i in 0..16 {
            ids.push(pool.insert(surface()));
            if i % 3 == 0 {
                pool.move_to_front(ids[i / 2]);
            }
            if i % 5 == 4 {
                let victim = ids.remove(1);
                pool.remove(victim);
            }
            assert_links(&pool);
        }
    }
}
