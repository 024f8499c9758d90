//! # Bounded Page Cache
//!
//! Residency tracking for the overlay: a mapping from page index to resident
//! [`Page`] in least-recently-used order, bounded by `max_pages`, alongside
//! the pin set and the dirty set.
//!
//! ## Eviction Discipline
//!
//! The recency order lives in a [`LinkedHashMap`]: front is the coldest
//! page, back the hottest. When an insert pushes residency past the bound,
//! the cache walks from the front and picks the first *unpinned* page (never
//! the page just inserted). Evicted pages are handed back to the caller
//! rather than dropped, so the store can write dirty evictees to the backend
//! first. If every other resident page is pinned, the cache overflows the
//! bound instead of evicting; pins win over the residency limit.
//!
//! ## Pin Set and Dirty Set
//!
//! Both are [`RoaringTreemap`]s over page indices. Pinning a page that is
//! not resident is valid: the index is immune to eviction whenever it later
//! becomes resident. The dirty set mirrors the per-page dirty flags exactly;
//! the flag is only ever toggled through [`mark_dirty`]/[`clear_dirty`] so
//! the two can never drift.
//!
//! [`mark_dirty`]: PageCache::mark_dirty
//! [`clear_dirty`]: PageCache::clear_dirty

use hashlink::LinkedHashMap;
use roaring::RoaringTreemap;
use smallvec::SmallVec;

use super::page::Page;

#[derive(Debug)]
pub(crate) struct PageCache {
    /// Resident pages in recency order: front = least recently used.
    pages: LinkedHashMap<u64, Page>,
    /// Page indices immune to eviction.
    pins: RoaringTreemap,
    /// Indices of resident pages holding unflushed bytes.
    dirty: RoaringTreemap,
    max_pages: usize,
}

impl PageCache {
    pub fn new(max_pages: usize) -> Self {
        Self {
            pages: LinkedHashMap::new(),
            pins: RoaringTreemap::new(),
            dirty: RoaringTreemap::new(),
            max_pages,
        }
    }

    pub fn contains(&self, index: u64) -> bool {
        self.pages.contains_key(&index)
    }

    /// Returns the resident page and promotes it to most recently used.
    pub fn get_mut(&mut self, index: u64) -> Option<&mut Page> {
        // Remove-and-reinsert moves the entry to the back of the recency
        // order without cloning the page buffer.
        let page = self.pages.remove(&index)?;
        self.pages.insert(index, page);
        self.pages.get_mut(&index)
    }

    /// Returns the resident page without touching recency.
    pub fn peek(&self, index: u64) -> Option<&Page> {
        self.pages.get(&index)
    }

    /// Mutable access without touching recency (flush, del, truncate).
    pub fn peek_mut(&mut self, index: u64) -> Option<&mut Page> {
        self.pages.get_mut(&index)
    }

    /// Inserts `page` as most recently used and returns any pages evicted to
    /// stay within the residency bound, coldest first. The newly inserted
    /// page is never selected. When all other residents are pinned the bound
    /// is allowed to overflow and nothing is returned.
    pub fn insert(&mut self, index: u64, page: Page) -> SmallVec<[(u64, Page); 1]> {
        self.pages.insert(index, page);

        let mut evicted = SmallVec::new();
        while self.pages.len() > self.max_pages {
            let victim = self
                .pages
                .keys()
                .copied()
                .find(|&p| p != index && !self.pins.contains(p));
            match victim {
                Some(victim) => {
                    let page = self
                        .pages
                        .remove(&victim)
                        .expect("victim key was just observed in the map");
                    self.dirty.remove(victim);
                    evicted.push((victim, page));
                }
                None => break,
            }
        }
        evicted
    }

    /// Removes a page unconditionally, pinned or not. Does not flush.
    pub fn remove(&mut self, index: u64) -> Option<Page> {
        self.dirty.remove(index);
        self.pages.remove(&index)
    }

    /// Removes up to `count` unpinned pages in LRU order and returns them.
    pub fn take_lru_unpinned(&mut self, count: usize) -> Vec<(u64, Page)> {
        let victims: Vec<u64> = self
            .pages
            .keys()
            .copied()
            .filter(|&p| !self.pins.contains(p))
            .take(count)
            .collect();

        victims
            .into_iter()
            .map(|p| {
                self.dirty.remove(p);
                let page = self
                    .pages
                    .remove(&p)
                    .expect("victim key was just observed in the map");
                (p, page)
            })
            .collect()
    }

    pub fn mark_dirty(&mut self, index: u64) {
        if let Some(page) = self.pages.get_mut(&index) {
            page.set_dirty(true);
            self.dirty.insert(index);
        }
    }

    pub fn clear_dirty(&mut self, index: u64) {
        if let Some(page) = self.pages.get_mut(&index) {
            page.set_dirty(false);
        }
        self.dirty.remove(index);
    }

    pub fn is_dirty(&self, index: u64) -> bool {
        self.dirty.contains(index)
    }

    pub fn pin_range(&mut self, first: u64, last: u64) {
        for p in first..=last {
            self.pins.insert(p);
        }
    }

    pub fn unpin_range(&mut self, first: u64, last: u64) {
        for p in first..=last {
            self.pins.remove(p);
        }
    }

    /// Resident page indices, coldest first.
    pub fn resident_indices(&self) -> impl Iterator<Item = u64> + '_ {
        self.pages.keys().copied()
    }

    pub fn resident_count(&self) -> usize {
        self.pages.len()
    }

    pub fn unpinned_resident_count(&self) -> usize {
        self.pages
            .keys()
            .filter(|&&p| !self.pins.contains(p))
            .count()
    }

    pub fn dirty_count(&self) -> u64 {
        self.dirty.len()
    }

    /// Drops every page, pin, and dirty bit.
    pub fn clear(&mut self) {
        self.pages.clear();
        self.pins.clear();
        self.dirty.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dirty_page(byte: u8) -> Page {
        Page::from_data(vec![byte; 4])
    }

    #[test]
    fn get_mut_promotes_to_most_recently_used() {
        let mut cache = PageCache::new(2);

        cache.insert(0, dirty_page(0));
        cache.insert(1, dirty_page(1));
        cache.get_mut(0);

        // Page 1 is now the coldest and gets evicted by the next insert.
        let evicted = cache.insert(2, dirty_page(2));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].0, 1);
        assert!(cache.contains(0));
        assert!(cache.contains(2));
    }

    #[test]
    fn insert_evicts_coldest_unpinned_page() {
        let mut cache = PageCache::new(2);

        cache.insert(0, dirty_page(0));
        cache.insert(1, dirty_page(1));
        cache.pin_range(0, 0);

        let evicted = cache.insert(2, dirty_page(2));

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].0, 1, "pinned page 0 SHOULD be skipped");
        assert!(cache.contains(0));
    }

    #[test]
    fn insert_overflows_when_everything_else_is_pinned() {
        let mut cache = PageCache::new(2);

        cache.insert(0, dirty_page(0));
        cache.insert(1, dirty_page(1));
        cache.pin_range(0, 1);

        let evicted = cache.insert(2, dirty_page(2));

        assert!(evicted.is_empty());
        assert_eq!(cache.resident_count(), 3);
    }

    #[test]
    fn insert_never_evicts_the_new_page() {
        let mut cache = PageCache::new(1);

        cache.insert(0, dirty_page(0));
        cache.pin_range(0, 0);

        let evicted = cache.insert(1, dirty_page(1));

        assert!(evicted.is_empty());
        assert!(cache.contains(1));
    }

    #[test]
    fn eviction_returns_the_page_with_its_dirty_flag() {
        let mut cache = PageCache::new(1);

        cache.insert(0, dirty_page(0));
        cache.mark_dirty(0);

        let evicted = cache.insert(1, dirty_page(1));

        assert_eq!(evicted.len(), 1);
        assert!(evicted[0].1.is_dirty());
        assert_eq!(cache.dirty_count(), 0, "dirty set SHOULD drop the evictee");
    }

    #[test]
    fn dirty_set_mirrors_page_flags() {
        let mut cache = PageCache::new(4);

        cache.insert(3, dirty_page(3));
        cache.mark_dirty(3);
        assert!(cache.is_dirty(3));
        assert!(cache.peek(3).unwrap().is_dirty());

        cache.clear_dirty(3);
        assert!(!cache.is_dirty(3));
        assert!(!cache.peek(3).unwrap().is_dirty());
    }

    #[test]
    fn mark_dirty_on_absent_page_is_a_no_op() {
        let mut cache = PageCache::new(4);

        cache.mark_dirty(9);

        assert_eq!(cache.dirty_count(), 0);
    }

    #[test]
    fn pinning_an_absent_page_applies_when_it_becomes_resident() {
        let mut cache = PageCache::new(1);

        cache.pin_range(5, 5);
        cache.insert(5, dirty_page(5));

        let evicted = cache.insert(6, dirty_page(6));

        assert!(evicted.is_empty(), "pinned page 5 SHOULD survive");
        assert!(cache.contains(5));
    }

    #[test]
    fn remove_ignores_pins() {
        let mut cache = PageCache::new(4);

        cache.insert(2, dirty_page(2));
        cache.pin_range(2, 2);
        cache.mark_dirty(2);

        assert!(cache.remove(2).is_some());
        assert!(!cache.contains(2));
        assert_eq!(cache.dirty_count(), 0);
    }

    #[test]
    fn take_lru_unpinned_walks_in_recency_order() {
        let mut cache = PageCache::new(8);

        for p in 0..4 {
            cache.insert(p, dirty_page(p as u8));
        }
        cache.pin_range(0, 0);
        cache.get_mut(1);

        let taken = cache.take_lru_unpinned(2);
        let indices: Vec<u64> = taken.iter().map(|(p, _)| *p).collect();

        assert_eq!(indices, vec![2, 3], "page 0 pinned, page 1 freshly touched");
    }

    #[test]
    fn clear_drops_pages_pins_and_dirty_bits() {
        let mut cache = PageCache::new(1);

        cache.insert(0, dirty_page(0));
        cache.mark_dirty(0);
        cache.pin_range(0, 0);

        cache.clear();

        assert_eq!(cache.resident_count(), 0);
        assert_eq!(cache.dirty_count(), 0);

        // The pin on page 0 is gone: it evicts under pressure again.
        cache.insert(0, dirty_page(0));
        let evicted = cache.insert(1, dirty_page(1));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].0, 0);
    }
}
