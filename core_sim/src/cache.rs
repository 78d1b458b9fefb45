use std::{collections::TryReserveError, fmt, mem};

use bitmask_enum::bitmask;

use crate::{
    addr::{Addr, ConfigurationError, Geometry},
    summary::Summary,
    trace::AccessKind,
};

#[cfg(feature = "stat")]
use crate::stat::{AddStats, Stats};

/// what a single lookup of the cache did.
#[bitmask(u8)]
pub enum Outcome {
    Hit,
    Miss,
    Eviction,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = [
            (Self::Hit, "hit"),
            (Self::Miss, "miss"),
            (Self::Eviction, "eviction"),
        ];
        let mut sep = "";
        for (flag, word) in words {
            if self.contains(flag) {
                write!(f, "{sep}{word}")?;
                sep = " ";
            }
        }
        Ok(())
    }
}

/// result of one access record. a modify looks up twice: the load, then the store.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub struct Access {
    pub load: Option<Outcome>,
    pub store: Option<Outcome>,
}

impl Access {
    /// instruction fetches never reach the cache.
    pub fn is_ignored(&self) -> bool {
        self.load.is_none()
    }
    pub fn outcomes(&self) -> impl Iterator<Item = Outcome> {
        self.load.into_iter().chain(self.store)
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = "";
        for o in self.outcomes() {
            write!(f, "{sep}{o}")?;
            sep = " ";
        }
        Ok(())
    }
}

#[derive(Default, Clone, Copy, Debug)]
struct Line {
    valid: bool,
    tag: u64,
    /// last touch; unique within the set, larger is more recent.
    stamp: u64,
}

struct Set {
    lines: Vec<Line>,
    clock: u64,
    #[cfg(feature = "stat")]
    counts: Summary,
}

/// bytes held by `2^set_bits` sets of `associativity` lines, if addressable.
pub(crate) fn footprint(set_bits: u32, associativity: usize) -> Option<usize> {
    let sets = 1usize.checked_shl(set_bits)?;
    let set_bytes = sets.checked_mul(mem::size_of::<Set>())?;
    let line_bytes = sets
        .checked_mul(associativity)?
        .checked_mul(mem::size_of::<Line>())?;
    set_bytes
        .checked_add(line_bytes)
        .filter(|&bytes| bytes <= isize::MAX as usize)
}

impl Set {
    fn new(associativity: usize) -> Result<Self, TryReserveError> {
        let mut lines = Vec::new();
        lines.try_reserve_exact(associativity)?;
        lines.resize(associativity, Line::default());
        Ok(Self {
            lines,
            clock: 0,
            #[cfg(feature = "stat")]
            counts: Summary::default(),
        })
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn lookup(&self, tag: u64) -> Option<&Line> {
        self.lines.iter().find(|l| l.valid && l.tag == tag)
    }

    fn touch(&mut self, tag: u64) -> Outcome {
        let stamp = self.tick();
        if let Some(line) = self.lines.iter_mut().find(|l| l.valid && l.tag == tag) {
            line.stamp = stamp;
            return Outcome::Hit;
        }
        let fill = Line {
            valid: true,
            tag,
            stamp,
        };
        if let Some(line) = self.lines.iter_mut().find(|l| !l.valid) {
            *line = fill;
            return Outcome::Miss;
        }
        let Some(victim) = self.lines.iter_mut().min_by_key(|l| l.stamp) else {
            unreachable!("a set holds at least one line");
        };
        log::trace!("evict tag {:#x} (stamp {})", victim.tag, victim.stamp);
        *victim = fill;
        Outcome::Miss | Outcome::Eviction
    }
}

/// set-associative cache with LRU replacement.
pub struct Cache {
    geometry: Geometry,
    sets: Vec<Set>,
    summary: Summary,
}

impl Cache {
    /// allocates every set up front. fails instead of aborting when memory runs out.
    pub fn new(geometry: Geometry) -> Result<Self, ConfigurationError> {
        let too_many = |_: TryReserveError| geometry.too_many_lines();
        let mut sets = Vec::new();
        sets.try_reserve_exact(geometry.num_sets()).map_err(too_many)?;
        for _ in 0..geometry.num_sets() {
            sets.push(Set::new(geometry.associativity()).map_err(too_many)?);
        }
        Ok(Self {
            geometry,
            sets,
            summary: Summary::default(),
        })
    }

    pub fn with_params(s: i64, e: i64, b: i64) -> Result<Self, ConfigurationError> {
        Self::new(Geometry::new(s, e, b)?)
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// applies one access and updates the counters.
    pub fn access(&mut self, kind: AccessKind, addr: Addr) -> Access {
        match kind {
            AccessKind::InstructionFetch => Access::default(),
            AccessKind::Load | AccessKind::Store => Access {
                load: Some(self.touch(addr)),
                store: None,
            },
            AccessKind::Modify => {
                let load = self.touch(addr);
                let store = self.touch(addr);
                debug_assert_eq!(store, Outcome::Hit);
                Access {
                    load: Some(load),
                    store: Some(store),
                }
            }
        }
    }

    fn touch(&mut self, addr: Addr) -> Outcome {
        let d = self.geometry.decompose(addr);
        let set = &mut self.sets[d.set_index];
        let outcome = set.touch(d.tag);
        #[cfg(feature = "stat")]
        set.counts.record(outcome);
        self.summary.record(outcome);
        log::trace!(
            "{addr}: set {} tag {:#x} -> {outcome}",
            d.set_index,
            d.tag
        );
        outcome
    }

    /// whether the block holding `addr` is currently cached. does not touch recency.
    pub fn resident(&self, addr: Addr) -> bool {
        let d = self.geometry.decompose(addr);
        self.sets[d.set_index].lookup(d.tag).is_some()
    }

    pub fn summary(&self) -> Summary {
        self.summary
    }
}

#[cfg(feature = "stat")]
impl AddStats for Cache {
    fn add_stats(&self, buf: &mut Stats) {
        buf.push(stat::CacheStat {
            geometry: *self.geometry(),
            summary: self.summary,
        });
        buf.push(stat::SetStat {
            counts: self.sets.iter().map(|s| s.counts).collect(),
        });
    }
}

#[cfg(feature = "stat")]
mod stat {
    use crate::stat::*;

    use super::*;

    /// sets listed before the per-set view is cut off.
    const MAX_SHOWN_SETS: usize = 64;
    const COLUMN_WIDTH: usize = 30;

    pub struct CacheStat {
        pub geometry: Geometry,
        pub summary: Summary,
    }

    impl Stat for CacheStat {
        fn view(&self, _: usize) -> Box<dyn StatView + '_> {
            Box::new(self)
        }
    }

    impl StatView for &'_ CacheStat {
        fn header(&self) -> &'static str {
            "cache stat"
        }
        fn width(&self) -> usize {
            self.geometry.to_string().len() + 2
        }
    }

    impl fmt::Display for &'_ CacheStat {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let s = &self.summary;
            writeln!(f, "  {}", self.geometry)?;
            if let Some(bytes) = self.geometry.block_size() {
                writeln!(f, "  block size: {bytes:>8} B")?;
            }
            writeln!(f, "  hits:      {:>11}", s.hits)?;
            writeln!(f, "  misses:    {:>11}", s.misses)?;
            writeln!(f, "  evictions: {:>11}", s.evictions)?;
            let rate = format!("{:.2} %", s.hit_rate() * 100.0);
            write!(f, "  hit rate:  {rate:>11}")
        }
    }

    pub struct SetStat {
        pub counts: Vec<Summary>,
    }

    impl Stat for SetStat {
        fn view(&self, max_width: usize) -> Box<dyn StatView + '_> {
            Box::new(SetStatView::new(self, max_width))
        }
    }

    pub struct SetStatView<'a> {
        stat: &'a SetStat,
        chunk_size: usize,
    }

    impl<'a> SetStatView<'a> {
        pub fn new(stat: &'a SetStat, max_width: usize) -> Self {
            Self {
                stat,
                chunk_size: Self::chunk_size(max_width),
            }
        }
    }

    impl Width for SetStatView<'_> {
        fn width_by_chunk_size(chunk_size: usize) -> usize {
            chunk_size * COLUMN_WIDTH
        }
    }

    impl StatView for SetStatView<'_> {
        fn header(&self) -> &'static str {
            "access count of touched sets (format: `set: hits / misses / evictions`)"
        }
        fn width(&self) -> usize {
            Self::width_by_chunk_size(self.chunk_size)
        }
    }

    impl fmt::Display for SetStatView<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let touched: Vec<_> = self
                .stat
                .counts
                .iter()
                .enumerate()
                .filter(|(_, c)| c.accesses() > 0)
                .collect();
            let shown = &touched[..touched.len().min(MAX_SHOWN_SETS)];
            let mut sep = "";
            for row in shown.chunks(self.chunk_size) {
                write!(f, "{sep}")?;
                for (i, c) in row {
                    write!(
                        f,
                        " {i:>5}:{:>7}/{:>7}/{:>7}",
                        c.hits, c.misses, c.evictions
                    )?;
                }
                sep = "\n";
            }
            if touched.len() > shown.len() {
                write!(f, "\n  ... and {} more sets", touched.len() - shown.len())?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use AccessKind::*;

    fn cache(s: i64, e: i64, b: i64) -> Cache {
        Cache::with_params(s, e, b).unwrap()
    }

    fn load(c: &mut Cache, addr: u64) -> Outcome {
        c.access(Load, Addr::new(addr)).load.unwrap()
    }

    #[test]
    fn test_new_cache_is_cold() {
        let c = cache(2, 3, 4);
        assert_eq!(4, c.sets.len());
        assert!(c.sets.iter().all(|s| s.lines.len() == 3));
        assert!(c.sets.iter().flat_map(|s| &s.lines).all(|l| !l.valid));
        assert_eq!(Summary::default(), c.summary());
    }
    #[test]
    fn test_bad_params() {
        assert!(Cache::with_params(1, 0, 1).is_err());
        assert!(Cache::with_params(-1, 1, 1).is_err());
        assert!(Cache::with_params(33, 1, 32).is_err());
    }
    #[test]
    fn test_footprint_counts_sets_and_lines() {
        let per_set = mem::size_of::<Set>() + 3 * mem::size_of::<Line>();
        assert_eq!(Some(4 * per_set), footprint(2, 3));
        assert_eq!(None, footprint(63, 1));
        assert_eq!(None, footprint(58, 1));
        assert_eq!(None, footprint(1, usize::MAX));
    }
    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_unallocatable_cache_is_an_error() {
        assert!(matches!(
            Geometry::new(58, 1, 0),
            Err(ConfigurationError::TooManyLines { .. })
        ));
        // addressable but far beyond any real address space
        let g = Geometry::new(56, 1, 0).unwrap();
        assert!(matches!(
            Cache::new(g),
            Err(ConfigurationError::TooManyLines {
                set_bits: 56,
                associativity: 1
            })
        ));
    }
    #[test]
    fn test_direct_mapped_conflict_evicts() {
        let mut c = cache(0, 1, 4);
        assert_eq!(Outcome::Miss, load(&mut c, 0x00));
        for i in 1..10u64 {
            let before = c.summary().evictions;
            assert_eq!(Outcome::Miss | Outcome::Eviction, load(&mut c, i << 4));
            assert_eq!(before + 1, c.summary().evictions);
            assert!(!c.resident(Addr::new((i - 1) << 4)));
        }
    }
    #[test]
    fn test_repeated_access_hits_after_first_miss() {
        let mut c = cache(2, 2, 3);
        assert_eq!(Outcome::Miss, load(&mut c, 0x48));
        for off in 0..8 {
            assert_eq!(Outcome::Hit, load(&mut c, 0x48 + off));
            let a = c.access(Store, Addr::new(0x48 + off));
            assert_eq!(Some(Outcome::Hit), a.load);
        }
        assert_eq!(1, c.summary().misses);
        assert_eq!(16, c.summary().hits);
    }
    #[test]
    fn test_lru_evicts_least_recent() {
        let mut c = cache(0, 2, 0);
        let (a, b, x) = (0xa, 0xb, 0xc);
        assert_eq!(Outcome::Miss, load(&mut c, a));
        assert_eq!(Outcome::Miss, load(&mut c, b));
        assert_eq!(Outcome::Hit, load(&mut c, a));
        assert_eq!(Outcome::Miss | Outcome::Eviction, load(&mut c, x));
        assert!(c.resident(Addr::new(a)));
        assert!(!c.resident(Addr::new(b)));
        assert!(c.resident(Addr::new(x)));
    }
    #[test]
    fn test_lru_order_over_full_set() {
        let mut c = cache(1, 4, 0);
        // set 0 only: even addresses
        for t in 0..4u64 {
            load(&mut c, t << 1);
        }
        load(&mut c, 0);
        load(&mut c, 2 << 1);
        // order now 1, 3, 0, 2 from least recent
        for (incoming, victim) in [(4u64, 1u64), (5, 3), (6, 0), (7, 2)] {
            assert_eq!(Outcome::Miss | Outcome::Eviction, load(&mut c, incoming << 1));
            assert!(!c.resident(Addr::new(victim << 1)));
        }
        assert_eq!(4, c.summary().evictions);
        assert!(c.sets[1].lines.iter().all(|l| !l.valid));
    }
    #[test]
    fn test_stamps_unique_within_set() {
        let mut c = cache(0, 4, 0);
        for addr in [1, 2, 1, 3, 4, 5, 2, 2, 6, 1] {
            load(&mut c, addr);
        }
        let mut stamps: Vec<_> = c.sets[0].lines.iter().map(|l| l.stamp).collect();
        stamps.sort_unstable();
        stamps.dedup();
        assert_eq!(4, stamps.len());
    }
    #[test]
    fn test_no_duplicate_resident_tags() {
        let mut c = cache(1, 3, 1);
        for i in 0..200u64 {
            let addr = (i * 7919) % 37;
            c.access(if i % 3 == 0 { Modify } else { Load }, Addr::new(addr));
            for set in &c.sets {
                let mut tags: Vec<_> = set
                    .lines
                    .iter()
                    .filter(|l| l.valid)
                    .map(|l| l.tag)
                    .collect();
                let n = tags.len();
                tags.sort_unstable();
                tags.dedup();
                assert_eq!(n, tags.len());
            }
        }
    }
    #[test]
    fn test_modify_cold() {
        let mut c = cache(2, 1, 2);
        let a = c.access(Modify, Addr::new(0x10));
        assert_eq!(Some(Outcome::Miss), a.load);
        assert_eq!(Some(Outcome::Hit), a.store);
        assert_eq!(
            Summary {
                hits: 1,
                misses: 1,
                evictions: 0
            },
            c.summary()
        );
    }
    #[test]
    fn test_modify_on_full_set() {
        let mut c = cache(0, 1, 0);
        load(&mut c, 1);
        let a = c.access(Modify, Addr::new(2));
        assert_eq!(Some(Outcome::Miss | Outcome::Eviction), a.load);
        assert_eq!(Some(Outcome::Hit), a.store);
        assert_eq!(
            Summary {
                hits: 1,
                misses: 2,
                evictions: 1
            },
            c.summary()
        );
    }
    #[test]
    fn test_instruction_fetch_ignored() {
        let mut c = cache(0, 1, 0);
        let a = c.access(InstructionFetch, Addr::new(0x400));
        assert!(a.is_ignored());
        assert!(!c.resident(Addr::new(0x400)));
        assert_eq!(Summary::default(), c.summary());
    }
    #[test]
    fn test_size_does_not_matter_within_block() {
        let mut c = cache(1, 1, 1);
        assert_eq!(Outcome::Miss, load(&mut c, 0));
        assert_eq!(Outcome::Hit, load(&mut c, 1));
        assert_eq!(Outcome::Miss, load(&mut c, 2));
        assert_eq!(Outcome::Miss | Outcome::Eviction, load(&mut c, 4));
        assert_eq!(
            Summary {
                hits: 1,
                misses: 3,
                evictions: 1
            },
            c.summary()
        );
    }
    #[test]
    fn test_access_display() {
        let a = Access {
            load: Some(Outcome::Miss | Outcome::Eviction),
            store: Some(Outcome::Hit),
        };
        assert_eq!("miss eviction hit", a.to_string());
        assert_eq!("", Access::default().to_string());
        assert_eq!("hit", Outcome::Hit.to_string());
    }
    #[cfg(feature = "stat")]
    #[test]
    fn test_per_set_counts() {
        let mut c = cache(1, 1, 0);
        load(&mut c, 0);
        load(&mut c, 0);
        load(&mut c, 1);
        load(&mut c, 3);
        assert_eq!(
            Summary {
                hits: 1,
                misses: 1,
                evictions: 0
            },
            c.sets[0].counts
        );
        assert_eq!(
            Summary {
                hits: 0,
                misses: 2,
                evictions: 1
            },
            c.sets[1].counts
        );
    }
}
