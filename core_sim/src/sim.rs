use std::{fmt, io::BufRead};

use anyhow::Result;

use crate::{
    addr::{ConfigurationError, Geometry},
    cache::{Access, Cache},
    summary::Summary,
    trace::{AccessRecord, TraceReader},
};

#[cfg(feature = "stat")]
use crate::stat::{AddStats, Stats};

/// verbose echo of one access, e.g. `M 12,1 miss eviction hit`.
pub struct Echo<'a>(pub &'a AccessRecord, pub &'a Access);

impl fmt::Display for Echo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0, self.1)
    }
}

/// replays access records, in order, against a single cache.
pub struct Simulator {
    cache: Cache,
    replayed: usize,
    ignored: usize,
    #[cfg(feature = "stat")]
    stat_builder: stat::SimStatBuilder,
}

impl Simulator {
    pub fn new(geometry: Geometry) -> Result<Self, ConfigurationError> {
        log::info!("cache geometry: {geometry}");
        Ok(Self {
            cache: Cache::new(geometry)?,
            replayed: 0,
            ignored: 0,
            #[cfg(feature = "stat")]
            stat_builder: stat::SimStatBuilder::new(),
        })
    }

    pub fn step(&mut self, record: &AccessRecord) -> Access {
        let access = self.cache.access(record.kind, record.address);
        if access.is_ignored() {
            self.ignored += 1;
        } else {
            self.replayed += 1;
            log::debug!("{}", Echo(record, &access));
        }
        access
    }

    /// replays `records` to the end. `on_access` sees every record that reached the cache.
    pub fn run<I, F>(&mut self, records: I, mut on_access: F) -> Result<Summary>
    where
        I: IntoIterator<Item = Result<AccessRecord>>,
        F: FnMut(&AccessRecord, &Access),
    {
        for record in records {
            let record = record?;
            let access = self.step(&record);
            if !access.is_ignored() {
                on_access(&record, &access);
            }
        }
        #[cfg(feature = "stat")]
        self.stat_builder.stop_timer();
        let summary = self.summary();
        log::info!("replayed {} accesses. {summary}", self.replayed);
        Ok(summary)
    }

    pub fn run_trace<R, F>(&mut self, trace: &mut TraceReader<R>, on_access: F) -> Result<Summary>
    where
        R: BufRead,
        F: FnMut(&AccessRecord, &Access),
    {
        let summary = self.run(trace.by_ref(), on_access)?;
        self.ignored += trace.ignored();
        if trace.malformed() > 0 {
            log::warn!("{} malformed trace lines skipped.", trace.malformed());
        }
        #[cfg(feature = "stat")]
        self.stat_builder.malformed(trace.malformed());
        Ok(summary)
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }
    pub fn summary(&self) -> Summary {
        self.cache.summary()
    }
    pub fn into_summary(self) -> Summary {
        self.cache.summary()
    }
}

impl Simulator {
    #[cfg(feature = "stat")]
    pub fn collect_stat(&self) -> Stats {
        let mut ss = Stats::default();
        self.add_stats(&mut ss);
        ss
    }
}

#[cfg(feature = "stat")]
impl AddStats for Simulator {
    fn add_stats(&self, buf: &mut Stats) {
        buf.push(self.stat_builder.finish(self.replayed, self.ignored));
        self.cache.add_stats(buf);
    }
}

#[cfg(feature = "stat")]
mod stat {
    use crate::stat::*;

    use std::{fmt, time};

    pub struct SimStatBuilder {
        begin: time::Instant,
        elapsed: Option<time::Duration>,
        malformed: usize,
    }

    impl SimStatBuilder {
        pub fn new() -> Self {
            Self {
                begin: time::Instant::now(),
                elapsed: None,
                malformed: 0,
            }
        }
        pub fn malformed(&mut self, malformed: usize) {
            self.malformed = malformed
        }
        pub fn stop_timer(&mut self) {
            self.elapsed = Some(time::Instant::now() - self.begin)
        }
        pub fn finish(&self, replayed: usize, ignored: usize) -> SimStat {
            SimStat {
                replayed,
                ignored,
                malformed: self.malformed,
                elapsed: self.elapsed.unwrap_or_else(|| self.begin.elapsed()),
            }
        }
    }

    impl Default for SimStatBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    pub struct SimStat {
        replayed: usize,
        ignored: usize,
        malformed: usize,
        elapsed: time::Duration,
    }

    impl Stat for SimStat {
        fn view(&self, _: usize) -> Box<dyn StatView + '_> {
            Box::new(self)
        }
    }

    impl StatView for &'_ SimStat {
        fn header(&self) -> &'static str {
            "simulator stat"
        }
        fn width(&self) -> usize {
            44
        }
    }

    impl fmt::Display for &'_ SimStat {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let ms = format!("{} ms", self.elapsed.as_millis());
            writeln!(f, "  elapsed total: {ms:>26}")?;
            let replayed = format!("#{}", self.replayed);
            writeln!(f, "  accesses replayed: {replayed:>22}")?;
            let ignored = format!("#{}", self.ignored);
            writeln!(f, "  instruction fetches ignored: {ignored:>12}")?;
            let malformed = format!("#{}", self.malformed);
            write!(f, "  malformed lines skipped: {malformed:>16}")
        }
    }
}
