use std::fmt;

/// column layout for views whose width grows with the number of columns.
pub trait Width {
    fn width_by_chunk_size(chunk_size: usize) -> usize;
    /// widest column count that fits in `max_width`, at least 1.
    fn chunk_size(max_width: usize) -> usize {
        (2..)
            .find(|&n| Self::width_by_chunk_size(n) > max_width)
            .map_or(1, |n| n - 1)
    }
}

pub trait Stat {
    fn view(&self, max_width: usize) -> Box<dyn StatView + '_>;
}

pub trait StatView: fmt::Display {
    fn header(&self) -> &'static str;
    /// body width
    fn width(&self) -> usize;
}

pub trait AddStats {
    fn add_stats(&self, buf: &mut Stats);
}

/// stats collected from a finished run, shown in one framed block.
#[derive(Default)]
pub struct Stats(Vec<Box<dyn Stat>>);

impl Stats {
    pub fn push(&mut self, stat: impl Stat + 'static) {
        self.0.push(Box::new(stat))
    }
    pub fn view(&self, max_width: usize) -> StatsView<'_> {
        StatsView(self.0.iter().map(|s| s.view(max_width)).collect())
    }
}

pub struct StatsView<'s>(Vec<Box<dyn StatView + 's>>);

impl fmt::Display for StatsView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .0
            .iter()
            .map(|v| v.header().len().max(v.width()))
            .fold(0, usize::max);
        writeln!(f, "{:=^width$}", " cache simulation ")?;
        for v in &self.0 {
            writeln!(f, "{}:\n{v}", v.header())?;
        }
        write!(f, "{:=<width$}", "")
    }
}
