//! Reading channel log files back, plain or gzip-compressed.

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use strand_observability::ChannelTimingEvent;
use strand_observability::layout::parse_line;

/// Totals over one channel log file.
#[derive(Debug, Default)]
pub struct Summary {
    pub records: usize,
    /// 1-based line number and parse error of each rejected line.
    pub unparsable: Vec<(usize, String)>,
    pub total_processing_millis: u64,
    pub max_total_processing_millis: u64,
}

impl Summary {
    pub fn mean_total_processing_millis(&self) -> f64 {
        if self.records == 0 {
            0.0
        } else {
            self.total_processing_millis as f64 / self.records as f64
        }
    }
}

/// Open `path`, decompressing when it ends in `.gz`.
pub fn open(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    let gzipped = path.extension().is_some_and(|ext| ext == "gz");
    if gzipped {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Parse every line, handing each record to `on_event`.
pub fn summarize<R, F>(reader: R, mut on_event: F) -> io::Result<Summary>
where
    R: BufRead,
    F: FnMut(&ChannelTimingEvent),
{
    let mut summary = Summary::default();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        match parse_line(&line) {
            Ok(event) => {
                let total = event.total_processing_millis();
                summary.records += 1;
                summary.total_processing_millis = summary.total_processing_millis.saturating_add(total);
                summary.max_total_processing_millis = summary.max_total_processing_millis.max(total);
                on_event(&event);
            }
            Err(e) => summary.unparsable.push((i + 1, e.to_string())),
        }
    }
    Ok(summary)
}
