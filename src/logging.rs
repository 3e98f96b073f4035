//! In-process logger backing the log overlay. Records go to a bounded
//! ring so the overlay can show recent history without touching disk.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, Local};
use log::{Level, LevelFilter, Log, Metadata, Record};

const RING_CAP: usize = 500;

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub time: DateTime<Local>,
    pub level: Level,
    pub target: String,
    pub message: String,
}

static RING: OnceLock<Arc<Mutex<VecDeque<LogEntry>>>> = OnceLock::new();

fn ring() -> &'static Arc<Mutex<VecDeque<LogEntry>>> {
    RING.get_or_init(|| Arc::new(Mutex::new(VecDeque::with_capacity(RING_CAP))))
}

struct RingLogger;

impl Log for RingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let entry = LogEntry {
            time: Local::now(),
            level: record.level(),
            target: record.target().to_string(),
            message: record.args().to_string(),
        };
        if let Ok(mut ring) = ring().lock() {
            if ring.len() >= RING_CAP {
                ring.pop_front();
            }
            ring.push_back(entry);
        }
    }

    fn flush(&self) {}
}

/// Install the ring logger. Safe to call once per process; later calls
/// are ignored (relevant under the test harness).
pub fn init(debug: bool) {
    let level = if debug { LevelFilter::Debug } else { LevelFilter::Info };
    if log::set_boxed_logger(Box::new(RingLogger)).is_ok() {
        log::set_max_level(level);
    }
}

/// Snapshot of recent entries, oldest first.
pub fn entries() -> Vec<LogEntry> {
    ring().lock().map(|r| r.iter().cloned().collect()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_records_and_stays_bounded() {
        init(true);
        for i in 0..(RING_CAP + 50) {
            log::info!("entry {i}");
        }
        let entries = entries();
        assert!(entries.len() <= RING_CAP);
        assert!(entries.last().unwrap().message.contains("entry"));
    }
}
