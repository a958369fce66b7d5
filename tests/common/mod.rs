//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use slog::{Drain, Key, Never, OwnedKVList, Record, KV};

/// A log record with its key/values rendered to strings
#[derive(Debug, Clone)]
pub struct Entry {
    pub msg: String,
    pub kv: Vec<(String, String)>,
}

impl Entry {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.kv
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Drain keeping every record in memory
#[derive(Clone, Default)]
pub struct Capture {
    entries: Arc<Mutex<Vec<Entry>>>,
}

impl Capture {
    pub fn new() -> Self {
        Capture::default()
    }

    pub fn logger(&self) -> slog::Logger {
        slog::Logger::root(self.clone(), slog::o!())
    }

    pub fn with_message(&self, msg: &str) -> Vec<Entry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.msg == msg)
            .cloned()
            .collect()
    }

    /// Poll until `count` records with `msg` were logged, or give up
    pub fn wait_for(&self, msg: &str, count: usize, timeout: Duration) -> Vec<Entry> {
        let deadline = Instant::now() + timeout;
        loop {
            let entries = self.with_message(msg);
            if entries.len() >= count || Instant::now() >= deadline {
                return entries;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }
}

struct Collect(Vec<(String, String)>);

impl slog::Serializer for Collect {
    fn emit_arguments(&mut self, key: Key, val: &fmt::Arguments) -> slog::Result {
        self.0.push((key.to_string(), val.to_string()));
        Ok(())
    }
}

impl Drain for Capture {
    type Ok = ();
    type Err = Never;

    fn log(&self, record: &Record, values: &OwnedKVList) -> Result<(), Never> {
        let mut kv = Collect(Vec::new());
        let _ = record.kv().serialize(record, &mut kv);
        let _ = values.serialize(record, &mut kv);
        self.entries.lock().unwrap().push(Entry {
            msg: record.msg().to_string(),
            kv: kv.0,
        });
        Ok(())
    }
}

/// Initialize a reaper config that runs outside pid 1 and logs to `capture`
pub fn config(capture: &Capture) -> grim_reaper::Config {
    grim_reaper::Config {
        enforce_pid1_check: false,
        logger: Some(capture.logger()),
        ..grim_reaper::Config::default()
    }
}
