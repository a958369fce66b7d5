//! Test doubles shared by the unit tests

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use slog::{Drain, Key, Never, OwnedKVList, Record, KV};

use crate::sweep::Wait;

/// A log record with its key/values rendered to strings
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) level: slog::Level,
    pub(crate) msg: String,
    pub(crate) kv: Vec<(String, String)>,
}

impl Entry {
    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.kv
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// In-memory drain
#[derive(Clone, Default)]
pub(crate) struct Capture {
    entries: Arc<Mutex<Vec<Entry>>>,
}

impl Capture {
    pub(crate) fn new() -> Self {
        Capture::default()
    }

    pub(crate) fn logger(&self) -> slog::Logger {
        slog::Logger::root(self.clone(), slog::o!())
    }

    pub(crate) fn with_message(&self, msg: &str) -> Vec<Entry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.msg == msg)
            .cloned()
            .collect()
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
            level: record.level(),
            msg: record.msg().to_string(),
            kv: kv.0,
        });
        Ok(())
    }
}

/// Replays scripted `waitpid` results, then reports no children forever
pub(crate) struct Scripted {
    steps: VecDeque<nix::Result<WaitStatus>>,
    pub(crate) calls: Arc<AtomicUsize>,
    pub(crate) seen: Vec<(Pid, WaitPidFlag)>,
}

impl Scripted {
    pub(crate) fn new(steps: impl IntoIterator<Item = nix::Result<WaitStatus>>) -> Self {
        Scripted {
            steps: steps.into_iter().collect(),
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Vec::new(),
        }
    }
}

impl Wait for Scripted {
    fn wait(&mut self, pid: Pid, flags: WaitPidFlag) -> nix::Result<WaitStatus> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.push((pid, flags));
        self.steps.pop_front().unwrap_or(Err(Errno::ECHILD))
    }
}
