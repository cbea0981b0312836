//! Real-time processing.
//!
//! The audio thread must never wait. [`LiveProcessor`] therefore only ever
//! *tries* to take locks: a new plugin list is picked up when the staging
//! slot is free, and a plugin is skipped for that block if another thread
//! holds it, or holds anything nested inside it (for example while it is
//! being re-prepared).
//!
//! The set of nested plugins is captured when a list is submitted. Changing
//! a composite's children afterwards needs a fresh `submit()`.
//!
//! Plugin lists are built and prepared off the audio thread by a
//! [`LiveGraph`], optionally driven by a background watcher.

use crate::core::audio_buffer::AudioBuffer;
use crate::core::engine::{self, Acquire};
use crate::core::plugin::{distinct_plugins, PluginHandle};
use crate::core::process_spec::ProcessSpec;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

type UnitList = Vec<Option<PluginHandle>>;

/// A submitted list together with the lock set of each unit.
#[derive(Default)]
struct LiveList {
    units: UnitList,
    /// `lock_sets[i]` is `units[i]` and everything nested in it, sorted by
    /// identity. Empty for `None` slots.
    lock_sets: Vec<Vec<PluginHandle>>,
}

impl LiveList {
    fn new(units: UnitList) -> Result<Self> {
        let mut lock_sets = Vec::with_capacity(units.len());
        for slot in &units {
            let mut set = Vec::new();
            if let Some(unit) = slot {
                set.push(unit.clone());
                set.extend(unit.descendants()?);
                set.sort_by_key(PluginHandle::id);
            }
            lock_sets.push(set);
        }
        Ok(LiveList { units, lock_sets })
    }
}

#[derive(Default)]
struct Staging {
    pending: Option<LiveList>,
    /// Lists the audio thread is done with. Dropped by the next `submit()`.
    retired: Vec<LiveList>,
}

struct Shared {
    spec: ProcessSpec,
    staging: Mutex<Staging>,
}

/// The control side of a live processing graph.
///
/// Cheap to clone; every clone stages into the same [`LiveProcessor`].
#[derive(Clone)]
pub struct LiveGraph {
    shared: Arc<Shared>,
}

impl LiveGraph {
    /// Creates a graph and the processor that renders it.
    ///
    /// Hand the processor to the audio callback; keep the graph.
    pub fn new(spec: ProcessSpec) -> Result<(LiveGraph, LiveProcessor)> {
        spec.validate()?;
        let shared = Arc::new(Shared {
            spec,
            staging: Mutex::new(Staging::default()),
        });
        let processor = LiveProcessor {
            shared: Arc::clone(&shared),
            list: LiveList::default(),
            skipped_units: 0,
        };
        Ok((LiveGraph { shared }, processor))
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.shared.spec
    }

    /// Prepares `units` and hands them to the processor, which switches over
    /// at the start of its next block.
    ///
    /// May block while plugins are prepared. Never call it from the audio
    /// thread.
    pub fn submit(&self, units: UnitList) -> Result<()> {
        distinct_plugins(&units)?;
        for unit in units.iter().flatten() {
            unit.prepare(&self.shared.spec)?;
        }
        let list = LiveList::new(units)?;

        let (replaced, retired) = {
            let mut staging = self.shared.staging.lock();
            let replaced = staging.pending.replace(list);
            let retired = mem::take(&mut staging.retired);
            // Room for the list the processor is about to retire, so it never
            // allocates.
            staging.retired.reserve(1);
            (replaced, retired)
        };

        if replaced.is_some() {
            debug!("replaced a plugin list the processor never picked up");
        }
        drop(replaced);
        drop(retired);
        Ok(())
    }

    /// Starts a background thread that calls `poll` every `interval` and
    /// submits whatever list it returns.
    pub fn spawn_watcher<F>(&self, interval: Duration, mut poll: F) -> Result<WatcherHandle>
    where
        F: FnMut() -> Option<UnitList> + Send + 'static,
    {
        if interval.is_zero() {
            return Err(Error::invalid("interval", "must be greater than zero"));
        }

        let graph = self.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let thread = thread::Builder::new()
            .name("blockdsp-watcher".into())
            .spawn(move || {
                info!(?interval, "plugin list watcher started");
                while !stop_flag.load(Ordering::Acquire) {
                    if let Some(units) = poll() {
                        if let Err(e) = graph.submit(units) {
                            warn!(error = %e, "failed to submit plugin list");
                        }
                    }
                    thread::park_timeout(interval);
                }
                info!("plugin list watcher stopped");
            })
            .map_err(|e| Error::invalid("watcher", format!("failed to spawn thread: {e}")))?;

        Ok(WatcherHandle {
            stop,
            thread: Some(thread),
        })
    }
}

/// Stops the watcher thread when asked to, or when dropped.
pub struct WatcherHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    /// Stops the watcher and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            if thread.join().is_err() {
                warn!("plugin list watcher panicked");
            }
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The audio-thread side of a live processing graph.
pub struct LiveProcessor {
    shared: Arc<Shared>,
    list: LiveList,
    skipped_units: u64,
}

impl LiveProcessor {
    /// Processes one block in place without blocking.
    ///
    /// `buffer` must match the graph's channel count. Output stays
    /// right-aligned: the returned count of valid samples ends at
    /// `buffer.num_samples()` and everything before it is silence.
    pub fn process(&mut self, buffer: &mut AudioBuffer) -> Result<usize> {
        self.pick_up_staged();

        let n = buffer.num_samples();
        let pass = engine::run(
            buffer,
            &self.shared.spec,
            &self.list.units,
            false,
            Acquire::SkipBusy(&self.list.lock_sets),
        )?;
        self.skipped_units += pass.skipped as u64;

        let padding = n - pass.valid;
        if padding > 0 {
            for c in 0..buffer.num_channels() {
                buffer.channel_mut(c)[..padding].fill(0.0);
            }
        }
        Ok(pass.valid)
    }

    fn pick_up_staged(&mut self) {
        if let Some(mut staging) = self.shared.staging.try_lock() {
            if let Some(list) = staging.pending.take() {
                let old = mem::replace(&mut self.list, list);
                staging.retired.push(old);
            }
        }
    }

    /// How many times a unit was left out because it, or something nested
    /// in it, was busy.
    pub fn skipped_units(&self) -> u64 {
        self.skipped_units
    }

    /// The list currently being rendered.
    pub fn units(&self) -> &[Option<PluginHandle>] {
        &self.list.units
    }
}
