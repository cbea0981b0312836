use crate::core::audio_buffer::AudioBlock;
use crate::core::process_spec::ProcessSpec;
use crate::error::{Error, InternalError, Result};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// The core trait for all audio processing units.
///
/// A plugin processes audio in place: it reads its input from the block it is
/// given and writes its output back into the same block.
pub trait Plugin: Send {
    /// Allocates whatever the plugin needs for `spec`.
    ///
    /// Calling this again with an unchanged spec must not reallocate.
    fn prepare(&mut self, spec: &ProcessSpec) -> Result<()>;

    /// Processes one block in place.
    ///
    /// Consumes all `block.num_samples()` input samples and returns how many
    /// valid output samples were produced. Those samples are right-aligned: if
    /// fewer samples were produced than consumed, they occupy the end of the
    /// block.
    fn process(&mut self, block: &mut AudioBlock<'_>) -> Result<usize>;

    /// Clears delay lines and buffered audio without deallocating.
    ///
    /// Composites fail here only if a nested plugin cannot be entered.
    fn reset(&mut self) -> Result<()> {
        Ok(())
    }

    /// Upper bound on the output delay this plugin introduces, in samples.
    ///
    /// Only meaningful after `prepare()`.
    fn latency_hint(&self) -> Result<usize> {
        Ok(0)
    }

    /// Plugins nested directly inside this one.
    fn children(&self) -> Vec<PluginHandle> {
        Vec::new()
    }

    /// Returns the name of the plugin.
    fn name(&self) -> &str {
        "Plugin"
    }

    /// Returns an ASCII visualization of the plugin structure.
    fn visualize(&self, indent: usize) -> String {
        #[cfg(feature = "debug_visualize")]
        {
            let spaces = " ".repeat(indent);
            format!("{}{}\n", spaces, self.name())
        }
        #[cfg(not(feature = "debug_visualize"))]
        {
            let _ = indent;
            String::new()
        }
    }
}

impl<T: Plugin + ?Sized> Plugin for Box<T> {
    fn prepare(&mut self, spec: &ProcessSpec) -> Result<()> {
        (**self).prepare(spec)
    }

    fn process(&mut self, block: &mut AudioBlock<'_>) -> Result<usize> {
        (**self).process(block)
    }

    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }

    fn latency_hint(&self) -> Result<usize> {
        (**self).latency_hint()
    }

    fn children(&self) -> Vec<PluginHandle> {
        (**self).children()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn visualize(&self, indent: usize) -> String {
        (**self).visualize(indent)
    }
}

type PluginCell = ReentrantMutex<RefCell<Box<dyn Plugin>>>;

/// Shared ownership of a plugin together with its lock.
///
/// The lock is re-entrant: a thread that already holds it (for example the
/// offline renderer, which locks every plugin up front) can enter the plugin
/// again from a composite. Other threads block on [`lock`](Self::lock) or
/// fail on [`try_lock`](Self::try_lock).
#[derive(Clone)]
pub struct PluginHandle {
    inner: Arc<PluginCell>,
}

impl PluginHandle {
    pub fn new(plugin: impl Plugin + 'static) -> Self {
        PluginHandle::from_box(Box::new(plugin))
    }

    pub fn from_box(plugin: Box<dyn Plugin>) -> Self {
        PluginHandle {
            inner: Arc::new(ReentrantMutex::new(RefCell::new(plugin))),
        }
    }

    /// Identity of the shared instance; equal for every clone of a handle.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &PluginHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Blocks until this thread owns the plugin's lock.
    pub fn lock(&self) -> PluginGuard<'_> {
        PluginGuard {
            id: self.id(),
            guard: self.inner.lock(),
        }
    }

    /// Takes the lock only if nobody else holds it.
    pub fn try_lock(&self) -> Option<PluginGuard<'_>> {
        let id = self.id();
        self.inner.try_lock().map(|guard| PluginGuard { id, guard })
    }

    /// Locks the plugin and runs `f` on it.
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn Plugin) -> R) -> Result<R> {
        self.lock().with(f)
    }

    pub fn prepare(&self, spec: &ProcessSpec) -> Result<()> {
        self.with(|p| p.prepare(spec))?
    }

    pub fn reset(&self) -> Result<()> {
        self.with(|p| p.reset())?
    }

    pub fn latency_hint(&self) -> Result<usize> {
        self.with(|p| p.latency_hint())?
    }

    pub fn name(&self) -> String {
        self.with(|p| String::from(p.name()))
            .unwrap_or_else(|_| format!("plugin#{:x}", self.id()))
    }

    /// Every plugin nested inside this one, depth first.
    ///
    /// Fails with [`Error::DuplicatePlugin`] if any instance is reachable
    /// twice, which also rules out cycles.
    pub fn descendants(&self) -> Result<Vec<PluginHandle>> {
        let mut seen = HashSet::new();
        seen.insert(self.id());
        let mut found = Vec::new();
        let children = self.with(|p| p.children())?;
        collect_distinct(children.iter(), &mut seen, &mut found)?;
        Ok(found)
    }
}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PluginHandle(#{:x})", self.id())
    }
}

/// Proof that the current thread holds a plugin's lock.
pub struct PluginGuard<'a> {
    id: usize,
    guard: ReentrantMutexGuard<'a, RefCell<Box<dyn Plugin>>>,
}

impl PluginGuard<'_> {
    /// Runs `f` with exclusive access to the plugin.
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn Plugin) -> R) -> Result<R> {
        let mut plugin = self.guard.try_borrow_mut().map_err(|_| {
            Error::from(InternalError::ReentrantAccess {
                plugin: format!("plugin#{:x}", self.id),
            })
        })?;
        Ok(f(&mut **plugin))
    }
}

/// Flattens a list of optional plugins and everything nested in them into a
/// list of distinct handles.
pub fn distinct_plugins(units: &[Option<PluginHandle>]) -> Result<Vec<PluginHandle>> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    collect_distinct(units.iter().flatten(), &mut seen, &mut found)?;
    Ok(found)
}

fn collect_distinct<'a>(
    handles: impl Iterator<Item = &'a PluginHandle>,
    seen: &mut HashSet<usize>,
    found: &mut Vec<PluginHandle>,
) -> Result<()> {
    for handle in handles {
        if !seen.insert(handle.id()) {
            return Err(Error::DuplicatePlugin {
                name: handle.name(),
            });
        }
        found.push(handle.clone());
        let children = handle.with(|p| p.children())?;
        collect_distinct(children.iter(), seen, found)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::utility::passthrough::Passthrough;
    use std::sync::mpsc;
    use std::thread;

    struct Parent(Vec<PluginHandle>);

    impl Plugin for Parent {
        fn prepare(&mut self, _spec: &ProcessSpec) -> Result<()> {
            Ok(())
        }

        fn process(&mut self, block: &mut AudioBlock<'_>) -> Result<usize> {
            Ok(block.num_samples())
        }

        fn children(&self) -> Vec<PluginHandle> {
            self.0.clone()
        }
    }

    #[test]
    fn test_identity_is_shared_between_clones() {
        let a = PluginHandle::new(Passthrough::new());
        let b = a.clone();
        let c = PluginHandle::new(Passthrough::new());
        assert_eq!(a.id(), b.id());
        assert!(a.ptr_eq(&b));
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_descendants_are_depth_first() {
        let leaf1 = PluginHandle::new(Passthrough::new());
        let leaf2 = PluginHandle::new(Passthrough::new());
        let inner = PluginHandle::new(Parent(vec![leaf1.clone()]));
        let root = PluginHandle::new(Parent(vec![inner.clone(), leaf2.clone()]));

        let ids: Vec<usize> = root.descendants().unwrap().iter().map(|h| h.id()).collect();
        assert_eq!(ids, vec![inner.id(), leaf1.id(), leaf2.id()]);
    }

    #[test]
    fn test_shared_instance_is_rejected() {
        let shared = PluginHandle::new(Passthrough::new());
        let units = vec![Some(shared.clone()), None, Some(shared)];
        let err = distinct_plugins(&units).unwrap_err();
        assert!(matches!(err, Error::DuplicatePlugin { .. }));
        assert!(!err.is_internal());
    }

    #[test]
    fn test_nested_duplicate_is_rejected() {
        let shared = PluginHandle::new(Passthrough::new());
        let parent = PluginHandle::new(Parent(vec![shared.clone()]));
        let err = distinct_plugins(&[Some(parent), Some(shared)]).unwrap_err();
        assert!(matches!(err, Error::DuplicatePlugin { .. }));
    }

    #[test]
    fn test_lock_is_reentrant_on_same_thread() {
        let handle = PluginHandle::new(Passthrough::new());
        let _outer = handle.lock();
        assert!(handle.try_lock().is_some());
        assert_eq!(handle.latency_hint().unwrap(), 0);
    }

    #[test]
    fn test_try_lock_fails_while_held_elsewhere() {
        let handle = PluginHandle::new(Passthrough::new());
        let (locked_tx, locked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let remote = handle.clone();
        let worker = thread::spawn(move || {
            let _guard = remote.lock();
            locked_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        });

        locked_rx.recv().unwrap();
        assert!(handle.try_lock().is_none());
        release_tx.send(()).unwrap();
        worker.join().unwrap();
        assert!(handle.try_lock().is_some());
    }

    #[test]
    fn test_nested_borrow_is_an_internal_error() {
        let handle = PluginHandle::new(Passthrough::new());
        let inner = handle.clone();
        let result = handle.with(|_| inner.with(|_| ())).unwrap();
        assert!(result.unwrap_err().is_internal());
    }
}
