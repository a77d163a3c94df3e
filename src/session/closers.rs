// ABOUTME: Scoped release actions for resources acquired during a proxy attempt.
// ABOUTME: Runs every registered closer exactly once, newest first, on drop.

/// Ordered set of release actions.
///
/// Closers run in reverse registration order when [`Closers::close`] is called
/// or when the set is dropped, whichever comes first. Each closer runs once.
#[derive(Default)]
pub struct Closers {
    stack: Vec<(String, Box<dyn FnOnce() + Send>)>,
}

impl Closers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a release action.
    pub fn push(&mut self, label: impl Into<String>, closer: impl FnOnce() + Send + 'static) {
        self.stack.push((label.into(), Box::new(closer)));
    }

    /// Keep `resource` alive until release, then drop it.
    pub fn hold<T: Send + 'static>(&mut self, label: impl Into<String>, resource: T) {
        self.push(label, move || drop(resource));
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Release everything registered so far.
    pub fn close(&mut self) {
        while let Some((label, closer)) = self.stack.pop() {
            tracing::debug!("releasing {}", label);
            closer();
        }
    }
}

impl Drop for Closers {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Closers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.stack.iter().map(|(label, _)| label))
            .finish()
    }
}
