//! Propagation path construction

use std::cell::RefCell;
use std::rc::Rc;

use crate::events::EventBase;
use crate::handler::CallbackHandler;
use crate::pool::ObjectPool;

/// Handlers visited by one dispatch, grouped by phase
///
/// - `trickle_down`: ancestors with trickle-down callbacks, nearest first
///   (walked in reverse, root-most first)
/// - `targets`: the leaf, then every composite root crossed on the way up
/// - `bubble_up`: ancestors with bubble-up callbacks, nearest first
#[derive(Debug, Default)]
pub struct PropagationPath {
    trickle_down: Vec<Rc<CallbackHandler>>,
    targets: Vec<Rc<CallbackHandler>>,
    bubble_up: Vec<Rc<CallbackHandler>>,
}

impl PropagationPath {
    pub fn with_capacity(depth: usize, targets: usize) -> Self {
        Self {
            trickle_down: Vec::with_capacity(depth),
            targets: Vec::with_capacity(targets),
            bubble_up: Vec::with_capacity(depth),
        }
    }

    /// Fill the path for `leaf`, replacing any previous contents
    pub fn build(&mut self, leaf: &Rc<CallbackHandler>, evt: &EventBase) {
        self.clear();
        self.targets.push(Rc::clone(leaf));

        let mut ancestor = leaf.parent();
        while let Some(node) = ancestor {
            if node.is_composite_root() && !evt.ignore_composite_roots() {
                self.targets.push(Rc::clone(&node));
            } else {
                if evt.trickles_down() && node.has_trickle_down_handlers() {
                    self.trickle_down.push(Rc::clone(&node));
                }
                if evt.bubbles() && node.has_bubble_up_handlers() {
                    self.bubble_up.push(Rc::clone(&node));
                }
            }
            ancestor = node.parent();
        }
    }

    /// Trickle-down participants, nearest ancestor first
    pub fn trickle_down_path(&self) -> &[Rc<CallbackHandler>] {
        &self.trickle_down
    }

    /// Leaf followed by crossed composite roots
    pub fn target_elements(&self) -> &[Rc<CallbackHandler>] {
        &self.targets
    }

    /// Bubble-up participants, nearest ancestor first
    pub fn bubble_up_path(&self) -> &[Rc<CallbackHandler>] {
        &self.bubble_up
    }

    /// Drop every handler reference
    pub fn clear(&mut self) {
        self.trickle_down.clear();
        self.targets.clear();
        self.bubble_up.clear();
    }
}

/// Pool of reusable paths owned by a dispatcher
#[derive(Debug)]
pub struct PathPool {
    pool: RefCell<ObjectPool<PropagationPath>>,
    depth_hint: usize,
    target_hint: usize,
}

impl PathPool {
    pub fn new(capacity: usize, depth_hint: usize, target_hint: usize) -> Self {
        Self {
            pool: RefCell::new(ObjectPool::new(capacity)),
            depth_hint,
            target_hint,
        }
    }

    /// Take a pooled path and build it for `leaf`
    pub fn build(&self, leaf: &Rc<CallbackHandler>, evt: &EventBase) -> PropagationPath {
        let mut path = self
            .pool
            .borrow_mut()
            .get_or(|| PropagationPath::with_capacity(self.depth_hint, self.target_hint));
        path.build(leaf, evt);
        tracing::trace!(
            event_id = evt.event_id(),
            trickle_down = path.trickle_down.len(),
            targets = path.targets.len(),
            bubble_up = path.bubble_up.len(),
            "Built propagation path"
        );
        path
    }

    /// Clear `path` and keep it for reuse
    pub fn release(&self, mut path: PropagationPath) {
        path.clear();
        self.pool.borrow_mut().release(path);
    }

    /// Spare paths currently held
    pub fn available(&self) -> usize {
        self.pool.borrow().len()
    }
}

impl Default for PathPool {
    fn default() -> Self {
        Self::new(16, 16, 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::EventCoordinator;
    use crate::events::{Event, EventPayload, Propagation};
    use crate::handler::{EventCallback, TrickleDown};

    #[derive(Debug, Default)]
    struct Ping;

    impl EventPayload for Ping {
        fn propagation() -> Propagation {
            Propagation::BUBBLES | Propagation::TRICKLES_DOWN
        }
    }

    fn ids(nodes: &[Rc<CallbackHandler>]) -> Vec<&str> {
        nodes.iter().map(|n| n.name()).collect()
    }

    fn listen(node: &CallbackHandler, trickle: TrickleDown) {
        node.register_callback(&EventCallback::<Ping>::new(|_| Ok(())), trickle);
    }

    #[test]
    fn test_only_listening_ancestors_are_included() {
        let coordinator = EventCoordinator::new();
        let root = coordinator.handler("root").build();
        let quiet = coordinator.handler("quiet").parent(&root).build();
        let mid = coordinator.handler("mid").parent(&quiet).build();
        let leaf = coordinator.handler("leaf").parent(&mid).build();

        listen(&root, TrickleDown::TrickleDown);
        listen(&root, TrickleDown::NoTrickleDown);
        listen(&mid, TrickleDown::NoTrickleDown);

        let evt = Event::new(Ping);
        let mut path = PropagationPath::default();
        path.build(&leaf, &evt);

        assert_eq!(ids(path.target_elements()), vec!["leaf"]);
        assert_eq!(ids(path.trickle_down_path()), vec!["root"]);
        assert_eq!(ids(path.bubble_up_path()), vec!["mid", "root"]);
    }

    #[test]
    fn test_flags_gate_lists() {
        let coordinator = EventCoordinator::new();
        let root = coordinator.handler("root").build();
        let leaf = coordinator.handler("leaf").parent(&root).build();
        listen(&root, TrickleDown::TrickleDown);
        listen(&root, TrickleDown::NoTrickleDown);

        let mut evt = Event::new(Ping);
        evt.set_trickles_down(false);
        let mut path = PropagationPath::default();
        path.build(&leaf, &evt);
        assert!(path.trickle_down_path().is_empty());
        assert_eq!(ids(path.bubble_up_path()), vec!["root"]);

        evt.set_trickles_down(true);
        evt.set_bubbles(false);
        path.build(&leaf, &evt);
        assert_eq!(ids(path.trickle_down_path()), vec!["root"]);
        assert!(path.bubble_up_path().is_empty());
    }

    #[test]
    fn test_composite_root_is_target_only() {
        let coordinator = EventCoordinator::new();
        let root = coordinator.handler("root").build();
        let composite = coordinator
            .handler("composite")
            .parent(&root)
            .composite_root(true)
            .build();
        let leaf = coordinator.handler("leaf").parent(&composite).build();

        listen(&composite, TrickleDown::TrickleDown);
        listen(&composite, TrickleDown::NoTrickleDown);
        listen(&root, TrickleDown::NoTrickleDown);

        let mut evt = Event::new(Ping);
        let mut path = PropagationPath::default();
        path.build(&leaf, &evt);
        assert_eq!(ids(path.target_elements()), vec!["leaf", "composite"]);
        assert!(path.trickle_down_path().is_empty());
        assert_eq!(ids(path.bubble_up_path()), vec!["root"]);

        evt.set_ignore_composite_roots(true);
        path.build(&leaf, &evt);
        assert_eq!(ids(path.target_elements()), vec!["leaf"]);
        assert_eq!(ids(path.trickle_down_path()), vec!["composite"]);
        assert_eq!(ids(path.bubble_up_path()), vec!["composite", "root"]);
    }

    #[test]
    fn test_pool_reuses_cleared_paths() {
        let coordinator = EventCoordinator::new();
        let root = coordinator.handler("root").build();
        let leaf = coordinator.handler("leaf").parent(&root).build();
        listen(&root, TrickleDown::NoTrickleDown);

        let pool = PathPool::new(2, 8, 2);
        let evt = Event::new(Ping);
        let path = pool.build(&leaf, &evt);
        assert_eq!(path.bubble_up_path().len(), 1);
        assert_eq!(Rc::strong_count(&root), 2);

        pool.release(path);
        assert_eq!(pool.available(), 1);
        assert_eq!(Rc::strong_count(&root), 1);
    }
}
