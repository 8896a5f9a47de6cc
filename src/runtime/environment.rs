use crate::language::span::Span;
use crate::runtime::{
    error::{RuntimeError, RuntimeResult},
    value::{Function, Value},
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::debug;

#[derive(Default)]
pub struct Frame {
    bindings: HashMap<String, Value>,
    parent: Option<Env>,
}

impl Frame {
    /// Frames this frame holds strong references to.
    fn references(&self) -> impl Iterator<Item = &Env> {
        let closures = self.bindings.values().filter_map(|value| match value {
            Value::Function(Function::Closure(closure)) => Some(&closure.env),
            _ => None,
        });
        self.parent.iter().chain(closures)
    }
}

/// Shared handle to one scope frame. Cloning shares the frame.
#[derive(Clone)]
pub struct Env(Rc<RefCell<Frame>>);

impl Env {
    pub fn ptr_eq(&self, other: &Env) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn parent(&self) -> Option<Env> {
        self.0.borrow().parent.clone()
    }

    /// Inserts or overwrites a binding in this frame only.
    pub fn define(&self, name: &str, value: Value) {
        self.0.borrow_mut().bindings.insert(name.to_string(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.borrow().bindings.contains_key(name)
    }

    pub fn get_at(&self, distance: usize, name: &str, span: Span) -> RuntimeResult<Value> {
        let frame = self.ancestor(distance, span)?;
        let value = frame.0.borrow().bindings.get(name).cloned();
        value.ok_or_else(|| {
            RuntimeError::internal(
                format!("`{name}` is not bound {distance} frame(s) up"),
                Some(span),
            )
        })
    }

    pub fn assign_at(
        &self,
        distance: usize,
        name: &str,
        value: Value,
        span: Span,
    ) -> RuntimeResult<()> {
        let frame = self.ancestor(distance, span)?;
        let mut inner = frame.0.borrow_mut();
        match inner.bindings.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(RuntimeError::internal(
                format!("cannot assign `{name}`: not bound {distance} frame(s) up"),
                Some(span),
            )),
        }
    }

    /// Lookup in this frame alone; misses are user errors.
    pub fn get_global(&self, name: &str, span: Span) -> RuntimeResult<Value> {
        let value = self.0.borrow().bindings.get(name).cloned();
        value.ok_or_else(|| RuntimeError::UndefinedVariable {
            name: name.to_string(),
            span,
        })
    }

    /// Assigning an absent global defines it.
    pub fn assign_global(&self, name: &str, value: Value) {
        self.define(name, value);
    }

    fn ancestor(&self, distance: usize, span: Span) -> RuntimeResult<Env> {
        let mut frame = self.clone();
        for hop in 0..distance {
            frame = frame.parent().ok_or_else(|| {
                RuntimeError::internal(
                    format!("frame chain ended after {hop} of {distance} hop(s)"),
                    Some(span),
                )
            })?;
        }
        Ok(frame)
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(frame) => f
                .debug_struct("Env")
                .field("bindings", &frame.bindings.len())
                .field("has_parent", &frame.parent.is_some())
                .finish(),
            Err(_) => f.write_str("Env(<borrowed>)"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub scanned: usize,
    pub freed: usize,
}

/// Allocates frames and reclaims the ones kept alive only by cycles.
///
/// Every frame is tracked weakly. A collection subtracts the references frames
/// hold to one another (parent links and captured closure frames) from their
/// strong counts; whatever is left over is held from outside the heap, so
/// those frames are roots. Frames not reachable from a root have their
/// bindings cleared, which breaks the cycle and lets `Rc` free them.
pub struct Heap {
    frames: Vec<Weak<RefCell<Frame>>>,
    threshold: usize,
    min_threshold: usize,
}

impl Heap {
    pub fn new(threshold: usize) -> Self {
        let min_threshold = threshold.max(1);
        Self {
            frames: Vec::new(),
            threshold: min_threshold,
            min_threshold,
        }
    }

    pub fn root(&mut self) -> Env {
        self.allocate(None)
    }

    pub fn child(&mut self, parent: &Env) -> Env {
        self.allocate(Some(parent.clone()))
    }

    fn allocate(&mut self, parent: Option<Env>) -> Env {
        if self.frames.len() >= self.threshold {
            self.collect();
        }
        let frame = Rc::new(RefCell::new(Frame {
            bindings: HashMap::new(),
            parent,
        }));
        self.frames.push(Rc::downgrade(&frame));
        Env(frame)
    }

    /// Number of frames still alive.
    pub fn live(&mut self) -> usize {
        self.prune();
        self.frames.len()
    }

    pub fn collect(&mut self) -> CollectStats {
        self.prune();
        let live: Vec<Rc<RefCell<Frame>>> = self.frames.iter().filter_map(Weak::upgrade).collect();
        let index: HashMap<*const RefCell<Frame>, usize> = live
            .iter()
            .enumerate()
            .map(|(idx, frame)| (Rc::as_ptr(frame), idx))
            .collect();

        // One strong count per frame belongs to `live` itself.
        let mut external: Vec<usize> = live
            .iter()
            .map(|frame| Rc::strong_count(frame) - 1)
            .collect();
        for frame in &live {
            for target in frame.borrow().references() {
                if let Some(&idx) = index.get(&Rc::as_ptr(&target.0)) {
                    external[idx] = external[idx].saturating_sub(1);
                }
            }
        }

        let mut reachable = vec![false; live.len()];
        let mut pending: Vec<usize> = (0..live.len()).filter(|&idx| external[idx] > 0).collect();
        while let Some(idx) = pending.pop() {
            if reachable[idx] {
                continue;
            }
            reachable[idx] = true;
            for target in live[idx].borrow().references() {
                if let Some(&next) = index.get(&Rc::as_ptr(&target.0)) {
                    if !reachable[next] {
                        pending.push(next);
                    }
                }
            }
        }

        let mut garbage = Vec::new();
        for (frame, _) in live.iter().zip(&reachable).filter(|(_, alive)| !**alive) {
            let mut inner = frame.borrow_mut();
            garbage.push(std::mem::take(&mut *inner));
        }
        let stats = CollectStats {
            scanned: live.len(),
            freed: garbage.len(),
        };
        drop(garbage);
        drop(live);

        self.prune();
        self.threshold = self.min_threshold.max(self.frames.len() * 2);
        debug!(
            scanned = stats.scanned,
            freed = stats.freed,
            next_threshold = self.threshold,
            "frame collection"
        );
        stats
    }

    /// Empties every frame still alive, releasing all cycles at once.
    pub fn clear(&mut self) {
        let live: Vec<Rc<RefCell<Frame>>> = self.frames.iter().filter_map(Weak::upgrade).collect();
        let garbage: Vec<Frame> = live
            .iter()
            .map(|frame| std::mem::take(&mut *frame.borrow_mut()))
            .collect();
        drop(garbage);
        drop(live);
        self.frames.clear();
    }

    fn prune(&mut self) {
        self.frames.retain(|frame| frame.strong_count() > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{ast::FunDecl, ast::Block, ast::Identifier};
    use crate::runtime::value::Closure;
    use pretty_assertions::assert_eq;

    fn span() -> Span {
        Span::new(0, 1, 1)
    }

    fn closure_over(env: &Env) -> Value {
        let decl = FunDecl {
            name: Identifier {
                name: "f".into(),
                span: span(),
            },
            params: Vec::new(),
            body: Block {
                statements: Vec::new(),
                span: span(),
            },
            span: span(),
        };
        Value::Function(Function::Closure(Closure::new(Rc::new(decl), env.clone())))
    }

    #[test]
    fn walks_exact_distance() {
        let mut heap = Heap::new(64);
        let global = heap.root();
        let outer = heap.child(&global);
        let inner = heap.child(&outer);
        outer.define("x", Value::Int(1));
        inner.define("x", Value::Int(2));
        assert_eq!(inner.get_at(0, "x", span()).unwrap(), Value::Int(2));
        assert_eq!(inner.get_at(1, "x", span()).unwrap(), Value::Int(1));
        inner.assign_at(1, "x", Value::Int(5), span()).unwrap();
        assert_eq!(outer.get_at(0, "x", span()).unwrap(), Value::Int(5));
    }

    #[test]
    fn distance_mismatch_is_internal() {
        let mut heap = Heap::new(64);
        let global = heap.root();
        let inner = heap.child(&global);
        let err = inner.get_at(0, "missing", span()).unwrap_err();
        assert!(err.is_internal());
        let err = inner.get_at(5, "missing", span()).unwrap_err();
        assert!(err.is_internal());
        let err = inner
            .assign_at(0, "missing", Value::Nil, span())
            .unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn globals_define_on_assignment() {
        let mut heap = Heap::new(64);
        let global = heap.root();
        assert!(matches!(
            global.get_global("g", span()),
            Err(RuntimeError::UndefinedVariable { .. })
        ));
        global.assign_global("g", Value::Bool(true));
        assert_eq!(global.get_global("g", span()).unwrap(), Value::Bool(true));
    }

    #[test]
    fn acyclic_frames_free_on_drop() {
        let mut heap = Heap::new(64);
        let global = heap.root();
        {
            let block = heap.child(&global);
            block.define("n", Value::Int(1));
            assert_eq!(heap.live(), 2);
        }
        assert_eq!(heap.live(), 1);
    }

    #[test]
    fn collects_closure_cycles() {
        let mut heap = Heap::new(64);
        let global = heap.root();
        {
            let block = heap.child(&global);
            let function = closure_over(&block);
            block.define("f", function);
        }
        assert_eq!(heap.live(), 2);
        let stats = heap.collect();
        assert_eq!(stats.freed, 1);
        assert_eq!(heap.live(), 1);
    }

    #[test]
    fn keeps_cycles_reachable_from_outside() {
        let mut heap = Heap::new(64);
        let global = heap.root();
        let block = heap.child(&global);
        block.define("f", closure_over(&block));
        global.define("g", closure_over(&block));
        let stats = heap.collect();
        assert_eq!(stats.freed, 0);
        drop(block);
        assert_eq!(heap.collect().freed, 0);
        assert!(global.contains("g"));
        global.define("g", Value::Nil);
        assert_eq!(heap.collect().freed, 1);
        assert_eq!(heap.live(), 1);
    }

    #[test]
    fn allocation_past_threshold_triggers_collection() {
        let mut heap = Heap::new(4);
        let global = heap.root();
        for _ in 0..16 {
            let block = heap.child(&global);
            block.define("f", closure_over(&block));
        }
        assert!(heap.live() <= 5);
    }

    #[test]
    fn clear_releases_everything() {
        let mut heap = Heap::new(64);
        let global = heap.root();
        let block = heap.child(&global);
        block.define("f", closure_over(&block));
        drop(block);
        drop(global);
        heap.clear();
        assert_eq!(heap.live(), 0);
    }
}
