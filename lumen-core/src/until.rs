//! Asynchronous values. A [`Deferred`] is a single-assignment cell a
//! producer resolves later; the [`until`] directive renders a placeholder
//! and swaps in the resolved value when it arrives, unless the binding was
//! disconnected in the meantime.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::directive::{BoundPart, Directive, DirectiveResult, PartInfo, PartKind};
use crate::error::Error;
use crate::part::{ChildPart, WeakChildPart};
use crate::value::Value;

/// A value that becomes available later. Cloning shares the cell; the first
/// resolution wins and later ones are ignored.
#[derive(Clone)]
pub struct Deferred {
    inner: Rc<RefCell<DeferredState>>,
}

#[derive(Default)]
struct DeferredState {
    value: Option<Value>,
    waiters: Vec<Box<dyn FnOnce(&Value)>>,
}

impl Deferred {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(DeferredState::default())),
        }
    }

    pub fn resolve(&self, value: impl Into<Value>) {
        let value = value.into();
        let waiters = {
            let mut state = self.inner.borrow_mut();
            if state.value.is_some() {
                return;
            }
            state.value = Some(value.clone());
            std::mem::take(&mut state.waiters)
        };
        // Run waiters outside the borrow; they may commit into the DOM or
        // resolve other deferreds.
        for waiter in waiters {
            waiter(&value);
        }
    }

    pub fn value(&self) -> Option<Value> {
        self.inner.borrow().value.clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.borrow().value.is_some()
    }

    /// Registers a callback invoked with the resolved value. Fires
    /// immediately if the cell is already resolved.
    pub fn subscribe(&self, waiter: impl FnOnce(&Value) + 'static) {
        let resolved = self.inner.borrow().value.clone();
        match resolved {
            Some(value) => waiter(&value),
            None => self.inner.borrow_mut().waiters.push(Box::new(waiter)),
        }
    }

    fn same(a: &Deferred, b: &Deferred) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }
}

impl Default for Deferred {
    fn default() -> Self {
        Self::new()
    }
}

/// Invalidation epoch for a directive's outstanding async work. Each
/// disconnect bumps the epoch, which invalidates every token handed out
/// before it; reconnecting does not revive them.
pub struct ConnectionGuard {
    epoch: Rc<Cell<u64>>,
    connected: bool,
}

impl ConnectionGuard {
    pub fn new() -> Self {
        Self {
            epoch: Rc::new(Cell::new(0)),
            connected: true,
        }
    }

    pub fn token(&self) -> AsyncToken {
        AsyncToken {
            seen: self.epoch.get(),
            epoch: self.epoch.clone(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn set_connected(&mut self, connected: bool) {
        if self.connected && !connected {
            self.invalidate();
        }
        self.connected = connected;
    }

    /// Invalidates every outstanding token without changing connectivity.
    /// Directives call this when the work a token was minted for has been
    /// superseded, so the binding cannot be written by a stale producer.
    pub fn invalidate(&self) {
        self.epoch.set(self.epoch.get() + 1);
    }
}

impl Default for ConnectionGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Capability to commit one late value, valid only while the epoch it was
/// minted under still stands.
#[derive(Clone)]
pub struct AsyncToken {
    seen: u64,
    epoch: Rc<Cell<u64>>,
}

impl AsyncToken {
    pub fn is_live(&self) -> bool {
        self.epoch.get() == self.seen
    }
}

/// A deferred write into a child binding. Holds the binding weakly; setting
/// is a no-op once the token is stale or the binding is gone.
pub struct PartSetter {
    part: WeakChildPart,
    token: AsyncToken,
}

impl PartSetter {
    pub fn new(part: &ChildPart, token: AsyncToken) -> Self {
        Self {
            part: part.downgrade(),
            token,
        }
    }

    pub(crate) fn from_weak(part: WeakChildPart, token: AsyncToken) -> Self {
        Self { part, token }
    }

    /// Commits `value` if the token is still live and the binding still
    /// exists. Returns whether the commit happened.
    pub fn set(&self, value: Value) -> Result<bool, Error> {
        if !self.token.is_live() {
            log::trace!("dropping stale async value");
            return Ok(false);
        }
        let Some(part) = self.part.upgrade() else {
            return Ok(false);
        };
        // A late plain value must not run through directive resolution: the
        // binding's live directive stays in place across async commits.
        part.commit_resolved(value)?;
        Ok(true)
    }
}

/// Renders `placeholder` until `pending` resolves, then commits the
/// resolved value. Only valid in child bindings. A resolution arriving
/// after the binding's subtree was disconnected is dropped, even if the
/// subtree reconnects later; the value shows up on the next render instead.
/// A resolution of a deferred that a later render replaced is dropped too;
/// the binding belongs to the current deferred.
pub fn until(pending: &Deferred, placeholder: impl Into<Value>) -> Value {
    Value::Directive(DirectiveResult::new(
        "until",
        |info: &PartInfo| {
            if info.kind != PartKind::Child {
                return Err(Error::InvalidPartKind {
                    directive: "until",
                    kind: info.kind,
                });
            }
            Ok(UntilDirective {
                guard: ConnectionGuard::new(),
                waiting: None,
                part: None,
            })
        },
        vec![Value::Deferred(pending.clone()), placeholder.into()],
    ))
}

struct UntilDirective {
    guard: ConnectionGuard,
    waiting: Option<Deferred>,
    part: Option<WeakChildPart>,
}

impl UntilDirective {
    fn watch(&self, deferred: &Deferred) {
        let Some(part) = self.part.clone() else { return };
        let setter = PartSetter::from_weak(part, self.guard.token());
        deferred.subscribe(move |value| {
            if let Err(err) = setter.set(value.clone()) {
                log::warn!("late value could not be committed: {err}");
            }
        });
    }
}

impl Directive for UntilDirective {
    fn update(&mut self, part: BoundPart<'_>, args: &[Value]) -> Result<Value, Error> {
        let BoundPart::Child(child) = part else {
            return Err(Error::InvalidPartKind {
                directive: "until",
                kind: PartKind::Child,
            });
        };
        let deferred = match args.first() {
            Some(Value::Deferred(d)) => d.clone(),
            _ => {
                return Err(Error::Directive(
                    "until expects a deferred value".to_string(),
                ));
            }
        };
        self.part = Some(child.downgrade());

        if let Some(value) = deferred.value() {
            // A subscription for an earlier deferred must not fire into this
            // binding anymore.
            if self.waiting.take().is_some() {
                self.guard.invalidate();
            }
            return Ok(value);
        }
        match &self.waiting {
            Some(w) if Deferred::same(w, &deferred) => return Ok(Value::NoChange),
            // Watching something else: its token dies with the switch, so a
            // late resolution of the replaced deferred is dropped.
            Some(_) => self.guard.invalidate(),
            None => {}
        }
        self.waiting = Some(deferred.clone());
        self.watch(&deferred);
        Ok(args.get(1).cloned().unwrap_or(Value::Nothing))
    }

    fn set_connected(&mut self, connected: bool) {
        self.guard.set_connected(connected);
        if connected {
            // Still-pending work needs a fresh token; anything that resolved
            // while disconnected stays dropped until the next render.
            if let Some(deferred) = self.waiting.clone() {
                if !deferred.is_resolved() {
                    self.watch(&deferred);
                }
            }
        }
    }
}
