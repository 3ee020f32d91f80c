use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

mod chain;
mod event;
mod flags;
mod pool;
mod target;

pub use event::{DomEvent, DomEventKind, Event, EventCategory, NO_MESSAGE, create_event};
pub use flags::{EventFlags, PhaseMask};
pub use target::{
    DispatchCallback, EventTarget, ListenerRegistry, PostVisitor, PreVisitor, TargetId,
};

pub(crate) use chain::{
    ChainItem, build_chain_above, chain_pre_handle, collect_chain_targets, free_chain,
    handle_event_target_chain,
};
pub(crate) use flags::ChainFlags;
pub(crate) use pool::{CHAIN_POOL_CAPACITY, ChainPool, ItemId, PoolGuard};
pub(crate) use target::resolve_chain_target;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    DispatchInProgress,
    MessageAlreadyResolved,
    CannotHandle,
    OutOfMemory,
    UnsupportedEventType(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DispatchInProgress => {
                write!(f, "dispatch already in progress for this event")
            }
            Self::MessageAlreadyResolved => {
                write!(f, "target enumeration requires an unresolved event message")
            }
            Self::CannotHandle => write!(f, "event target cannot handle this event"),
            Self::OutOfMemory => write!(f, "chain item pool allocation failed"),
            Self::UnsupportedEventType(name) => write!(f, "unsupported event type: {name}"),
        }
    }
}

impl StdError for Error {}

/// Outcome of a dispatch as observed by handlers: untouched, consumed
/// with the default action suppressed, or consumed with the default
/// action still wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventStatus {
    #[default]
    Ignore,
    ConsumeNoDefault,
    ConsumeDoDefault,
}

/// Builds the event target chain for a dispatch and walks it through the
/// capture, target and bubble phases, once per event group. Handlers may
/// re-enter the dispatcher with a different event; re-entry with the same
/// event object is rejected.
pub struct EventDispatcher {
    pool: ChainPool,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    const DISPATCH_STACK_RED_ZONE: usize = 64 * 1024;
    const DISPATCH_STACK_SIZE: usize = 32 * 1024 * 1024;

    pub fn new() -> Self {
        Self {
            pool: ChainPool::new(),
        }
    }

    /// Dispatch `event` starting at `target`. When `targets_out` is
    /// supplied the chain is only enumerated, leaf to root, and no
    /// handler fires; the event must not carry a resolved message in
    /// that mode.
    #[allow(clippy::too_many_arguments)]
    pub fn dispatch(
        &self,
        target: Rc<dyn EventTarget>,
        context: Option<&mut dyn Any>,
        event: &mut Event,
        dom_event: Option<&mut DomEvent>,
        status: Option<&mut EventStatus>,
        callback: Option<&mut dyn DispatchCallback>,
        targets_out: Option<&mut Vec<Rc<dyn EventTarget>>>,
    ) -> Result<()> {
        // Handlers can keep nesting dispatches; grow the stack instead of
        // overflowing it.
        stacker::maybe_grow(
            Self::DISPATCH_STACK_RED_ZONE,
            Self::DISPATCH_STACK_SIZE,
            || {
                self.dispatch_impl(
                    target,
                    context,
                    event,
                    dom_event,
                    status,
                    callback,
                    targets_out,
                )
            },
        )
    }

    /// Entry point for events that already went through a dispatch or
    /// arrive from script: recycled events get fresh targets, and events
    /// that are not already trusted take their trust from the caller.
    pub fn dispatch_dom_event(
        &self,
        target: Rc<dyn EventTarget>,
        context: Option<&mut dyn Any>,
        event: &mut Event,
        dom_event: Option<&mut DomEvent>,
        caller_trusted: bool,
        status: Option<&mut EventStatus>,
    ) -> Result<()> {
        let mut keep_trusted = false;
        if event.flags.contains(EventFlags::DISPATCHED) {
            event.target = None;
            event.original_target = None;
        } else {
            keep_trusted = event.is_trusted();
        }
        if !keep_trusted {
            event.flags.set(EventFlags::TRUSTED, caller_trusted);
        }
        self.dispatch(target, context, event, dom_event, status, None, None)
    }

    /// Drop the cached chain arena, provided no dispatch is on the stack.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch_impl(
        &self,
        target: Rc<dyn EventTarget>,
        context: Option<&mut dyn Any>,
        event: &mut Event,
        mut dom_event: Option<&mut DomEvent>,
        status: Option<&mut EventStatus>,
        callback: Option<&mut dyn DispatchCallback>,
        targets_out: Option<&mut Vec<Rc<dyn EventTarget>>>,
    ) -> Result<()> {
        if event.is_dispatching() {
            return Err(Error::DispatchInProgress);
        }
        if targets_out.is_some() && event.message != NO_MESSAGE {
            return Err(Error::MessageAlreadyResolved);
        }

        let mut chain_origin = target;
        if event.flags.contains(EventFlags::ONLY_PRIVILEGED_DISPATCH)
            && !chain_origin.is_privileged()
        {
            let Some(handler) = chain_origin.privileged_handler() else {
                // Nothing privileged to deliver to.
                return Ok(());
            };
            // The original object stays the event target; the chain itself
            // starts at the privileged handler.
            event.target = Some(Rc::clone(&chain_origin));
            chain_origin = handler;
        }

        tracing::debug!(msg = event.message, category = ?event.category, "dispatching event");

        let guard = self.pool.acquire()?;
        let leaf = guard.alloc(ChainItem::new(chain_origin))?;

        match event.target.take() {
            None => event.target = Some(guard.with_item(leaf, |item| Rc::clone(&item.target))),
            // Events delivered to one object but aimed at another keep the
            // caller-chosen target, resolved like any chain target.
            Some(preset) => event.target = Some(resolve_chain_target(&preset)),
        }
        event.original_target = event.target.clone();
        let original_is_anonymous = event
            .original_target
            .as_ref()
            .is_some_and(|t| t.in_anonymous_subtree());

        event.flags.insert(EventFlags::DISPATCHING);

        if let Some(dom_event) = dom_event.as_deref_mut() {
            dom_event.target = event.target.clone();
            dom_event.original_target = event.original_target.clone();
            dom_event.trusted = event.flags.contains(EventFlags::TRUSTED);
        }

        let initial_status = status.as_deref().copied().unwrap_or_default();
        let mut final_status = initial_status;

        let mut pre = PreVisitor::new(
            &mut *event,
            dom_event,
            context,
            initial_status,
            original_is_anonymous,
        );
        let outcome = (|| -> Result<()> {
            chain_pre_handle(&guard, leaf, &mut pre)?;
            if !pre.can_handle {
                final_status = pre.status;
                tracing::debug!("dispatch rejected by the event target");
                return Err(Error::CannotHandle);
            }
            let top = build_chain_above(&guard, leaf, &mut pre)?;

            if let Some(out) = targets_out {
                collect_chain_targets(&guard, leaf, out);
                final_status = pre.status;
                return Ok(());
            }

            let mut post = PostVisitor::from_pre(pre);
            let walked = handle_event_target_chain(
                &guard,
                top,
                &mut post,
                PhaseMask::CAPTURE | PhaseMask::BUBBLE,
                callback,
                false,
            );
            post.sync_dom_event();
            final_status = post.status;
            walked
        })();

        free_chain(&guard, leaf);
        event.flags.remove(EventFlags::DISPATCHING);
        event.flags.insert(EventFlags::DISPATCHED);
        if let Some(status) = status {
            *status = final_status;
        }
        outcome
    }
}
