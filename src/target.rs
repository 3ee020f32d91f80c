use super::*;

/// Stable identity of one dispatch participant, used for chain-walk
/// comparisons. The engine never inspects targets beyond this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(pub u64);

pub trait EventTarget {
    fn target_id(&self) -> TargetId;

    /// The object that stands in for this one on the chain. `None` keeps
    /// the queried object itself. Must be idempotent.
    fn effective_target(&self) -> Option<Rc<dyn EventTarget>> {
        None
    }

    /// The object reported when the chain is enumerated without firing
    /// handlers.
    fn enumeration_target(&self) -> Option<Rc<dyn EventTarget>> {
        self.effective_target()
    }

    /// First contact with an event being dispatched through this object:
    /// decides whether the hop can take part, which flags it carries,
    /// which object is the next outer target, and whether crossing this
    /// hop substitutes the apparent event target.
    fn pre_handle(&self, visitor: &mut PreVisitor<'_>) -> Result<()>;

    /// Called right before handlers run on a hop that asked for it.
    fn will_handle(&self, _visitor: &mut PostVisitor<'_>) {}

    fn listener_registry(&self) -> Option<Rc<dyn ListenerRegistry>> {
        None
    }

    /// Second visit during the system-group walk, after handlers.
    fn post_handle(&self, _visitor: &mut PostVisitor<'_>) -> Result<()> {
        Ok(())
    }

    fn in_anonymous_subtree(&self) -> bool {
        false
    }

    fn is_privileged(&self) -> bool {
        true
    }

    fn privileged_handler(&self) -> Option<Rc<dyn EventTarget>> {
        None
    }
}

pub trait ListenerRegistry {
    /// Invoke the listeners registered on one hop. The walker has already
    /// set the payload's `current_target` for the duration of the call.
    fn handle_event(&self, visitor: &mut PostVisitor<'_>, phase: PhaseMask) -> Result<()>;
}

/// Invoked once, between the default and system group walks, with the
/// event target reset to the original target.
pub trait DispatchCallback {
    fn handle_event(&mut self, visitor: &mut PostVisitor<'_>);
}

pub(crate) fn resolve_chain_target(target: &Rc<dyn EventTarget>) -> Rc<dyn EventTarget> {
    target.effective_target().unwrap_or_else(|| Rc::clone(target))
}

pub struct PreVisitor<'d> {
    pub event: &'d mut Event,
    pub dom_event: Option<&'d mut DomEvent>,
    pub context: Option<&'d mut dyn Any>,
    pub status: EventStatus,
    pub original_target_is_anonymous: bool,
    // Per-hop outputs, reset before every pre_handle call.
    pub can_handle: bool,
    pub force_content_dispatch: bool,
    pub wants_will_handle: bool,
    pub may_have_listeners: bool,
    pub parent_target: Option<Rc<dyn EventTarget>>,
    pub retarget: Option<Rc<dyn EventTarget>>,
    pub item_flags: u16,
    pub item_data: Option<Rc<dyn Any>>,
}

impl<'d> PreVisitor<'d> {
    pub(crate) fn new(
        event: &'d mut Event,
        dom_event: Option<&'d mut DomEvent>,
        context: Option<&'d mut dyn Any>,
        status: EventStatus,
        original_target_is_anonymous: bool,
    ) -> Self {
        Self {
            event,
            dom_event,
            context,
            status,
            original_target_is_anonymous,
            can_handle: true,
            force_content_dispatch: false,
            wants_will_handle: false,
            may_have_listeners: true,
            parent_target: None,
            retarget: None,
            item_flags: 0,
            item_data: None,
        }
    }

    pub fn reset(&mut self) {
        self.can_handle = true;
        self.force_content_dispatch = false;
        self.wants_will_handle = false;
        self.may_have_listeners = true;
        self.parent_target = None;
        self.retarget = None;
        self.item_flags = 0;
        self.item_data = None;
    }
}

pub struct PostVisitor<'d> {
    pub event: &'d mut Event,
    pub dom_event: Option<&'d mut DomEvent>,
    pub context: Option<&'d mut dyn Any>,
    pub status: EventStatus,
    // Per-hop data copied back from the chain item before post_handle.
    pub item_flags: u16,
    pub item_data: Option<Rc<dyn Any>>,
    /// Moves forward whenever a host registers a listener mid-dispatch,
    /// so hops that reported no registry get re-queried.
    pub listener_generation: u64,
}

impl<'d> PostVisitor<'d> {
    pub(crate) fn from_pre(pre: PreVisitor<'d>) -> Self {
        Self {
            event: pre.event,
            dom_event: pre.dom_event,
            context: pre.context,
            status: pre.status,
            item_flags: 0,
            item_data: None,
            listener_generation: 0,
        }
    }

    pub fn prevent_default(&mut self) {
        self.status = EventStatus::ConsumeNoDefault;
    }

    pub fn note_listener_registered(&mut self) {
        self.listener_generation += 1;
    }

    pub(crate) fn sync_dom_event(&mut self) {
        if let Some(dom_event) = self.dom_event.as_deref_mut() {
            dom_event.target = self.event.target.clone();
            dom_event.original_target = self.event.original_target.clone();
            dom_event.trusted = self.event.flags.contains(EventFlags::TRUSTED);
        }
    }
}
