use super::*;

/// One hop of one dispatch. Lives in a pool slot; the child/parent links
/// are arena indices so a freed chain never leaves dangling pointers.
pub(crate) struct ChainItem {
    pub(crate) target: Rc<dyn EventTarget>,
    pub(crate) child: Option<ItemId>,
    pub(crate) parent: Option<ItemId>,
    pub(crate) flags: ChainFlags,
    pub(crate) item_flags: u16,
    pub(crate) item_data: Option<Rc<dyn Any>>,
    /// Set when this hop is an anonymous-boundary retargeting point.
    pub(crate) new_target: Option<Rc<dyn EventTarget>>,
    /// The hop's handler registry, looked up at most once per dispatch.
    pub(crate) registry: Option<Rc<dyn ListenerRegistry>>,
}

impl ChainItem {
    pub(crate) fn new(target: Rc<dyn EventTarget>) -> Self {
        Self {
            target: resolve_chain_target(&target),
            child: None,
            parent: None,
            flags: ChainFlags::empty(),
            item_flags: 0,
            item_data: None,
            new_target: None,
            registry: None,
        }
    }
}

fn push_chain_parent(
    pool: &PoolGuard,
    child: ItemId,
    target: Rc<dyn EventTarget>,
) -> Result<ItemId> {
    let parent = pool.alloc(ChainItem::new(target))?;
    pool.with_item_mut(parent, |item| item.child = Some(child));
    pool.with_item_mut(child, |item| item.parent = Some(parent));
    Ok(parent)
}

/// Reset the visitor, run the target's pre_handle, and copy the per-hop
/// outputs onto the chain item for the walk and the notification pass.
pub(crate) fn chain_pre_handle(
    pool: &PoolGuard,
    id: ItemId,
    visitor: &mut PreVisitor<'_>,
) -> Result<()> {
    visitor.reset();
    let target = pool.with_item(id, |item| Rc::clone(&item.target));
    let outcome = target.pre_handle(visitor);
    pool.with_item_mut(id, |item| {
        item.flags.set(
            ChainFlags::FORCE_CONTENT_DISPATCH,
            visitor.force_content_dispatch,
        );
        item.flags
            .set(ChainFlags::WANTS_WILL_HANDLE, visitor.wants_will_handle);
        item.flags
            .set(ChainFlags::MAY_HAVE_REGISTRY, visitor.may_have_listeners);
        item.item_flags = visitor.item_flags;
        item.item_data = visitor.item_data.clone();
        item.new_target = visitor.retarget.clone();
    });
    outcome
}

/// Extend the chain upward from the leaf until no hop reports a parent.
/// A hop that cannot handle the event truncates the chain there; the part
/// already built stays valid and is walked as-is.
pub(crate) fn build_chain_above(
    pool: &PoolGuard,
    leaf: ItemId,
    visitor: &mut PreVisitor<'_>,
) -> Result<ItemId> {
    let mut top = leaf;
    while let Some(parent_target) = visitor.parent_target.take() {
        let parent = push_chain_parent(pool, top, parent_target)?;
        chain_pre_handle(pool, parent, visitor)?;
        if !visitor.can_handle {
            free_chain(pool, parent);
            break;
        }
        top = parent;
    }
    Ok(top)
}

/// Return a whole chain to the pool in one pass. The child link is
/// severed first so no cursor can re-enter the freed range.
pub(crate) fn free_chain(pool: &PoolGuard, from: ItemId) {
    let child = pool.with_item(from, |item| item.child);
    if let Some(child) = child {
        pool.with_item_mut(child, |item| item.parent = None);
        pool.with_item_mut(from, |item| item.child = None);
    }
    let mut cursor = Some(from);
    while let Some(id) = cursor {
        cursor = pool.with_item(id, |item| item.parent);
        pool.free(id);
    }
}

/// Leaf-to-root enumeration of the targets an event would reach, without
/// firing anything.
pub(crate) fn collect_chain_targets(
    pool: &PoolGuard,
    leaf: ItemId,
    out: &mut Vec<Rc<dyn EventTarget>>,
) {
    out.clear();
    let mut cursor = Some(leaf);
    while let Some(id) = cursor {
        let target = pool.with_item(id, |item| Rc::clone(&item.target));
        out.push(
            target
                .enumeration_target()
                .unwrap_or_else(|| Rc::clone(&target)),
        );
        cursor = pool.with_item(id, |item| item.parent);
    }
}

/// Walk the chain through capture, target and bubble for one event group,
/// then recurse once for the system group.
pub(crate) fn handle_event_target_chain(
    pool: &PoolGuard,
    top: ItemId,
    visitor: &mut PostVisitor<'_>,
    phase: PhaseMask,
    mut callback: Option<&mut dyn DispatchCallback>,
    may_have_new_listeners: bool,
) -> Result<()> {
    let generation_at_start = visitor.listener_generation;
    // The walk-entry target is restored for the system group after the
    // handoff callback has seen the original target.
    let first_target = visitor.event.target.clone();

    // Capture walk, root down to the hop just above the event target.
    let mut item = top;
    visitor.event.flags.insert(EventFlags::IN_CAPTURE);
    visitor.event.flags.remove(EventFlags::IN_BUBBLE);
    while let Some(child) = pool.with_item(item, |i| i.child) {
        let forces = pool.with_item(item, |i| {
            i.flags.contains(ChainFlags::FORCE_CONTENT_DISPATCH)
        });
        if (!visitor.event.flags.contains(EventFlags::NO_CONTENT_DISPATCH) || forces)
            && !visitor.event.flags.contains(EventFlags::STOP_DISPATCH)
        {
            handle_item_event(
                pool,
                item,
                visitor,
                phase.capture_side(),
                may_have_new_listeners || generation_at_start != visitor.listener_generation,
            )?;
        }
        if let Some(new_target) = pool.with_item(item, |i| i.new_target.clone()) {
            // Anonymous boundary: every hop below this one, and the target
            // stage itself, sees the substituted target. Hops already
            // handled keep what they saw.
            visitor.event.target = Some(new_target);
        }
        item = child;
    }

    // Target stage.
    visitor.event.flags.insert(EventFlags::IN_BUBBLE);
    let forces = pool.with_item(item, |i| {
        i.flags.contains(ChainFlags::FORCE_CONTENT_DISPATCH)
    });
    if !visitor.event.flags.contains(EventFlags::STOP_DISPATCH)
        && (!visitor.event.flags.contains(EventFlags::NO_CONTENT_DISPATCH) || forces)
    {
        // Both walk bits stay set so listeners for either side fire at
        // the event target itself.
        handle_item_event(
            pool,
            item,
            visitor,
            phase,
            may_have_new_listeners || generation_at_start != visitor.listener_generation,
        )?;
    }
    if phase.contains(PhaseMask::SYSTEM_GROUP) {
        handle_item_post(pool, item, visitor)?;
    }

    // Bubble walk, back up to the root.
    visitor.event.flags.remove(EventFlags::IN_CAPTURE);
    let mut cursor = pool.with_item(item, |i| i.parent);
    while let Some(id) = cursor {
        let new_target = pool.with_item(id, |i| i.new_target.clone());
        if let Some(new_target) = &new_target {
            // This hop and everything above it see the retargeted value.
            visitor.event.target = Some(Rc::clone(new_target));
        }
        if !visitor.event.flags.contains(EventFlags::CANT_BUBBLE) || new_target.is_some() {
            let forces = pool.with_item(id, |i| {
                i.flags.contains(ChainFlags::FORCE_CONTENT_DISPATCH)
            });
            if (!visitor.event.flags.contains(EventFlags::NO_CONTENT_DISPATCH) || forces)
                && !visitor.event.flags.contains(EventFlags::STOP_DISPATCH)
            {
                handle_item_event(
                    pool,
                    id,
                    visitor,
                    phase.bubble_side(),
                    generation_at_start != visitor.listener_generation,
                )?;
            }
            if phase.contains(PhaseMask::SYSTEM_GROUP) {
                handle_item_post(pool, id, visitor)?;
            }
        }
        cursor = pool.with_item(id, |i| i.parent);
    }
    visitor.event.flags.remove(EventFlags::IN_BUBBLE);

    if !phase.contains(PhaseMask::SYSTEM_GROUP) {
        // The stop signal is scoped to one event group.
        visitor.event.flags.remove(EventFlags::STOP_DISPATCH);
        visitor.event.target = visitor.event.original_target.clone();
        if let Some(callback) = callback.as_mut() {
            callback.handle_event(visitor);
        }
        visitor.event.target = first_target;
        tracing::trace!("entering system event group");
        handle_event_target_chain(
            pool,
            top,
            visitor,
            phase | PhaseMask::SYSTEM_GROUP,
            callback,
            generation_at_start != visitor.listener_generation,
        )?;
    }
    Ok(())
}

fn handle_item_event(
    pool: &PoolGuard,
    id: ItemId,
    visitor: &mut PostVisitor<'_>,
    phase: PhaseMask,
    may_have_new_listeners: bool,
) -> Result<()> {
    let (target, wants_will_handle) = pool.with_item(id, |item| {
        (
            Rc::clone(&item.target),
            item.flags.contains(ChainFlags::WANTS_WILL_HANDLE),
        )
    });
    if wants_will_handle {
        target.will_handle(visitor);
    }
    if visitor.event.flags.contains(EventFlags::STOP_DISPATCH) {
        return Ok(());
    }

    let mut registry = pool.with_item(id, |item| item.registry.clone());
    if registry.is_none() {
        let may_have = pool.with_item(id, |item| item.flags.contains(ChainFlags::MAY_HAVE_REGISTRY));
        if !may_have && !may_have_new_listeners {
            return Ok(());
        }
        registry = target.listener_registry();
        pool.with_item_mut(id, |item| item.registry = registry.clone());
    }

    if let Some(registry) = registry {
        visitor.event.current_target = Some(Rc::clone(&target));
        let outcome = registry.handle_event(visitor, phase);
        visitor.event.current_target = None;
        outcome?;
    }
    Ok(())
}

fn handle_item_post(pool: &PoolGuard, id: ItemId, visitor: &mut PostVisitor<'_>) -> Result<()> {
    let (target, item_flags, item_data) = pool.with_item(id, |item| {
        (
            Rc::clone(&item.target),
            item.item_flags,
            item.item_data.clone(),
        )
    });
    visitor.item_flags = item_flags;
    visitor.item_data = item_data;
    target.post_handle(visitor)
}
