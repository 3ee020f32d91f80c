use bitflags::bitflags;

bitflags! {
    /// Mutable state word carried on an event while it travels a chain.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EventFlags: u32 {
        /// A handler asked for the rest of the current event group to be
        /// skipped. Cleared again at the group handoff.
        const STOP_DISPATCH = 1 << 0;
        const IN_CAPTURE = 1 << 1;
        const IN_BUBBLE = 1 << 2;
        /// A dispatch for this event object is currently on the stack.
        const DISPATCHING = 1 << 3;
        /// The event object has completed at least one dispatch.
        const DISPATCHED = 1 << 4;
        /// The bubble walk skips hops unless a retarget overrides it.
        const CANT_BUBBLE = 1 << 5;
        const TRUSTED = 1 << 6;
        /// Reroute the chain to the privileged handler when the starting
        /// target itself is not privileged.
        const ONLY_PRIVILEGED_DISPATCH = 1 << 7;
        /// Skip ordinary content hops unless a hop forces dispatch.
        const NO_CONTENT_DISPATCH = 1 << 8;
    }
}

bitflags! {
    /// Which part of the walk a handler invocation belongs to. Both walk
    /// bits are set for the invocation at the event target itself.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PhaseMask: u8 {
        const CAPTURE = 1 << 0;
        const BUBBLE = 1 << 1;
        /// Set for the second, privileged walk over the chain.
        const SYSTEM_GROUP = 1 << 2;
    }
}

impl PhaseMask {
    pub(crate) fn capture_side(self) -> PhaseMask {
        self.difference(PhaseMask::BUBBLE)
    }

    pub(crate) fn bubble_side(self) -> PhaseMask {
        self.difference(PhaseMask::CAPTURE)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub(crate) struct ChainFlags: u8 {
        const FORCE_CONTENT_DISPATCH = 1 << 0;
        const WANTS_WILL_HANDLE = 1 << 1;
        const MAY_HAVE_REGISTRY = 1 << 2;
    }
}
