use crate::handler::Handler;
use std::collections::HashMap;

/// A registered handler as exposed by `raw_listeners`, with its one-time flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawListener<H> {
    pub handler: H,
    pub once: bool,
}

struct HandlerEntry<P> {
    id: u64,
    handler: Handler<P>,
    once: bool,
}

struct Slot<P> {
    /// Ordering key for `names`; assigned when the slot is created.
    seq: u64,
    entries: Vec<HandlerEntry<P>>,
    warned: bool,
}

/// Per-event-name handler lists. A name is present only while it has at
/// least one entry.
pub(crate) struct HandlerRegistry<P> {
    slots: HashMap<String, Slot<P>>,
    next_seq: u64,
    next_id: u64,
}

impl<P> HandlerRegistry<P> {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            next_seq: 0,
            next_id: 0,
        }
    }

    /// Adds an entry and returns the number of entries now under `event`.
    pub fn insert(&mut self, event: &str, handler: Handler<P>, once: bool, prepend: bool) -> usize {
        let id = self.next_id;
        self.next_id += 1;

        let next_seq = &mut self.next_seq;
        let slot = self.slots.entry(event.to_string()).or_insert_with(|| {
            let seq = *next_seq;
            *next_seq += 1;
            Slot {
                seq,
                entries: Vec::new(),
                warned: false,
            }
        });

        let entry = HandlerEntry { id, handler, once };
        if prepend {
            slot.entries.insert(0, entry);
        } else {
            slot.entries.push(entry);
        }
        slot.entries.len()
    }

    /// Returns `true` the first time it is called for the current lifetime of
    /// the slot; a slot that empties and is recreated can warn again.
    pub fn mark_warned(&mut self, event: &str) -> bool {
        match self.slots.get_mut(event) {
            Some(slot) if !slot.warned => {
                slot.warned = true;
                true
            }
            _ => false,
        }
    }

    /// Removes the first entry holding `handler`.
    pub fn remove(&mut self, event: &str, handler: &Handler<P>) -> bool {
        let Some(slot) = self.slots.get_mut(event) else {
            return false;
        };
        let Some(pos) = slot.entries.iter().position(|e| e.handler.same_as(handler)) else {
            return false;
        };
        slot.entries.remove(pos);
        self.prune(event);
        true
    }

    /// Handlers to invoke for one dispatch, in order. One-time entries are
    /// removed from the registry here, so no later dispatch can see them.
    pub fn take_dispatch(&mut self, event: &str) -> Vec<Handler<P>> {
        let Some(slot) = self.slots.get_mut(event) else {
            return Vec::new();
        };
        let snapshot = slot.entries.iter().map(|e| e.handler.clone()).collect();

        let fired: Vec<u64> = slot.entries.iter().filter(|e| e.once).map(|e| e.id).collect();
        if !fired.is_empty() {
            slot.entries.retain(|e| !fired.contains(&e.id));
            self.prune(event);
        }
        snapshot
    }

    pub fn clear(&mut self, event: Option<&str>) {
        match event {
            Some(event) => {
                self.slots.remove(event);
            }
            None => self.slots.clear(),
        }
    }

    pub fn len(&self, event: &str) -> usize {
        self.slots.get(event).map_or(0, |s| s.entries.len())
    }

    pub fn names(&self) -> Vec<String> {
        let mut named: Vec<(&String, u64)> = self.slots.iter().map(|(k, s)| (k, s.seq)).collect();
        named.sort_by_key(|(_, seq)| *seq);
        named.into_iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn handlers(&self, event: &str) -> Vec<Handler<P>> {
        self.slots.get(event).map_or_else(Vec::new, |s| {
            s.entries.iter().map(|e| e.handler.clone()).collect()
        })
    }

    pub fn raw(&self, event: &str) -> Vec<RawListener<Handler<P>>> {
        self.slots.get(event).map_or_else(Vec::new, |s| {
            s.entries
                .iter()
                .map(|e| RawListener {
                    handler: e.handler.clone(),
                    once: e.once,
                })
                .collect()
        })
    }

    fn prune(&mut self, event: &str) {
        if self.slots.get(event).is_some_and(|s| s.entries.is_empty()) {
            self.slots.remove(event);
        }
    }
}
