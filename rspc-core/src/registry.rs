use crate::error::LinkError;
use crate::ids::OperationId;
use crate::link::Completion;
use crate::msg::{Response, ResponseResult};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

/// One registered operation. `live` flips to false when the entry leaves the
/// map, so an event already looked up is not delivered after removal.
#[derive(Debug, Clone)]
struct Pending {
    completion: Completion,
    live: Arc<AtomicBool>,
}

impl Pending {
    fn new(completion: Completion) -> Self {
        Self {
            completion,
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    fn retire(self) -> Completion {
        self.live.store(false, Ordering::Release);
        self.completion
    }

    fn event(&self, data: Value) {
        if self.live.load(Ordering::Acquire) {
            self.completion.event(data);
        }
    }
}

/// Maps in-flight operation ids to their pending completion callbacks.
///
/// Callbacks are always invoked after the map guard is released, so a
/// callback may freely abort or start other operations. Events are not
/// delivered to an entry that was removed after being looked up.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    entries: DashMap<OperationId, Pending>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: OperationId, completion: Completion) {
        if let Some(replaced) = self.entries.insert(id.clone(), Pending::new(completion)) {
            replaced.retire();
            warn!("rspc: replaced pending entry for in-flight id '{}'", id);
        }
    }

    pub fn remove(&self, id: &OperationId) -> Option<Completion> {
        self.entries.remove(id).map(|(_, pending)| pending.retire())
    }

    fn lookup(&self, id: &OperationId) -> Option<Pending> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &OperationId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Route one inbound envelope to the operation it belongs to.
    ///
    /// Events keep the entry; responses and errors remove it. Envelopes for
    /// unknown ids or with an unknown result type are logged and dropped.
    pub fn dispatch(&self, response: Response) {
        let Some(id) = response.id else {
            error!("rspc: received envelope without an id");
            return;
        };

        match response.result {
            ResponseResult::Event(data) => {
                match self.lookup(&id) {
                    Some(pending) => pending.event(data),
                    None => error!("rspc: received event for unknown id '{}'", id),
                }
            }
            ResponseResult::Response(data) => match self.remove(&id) {
                Some(completion) => completion.resolve(data),
                None => error!("rspc: received event for unknown id '{}'", id),
            },
            ResponseResult::Error(err) => match self.remove(&id) {
                Some(completion) => completion.reject(LinkError::Rpc(err)),
                None => error!("rspc: received event for unknown id '{}'", id),
            },
            ResponseResult::Unknown(kind) => {
                if self.contains(&id) {
                    error!("rspc: received event of unknown type '{}'", kind);
                } else {
                    error!("rspc: received event for unknown id '{}'", id);
                }
            }
        }
    }
}
