//! Ordered, coalescing outbound message queue.

use std::sync::Mutex;

use weft_proto::ForwardMsg;

/// The outbound message buffer for one session.
///
/// Written by the script thread (element deltas) and the session thread
/// (lifecycle messages); drained in order by the session's flush. A delta
/// addressed to a path that already has a queued delta replaces it in
/// place, so a rerun that redraws an element before the previous draw ever
/// reached the wire costs one message, not two.
#[derive(Debug, Default)]
pub struct ForwardMsgQueue {
    inner: Mutex<Vec<ForwardMsg>>,
}

impl ForwardMsgQueue {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, coalescing same-path deltas.
    pub fn enqueue(&self, msg: ForwardMsg) {
        let mut queue = self.inner.lock().expect("forward queue lock poisoned");
        if let ForwardMsg::Delta(delta) = &msg {
            let existing = queue.iter_mut().find(|queued| {
                matches!(queued, ForwardMsg::Delta(prior) if prior.path == delta.path)
            });
            if let Some(slot) = existing {
                *slot = msg;
                return;
            }
        }
        queue.push(msg);
    }

    /// Drain everything, in enqueue order.
    #[must_use]
    pub fn flush(&self) -> Vec<ForwardMsg> {
        let mut queue = self.inner.lock().expect("forward queue lock poisoned");
        std::mem::take(&mut *queue)
    }

    /// Number of queued messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("forward queue lock poisoned").len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_proto::{Delta, Element};

    fn text(index: u32, body: &str) -> ForwardMsg {
        ForwardMsg::Delta(Delta::at(
            index,
            Element::Text {
                body: body.to_string(),
            },
        ))
    }

    #[test]
    fn same_path_deltas_coalesce_in_place() {
        let queue = ForwardMsgQueue::new();
        queue.enqueue(text(0, "first"));
        queue.enqueue(text(1, "second"));
        queue.enqueue(text(0, "replaced"));

        let drained = queue.flush();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0], text(0, "replaced"));
        assert_eq!(drained[1], text(1, "second"));
    }

    #[test]
    fn non_delta_messages_never_coalesce() {
        let queue = ForwardMsgQueue::new();
        queue.enqueue(ForwardMsg::ScriptFinished(
            weft_proto::ScriptFinishedStatus::Success,
        ));
        queue.enqueue(ForwardMsg::ScriptFinished(
            weft_proto::ScriptFinishedStatus::Success,
        ));
        assert_eq!(queue.flush().len(), 2);
    }

    #[test]
    fn flush_empties_the_queue() {
        let queue = ForwardMsgQueue::new();
        queue.enqueue(text(0, "x"));
        assert_eq!(queue.flush().len(), 1);
        assert!(queue.is_empty());
    }
}
