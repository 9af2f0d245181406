//! Pure status-transition logic (§4.9). No I/O, no clock reads: every
//! function is a total or explicitly-fallible map over status values, which
//! keeps the aggregate's transition rules testable in isolation from
//! persistence and exhaustively matched so a new status variant fails to
//! compile here until handled.

use crate::error::RelayError;
use crate::message::{DeliveryStatus, MessageStatus};

/// `Draft -> Scheduled`. Rejects any other origin.
pub fn schedule(current: MessageStatus) -> Result<MessageStatus, RelayError> {
    match current {
        MessageStatus::Draft => Ok(MessageStatus::Scheduled),
        other => Err(RelayError::invariant(format!(
            "cannot schedule a message in status '{}'",
            other.as_str()
        ))),
    }
}

/// `Scheduled -> Processing`, driven by a successful Dispatcher claim.
pub fn claim(current: MessageStatus) -> Result<MessageStatus, RelayError> {
    match current {
        MessageStatus::Scheduled => Ok(MessageStatus::Processing),
        other => Err(RelayError::invariant(format!(
            "cannot claim a message in status '{}'",
            other.as_str()
        ))),
    }
}

/// `Pending -> {Delivered, Failed}` only; no resurrection of a terminal
/// delivery (I3). Calling this on an already-terminal delivery is an
/// invariant violation — callers (see `Message::apply_delivery_outcome`)
/// are expected to check terminality first and treat a repeat as a no-op.
pub fn apply_delivery_transition(
    current: DeliveryStatus,
    outcome: DeliveryStatus,
) -> Result<DeliveryStatus, RelayError> {
    match (current, outcome) {
        (DeliveryStatus::Pending, DeliveryStatus::Delivered) => Ok(DeliveryStatus::Delivered),
        (DeliveryStatus::Pending, DeliveryStatus::Failed) => Ok(DeliveryStatus::Failed),
        (DeliveryStatus::Pending, DeliveryStatus::Pending) => Err(RelayError::invariant(
            "delivery outcome must be terminal (Delivered or Failed)",
        )),
        (terminal, _) => Err(RelayError::invariant(format!(
            "delivery already terminal in status '{}'",
            terminal.as_str()
        ))),
    }
}

/// Derives the aggregate `Message.status` from the multiset of delivery
/// statuses (§4.9):
/// - all `Delivered` => `Delivered`
/// - all `Failed` => `Failed`
/// - a mixture of terminal states with at least one `Delivered` => `PartiallyDelivered`
/// - any delivery still `Pending` => remain `Processing`
pub fn derive_message_status(statuses: impl Iterator<Item = DeliveryStatus>) -> MessageStatus {
    let mut total = 0usize;
    let mut delivered = 0usize;
    let mut failed = 0usize;
    let mut pending = 0usize;
    for status in statuses {
        total += 1;
        match status {
            DeliveryStatus::Delivered => delivered += 1,
            DeliveryStatus::Failed => failed += 1,
            DeliveryStatus::Pending => pending += 1,
        }
    }
    if total == 0 || pending > 0 {
        return MessageStatus::Processing;
    }
    if delivered == total {
        MessageStatus::Delivered
    } else if failed == total {
        MessageStatus::Failed
    } else {
        MessageStatus::PartiallyDelivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_schedule_only_accepts_draft() {
        assert_eq!(schedule(MessageStatus::Draft), Ok(MessageStatus::Scheduled));
        assert!(schedule(MessageStatus::Scheduled).is_err());
    }

    #[test]
    fn unit_claim_only_accepts_scheduled() {
        assert_eq!(claim(MessageStatus::Scheduled), Ok(MessageStatus::Processing));
        assert!(claim(MessageStatus::Draft).is_err());
    }

    #[test]
    fn unit_delivery_transition_rejects_resurrection() {
        assert!(apply_delivery_transition(DeliveryStatus::Delivered, DeliveryStatus::Failed).is_err());
        assert!(apply_delivery_transition(DeliveryStatus::Failed, DeliveryStatus::Delivered).is_err());
    }

    #[test]
    fn functional_derive_message_status_matches_spec_table() {
        use DeliveryStatus::*;
        assert_eq!(derive_message_status([Delivered, Delivered].into_iter()), MessageStatus::Delivered);
        assert_eq!(derive_message_status([Failed, Failed].into_iter()), MessageStatus::Failed);
        assert_eq!(
            derive_message_status([Delivered, Failed].into_iter()),
            MessageStatus::PartiallyDelivered
        );
        assert_eq!(
            derive_message_status([Delivered, Pending].into_iter()),
            MessageStatus::Processing
        );
    }
}
