//! Operation Transform
//!
//! Pairwise position adjustment for two operations issued against
//! different versions. This is a single-history scheme: only the older
//! operand is rewritten, the newer one passes through untouched. It does
//! not guarantee convergence and the live apply path never calls it.

use super::operation::{OpKind, Operation};

/// Reconcile two operations by version order.
///
/// Returns `(adjusted, untouched)`: the operand with the lower version
/// transformed against the other, followed by the other operand unchanged.
/// When both carry the same version they are returned as given. The
/// adjusted operand is `None` when a delete is fully subsumed.
pub fn transform(a: &Operation, b: &Operation) -> (Option<Operation>, Operation) {
    if a.version() < b.version() {
        (a.transform_against(b), b.clone())
    } else if a.version() > b.version() {
        (b.transform_against(a), a.clone())
    } else {
        (Some(a.clone()), b.clone())
    }
}

impl Operation {
    /// Adjust this operation's position for an `other` operation applied first.
    ///
    /// Inserts shift by one per preceding operation, not by inserted length.
    /// Returns `None` if this is a delete whose range `other` already removed.
    pub fn transform_against(&self, other: &Operation) -> Option<Operation> {
        match (self.kind(), other.kind()) {
            (OpKind::Insert { position, text }, OpKind::Insert { position: other_pos, .. }) => {
                if *other_pos <= *position {
                    Some(self.with_kind(OpKind::Insert {
                        position: position.saturating_add(1),
                        text: text.clone(),
                    }))
                } else {
                    Some(self.clone())
                }
            }
            (
                OpKind::Insert { position, text },
                OpKind::Delete {
                    position: other_pos,
                    length: other_len,
                },
            ) => {
                if *other_pos < *position {
                    let shifted = position.saturating_sub(*other_len).max(*other_pos);
                    Some(self.with_kind(OpKind::Insert {
                        position: shifted,
                        text: text.clone(),
                    }))
                } else {
                    Some(self.clone())
                }
            }
            (OpKind::Delete { position, length }, OpKind::Insert { position: other_pos, .. }) => {
                if *other_pos <= *position {
                    Some(self.with_kind(OpKind::Delete {
                        position: position.saturating_add(1),
                        length: *length,
                    }))
                } else {
                    Some(self.clone())
                }
            }
            (
                OpKind::Delete { position, length },
                OpKind::Delete {
                    position: other_pos,
                    length: other_len,
                },
            ) => transform_delete_delete(self, *position, *length, *other_pos, *other_len),
        }
    }
}

fn transform_delete_delete(
    op: &Operation,
    position: usize,
    length: usize,
    other_pos: usize,
    other_len: usize,
) -> Option<Operation> {
    let end = position.saturating_add(length);
    let other_end = other_pos.saturating_add(other_len);

    if other_pos < position {
        if other_end <= position {
            // Disjoint, other lies entirely before
            return Some(op.with_kind(OpKind::Delete {
                position: position.saturating_sub(other_len),
                length,
            }));
        }
        // Other covers our head; keep only the tail past its end
        return end
            .checked_sub(other_end)
            .filter(|remaining| *remaining > 0)
            .map(|remaining| {
                op.with_kind(OpKind::Delete {
                    position: other_pos,
                    length: remaining,
                })
            });
    }

    if other_pos < end {
        // Other starts inside our range; keep only the head before it
        let remaining = other_pos - position;
        if remaining == 0 {
            return None;
        }
        return Some(op.with_kind(OpKind::Delete {
            position,
            length: remaining,
        }));
    }

    Some(op.clone())
}
