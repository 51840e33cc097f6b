//! Pure list-to-list functions implementing the item state machine.
//!
//! Nothing in here touches storage; `QueueStore` loads the lists, applies one of these
//! functions, and writes the lists back.

use thiserror::Error;

use super::models::{Direction, ItemStatus, QueueItem};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Item {0} not found")]
    NotFound(String),

    #[error("Illegal transition for item {id}: {from} -> {to}")]
    Illegal {
        id: String,
        from: ItemStatus,
        to: ItemStatus,
    },
}

fn position(list: &[QueueItem], id: &str) -> Result<usize, TransitionError> {
    list.iter()
        .position(|item| item.id == id)
        .ok_or_else(|| TransitionError::NotFound(id.to_string()))
}

fn check(item: &QueueItem, next: ItemStatus) -> Result<(), TransitionError> {
    if item.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(TransitionError::Illegal {
            id: item.id.clone(),
            from: item.status,
            to: next,
        })
    }
}

/// Changes an item's status without moving it to another list.
///
/// Used for `pending -> downloading`, where both states live in the active list.
pub fn restamp(
    list: &mut [QueueItem],
    id: &str,
    next: ItemStatus,
) -> Result<(), TransitionError> {
    let idx = position(list, id)?;
    check(&list[idx], next)?;
    list[idx].status = next;
    Ok(())
}

/// Moves an item from `from` to the end of `to`, stamping the new status and error.
pub fn transfer(
    from: &mut Vec<QueueItem>,
    to: &mut Vec<QueueItem>,
    id: &str,
    next: ItemStatus,
    error: Option<String>,
) -> Result<(), TransitionError> {
    let idx = position(from, id)?;
    check(&from[idx], next)?;
    let mut item = from.remove(idx);
    item.status = next;
    item.error = error;
    to.push(item);
    Ok(())
}

/// Swaps an item with its neighbour. Returns `false` at either boundary.
pub fn swap_neighbour(
    list: &mut [QueueItem],
    id: &str,
    direction: Direction,
) -> Result<bool, TransitionError> {
    let idx = position(list, id)?;
    match direction {
        Direction::Up if idx > 0 => {
            list.swap(idx, idx - 1);
            Ok(true)
        }
        Direction::Down if idx + 1 < list.len() => {
            list.swap(idx, idx + 1);
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Removes an item from the list, returning it.
pub fn remove(list: &mut Vec<QueueItem>, id: &str) -> Result<QueueItem, TransitionError> {
    let idx = position(list, id)?;
    Ok(list.remove(idx))
}

/// Forces every downloading item back to pending with `message` as its error.
///
/// Returns the ids that were reset. This is the only way out of `downloading`
/// that is not a download outcome.
pub fn interrupt_downloading(list: &mut [QueueItem], message: &str) -> Vec<String> {
    list.iter_mut()
        .filter(|item| item.status == ItemStatus::Downloading)
        .map(|item| {
            item.status = ItemStatus::Pending;
            item.error = Some(message.to_string());
            item.id.clone()
        })
        .collect()
}
