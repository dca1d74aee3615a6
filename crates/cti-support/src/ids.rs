use std::collections::HashMap;
use std::sync::Mutex;

/// Errors raised by [`IdTable`].
#[derive(Debug, thiserror::Error)]
pub enum IdTableError {
  #[error("no id has been allocated for '{0}'")]
  UnknownCti(String),
}

#[derive(Debug, Default)]
struct IdTableState {
  next: u64,
  free: Vec<u64>,
  assigned: HashMap<String, u64>,
}

/// A monotonic id table for externally-supplied CTIs.
///
/// Hands out `u64` ids for CTI strings on first request and reuses the same
/// id on subsequent requests for the same string. Released ids are recycled
/// from a free-list before the counter is advanced. A single mutex guards
/// both the counter and the free-list since callers may share one table
/// across worker threads once the registry is no longer being mutated.
#[derive(Debug, Default)]
pub struct IdTable {
  state: Mutex<IdTableState>,
}

impl IdTable {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns the id for `cti`, allocating a fresh one if this is the first
  /// time the string has been seen.
  pub fn alloc(&self, cti: &str) -> u64 {
    let mut state = self.state.lock().expect("id table mutex poisoned");
    if let Some(&id) = state.assigned.get(cti) {
      return id;
    }

    let id = state.free.pop().unwrap_or_else(|| {
      let id = state.next;
      state.next += 1;
      id
    });
    state.assigned.insert(cti.to_string(), id);
    id
  }

  /// Returns the id already assigned to `cti`, without allocating one.
  pub fn id_for(&self, cti: &str) -> Option<u64> {
    let state = self.state.lock().expect("id table mutex poisoned");
    state.assigned.get(cti).copied()
  }

  /// Releases the id held by `cti`, returning it to the free-list.
  pub fn release(&self, cti: &str) -> Result<(), IdTableError> {
    let mut state = self.state.lock().expect("id table mutex poisoned");
    let id = state
      .assigned
      .remove(cti)
      .ok_or_else(|| IdTableError::UnknownCti(cti.to_string()))?;
    state.free.push(id);
    Ok(())
  }

  /// Number of ids currently assigned.
  pub fn len(&self) -> usize {
    self.state.lock().expect("id table mutex poisoned").assigned.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn allocates_stable_ids() {
    let table = IdTable::new();
    let a = table.alloc("cti.acme.p.foo.v1.0");
    let b = table.alloc("cti.acme.p.bar.v1.0");
    let a_again = table.alloc("cti.acme.p.foo.v1.0");
    assert_eq!(a, a_again);
    assert!(a != b);
  }

  #[test]
  fn recycles_released_ids() {
    let table = IdTable::new();
    let a = table.alloc("cti.acme.p.foo.v1.0");
    table.release("cti.acme.p.foo.v1.0").unwrap();
    let b = table.alloc("cti.acme.p.bar.v1.0");
    assert_eq!(a, b);
  }

  #[test]
  fn release_unknown_is_an_error() {
    let table = IdTable::new();
    assert!(matches!(table.release("cti.acme.p.foo.v1.0"), Err(IdTableError::UnknownCti(_))));
  }
}
