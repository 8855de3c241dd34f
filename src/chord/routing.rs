use crate::chord::descriptor::PeerDescriptor;
use crate::chord::types::{IdSpace, Identifier};
use tokio::sync::Mutex;

/// A node's finger table.
///
/// Entry `i` should point at the first node at or after `owner + 2^i`. Every
/// slot has its own lock so that fixing one finger never blocks routing
/// through the others.
pub struct FingerTable {
    owner: Identifier,
    starts: Vec<Identifier>,
    entries: Vec<Mutex<Option<PeerDescriptor>>>,
}

impl FingerTable {
    pub fn new(owner: Identifier, space: &IdSpace) -> Self {
        let count = space.finger_count();
        Self {
            owner,
            starts: (0..count).map(|i| space.finger_start(&owner, i)).collect(),
            entries: (0..count).map(|_| Mutex::new(None)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start of the interval covered by entry `index`.
    pub fn start(&self, index: usize) -> Identifier {
        self.starts[index]
    }

    pub async fn get(&self, index: usize) -> Option<PeerDescriptor> {
        self.entries[index].lock().await.clone()
    }

    pub async fn set(&self, index: usize, node: Option<PeerDescriptor>) {
        *self.entries[index].lock().await = node;
    }

    /// Snapshot of every slot, lowest index first.
    pub async fn entries(&self) -> Vec<Option<PeerDescriptor>> {
        let mut out = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            out.push(entry.lock().await.clone());
        }
        out
    }

    /// Distinct fingers lying strictly between the owner and `id`, closest to
    /// `id` first. The head of the list is the closest preceding finger.
    pub async fn preceding(&self, id: &Identifier) -> Vec<PeerDescriptor> {
        let mut candidates: Vec<PeerDescriptor> = Vec::new();
        for entry in self.entries.iter().rev() {
            let finger = entry.lock().await.clone();
            if let Some(finger) = finger {
                if finger.id().is_between(&self.owner, id) && !candidates.contains(&finger) {
                    candidates.push(finger);
                }
            }
        }
        candidates
    }

    /// Clears every slot pointing at `node`. Returns how many were cleared.
    pub async fn forget(&self, node: &PeerDescriptor) -> usize {
        let mut cleared = 0;
        for entry in &self.entries {
            let mut slot = entry.lock().await;
            if slot.as_ref() == Some(node) {
                *slot = None;
                cleared += 1;
            }
        }
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Finds a name hashing to `value` so fingers can sit at chosen positions.
    fn peer_at(space: &IdSpace, value: u64) -> PeerDescriptor {
        let name = (0u32..)
            .map(|i| format!("peer-{}", i))
            .find(|name| space.identifier_of(name).value() == value)
            .unwrap();
        PeerDescriptor::new(name, "127.0.0.1", 1, space).unwrap()
    }

    #[tokio::test]
    async fn finger_starts_follow_powers_of_two() {
        let space = IdSpace::new(8).unwrap();
        let owner = space.identifier(250).unwrap();
        let table = FingerTable::new(owner, &space);
        assert_eq!(table.len(), 8);
        assert_eq!(table.start(0).value(), 251);
        assert_eq!(table.start(3).value(), 2);
        assert_eq!(table.start(7).value(), 122);
    }

    #[tokio::test]
    async fn preceding_scans_from_the_highest_finger() {
        let space = IdSpace::new(8).unwrap();
        let table = FingerTable::new(space.identifier(10).unwrap(), &space);
        let near = peer_at(&space, 12);
        let far = peer_at(&space, 140);
        table.set(0, Some(near.clone())).await;
        table.set(1, Some(near.clone())).await;
        table.set(7, Some(far.clone())).await;

        let wrapped = space.identifier(5).unwrap();
        assert_eq!(table.preceding(&wrapped).await, vec![far.clone(), near.clone()]);

        let between = space.identifier(100).unwrap();
        assert_eq!(table.preceding(&between).await, vec![near.clone()]);

        assert!(table.preceding(&near.id()).await.is_empty());
    }

    #[tokio::test]
    async fn forget_clears_every_matching_slot() {
        let space = IdSpace::new(4).unwrap();
        let table = FingerTable::new(space.identifier(0).unwrap(), &space);
        let gone = peer_at(&space, 3);
        table.set(1, Some(gone.clone())).await;
        table.set(2, Some(gone.clone())).await;
        assert_eq!(table.forget(&gone).await, 2);
        assert!(table.entries().await.iter().all(Option::is_none));
    }
}
