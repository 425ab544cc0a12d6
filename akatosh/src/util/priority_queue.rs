//! Associative priority queue.

use std::mem;

/// An associative container optimized for extraction of the value with the
/// lowest key and deletion of arbitrary key-value pairs.
///
/// The kernel uses two such queues: the future pool index, keyed by event
/// time, and the ready pool, keyed by event priority. In both cases
/// same-key values are pulled in insertion order, which makes the execution
/// order reproducible from one run to the next.
///
/// Under the hood, the queue is a binary heap cross-indexed with values stored
/// in a slab. Each heap item holds the index of its slab node together with
/// the user-provided key and a unique insertion epoch; each slab node holds
/// the value and a back-pointing index to the heap. The epoch is used both to
/// break ties between equal keys and to build [`InsertKey`]s, with which an
/// arbitrary value can be deleted in *O*(log(*N*)) time.
pub(crate) struct PriorityQueue<K, V>
where
    K: Copy + Clone + Ord,
{
    heap: Vec<Item<K>>,
    slab: Vec<Node<V>>,
    first_free_node: Option<usize>,
    next_epoch: u64,
}

impl<K: Copy + Ord, V> PriorityQueue<K, V> {
    /// Creates an empty `PriorityQueue`.
    pub(crate) fn new() -> Self {
        Self {
            heap: Vec::new(),
            slab: Vec::new(),
            first_free_node: None,
            next_epoch: 0,
        }
    }

    /// Returns the number of key-value pairs in the priority queue.
    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns `true` if the queue holds no value.
    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Inserts a new key-value pair and returns a unique insertion key.
    pub(crate) fn insert(&mut self, key: K, value: V) -> InsertKey {
        let epoch = self.next_epoch;
        assert_ne!(epoch, u64::MAX);
        self.next_epoch += 1;

        // Re-use a free slab node if possible.
        let node = Node::Occupied {
            value,
            heap_idx: 0, // overwritten by `sift_up`
        };
        let slab_idx = match self.first_free_node {
            Some(idx) => {
                self.first_free_node = self.slab[idx].next_free_node();
                self.slab[idx] = node;

                idx
            }
            None => {
                self.slab.push(node);

                self.slab.len() - 1
            }
        };

        // Append a placeholder at the bottom of the heap and sift the new item
        // up from there.
        let item = Item {
            key: UniqueKey { key, epoch },
            slab_idx,
        };
        let heap_idx = self.heap.len();
        self.heap.push(item);
        self.sift_up(item, heap_idx);

        InsertKey { slab_idx, epoch }
    }

    /// Pulls the value with the lowest key.
    ///
    /// If there are several equal lowest keys, the value which was inserted
    /// first is returned.
    pub(crate) fn pull(&mut self) -> Option<(K, V)> {
        let top = *self.heap.first()?;
        let value = self.free_node(top.slab_idx);

        // Move the last item of the heap to the top and sift it down.
        let last_item = self.heap.pop()?;
        if last_item.slab_idx != top.slab_idx {
            self.sift_down(last_item, 0);
        }

        Some((top.key.key, value))
    }

    /// Peeks a reference to the key-value pair with the lowest key, leaving it
    /// in the queue.
    #[allow(dead_code)]
    pub(crate) fn peek(&self) -> Option<(&K, &V)> {
        let item = self.heap.first()?;

        Some((&item.key.key, self.slab[item.slab_idx].value_ref()))
    }

    /// Peeks a reference to the lowest key, leaving it in the queue.
    pub(crate) fn peek_key(&self) -> Option<&K> {
        self.heap.first().map(|item| &item.key.key)
    }

    /// Deletes the key-value pair associated to the provided insertion key if
    /// it is still in the queue and returns its value.
    ///
    /// Using an insertion key returned from another `PriorityQueue` is a logic
    /// error and could result in the deletion of an arbitrary key-value pair.
    pub(crate) fn delete(&mut self, insert_key: InsertKey) -> Option<V> {
        // The node must be occupied and carry the same epoch.
        let slab_idx = insert_key.slab_idx;
        let heap_idx = match self.slab.get(slab_idx) {
            Some(Node::Occupied { heap_idx, .. })
                if self.heap[*heap_idx].key.epoch == insert_key.epoch =>
            {
                *heap_idx
            }
            _ => return None,
        };

        // Fill the vacant spot with the last heap item, unless the deleted item
        // was the last one.
        let last_item = self.heap.pop()?;
        if let Some(item) = self.heap.get(heap_idx) {
            if last_item.key < item.key {
                self.sift_up(last_item, heap_idx);
            } else {
                self.sift_down(last_item, heap_idx);
            }
        }

        Some(self.free_node(slab_idx))
    }

    /// Releases a slab node and returns its value.
    fn free_node(&mut self, slab_idx: usize) -> V {
        let node = mem::replace(
            &mut self.slab[slab_idx],
            Node::Free {
                next: self.first_free_node,
            },
        );
        self.first_free_node = Some(slab_idx);

        node.into_value()
    }

    /// Takes a heap item and, starting at `heap_idx`, moves it up the heap
    /// while a parent has a larger key.
    #[inline]
    fn sift_up(&mut self, item: Item<K>, heap_idx: usize) {
        let mut child_heap_idx = heap_idx;

        while child_heap_idx != 0 {
            let parent_heap_idx = (child_heap_idx - 1) / 2;
            let parent = self.heap[parent_heap_idx];
            if item.key >= parent.key {
                break;
            }

            // Move the parent down one level.
            self.heap[child_heap_idx] = parent;
            self.slab[parent.slab_idx].set_heap_idx(child_heap_idx);
            child_heap_idx = parent_heap_idx;
        }

        self.heap[child_heap_idx] = item;
        self.slab[item.slab_idx].set_heap_idx(child_heap_idx);
    }

    /// Takes a heap item and, starting at `heap_idx`, moves it down the heap
    /// while a child has a smaller key.
    #[inline]
    fn sift_down(&mut self, item: Item<K>, heap_idx: usize) {
        let mut parent_heap_idx = heap_idx;
        let mut child_heap_idx = 2 * parent_heap_idx + 1;

        while child_heap_idx < self.heap.len() {
            // Pick the child with the smallest key.
            if let Some(sibling) = self.heap.get(child_heap_idx + 1) {
                child_heap_idx += (self.heap[child_heap_idx].key > sibling.key) as usize;
            }
            let child = self.heap[child_heap_idx];
            if item.key <= child.key {
                break;
            }

            // Move the child up one level.
            self.heap[parent_heap_idx] = child;
            self.slab[child.slab_idx].set_heap_idx(parent_heap_idx);
            parent_heap_idx = child_heap_idx;
            child_heap_idx = 2 * parent_heap_idx + 1;
        }

        self.heap[parent_heap_idx] = item;
        self.slab[item.slab_idx].set_heap_idx(parent_heap_idx);
    }
}

/// A heap item.
#[derive(Copy, Clone)]
struct Item<K: Copy> {
    key: UniqueKey<K>,
    slab_idx: usize,
}

/// A slab node.
enum Node<V> {
    Free { next: Option<usize> },
    Occupied { value: V, heap_idx: usize },
}

impl<V> Node<V> {
    fn next_free_node(&self) -> Option<usize> {
        match self {
            Self::Free { next } => *next,
            Self::Occupied { .. } => panic!("the node was expected to be a free node"),
        }
    }

    fn into_value(self) -> V {
        match self {
            Self::Occupied { value, .. } => value,
            Self::Free { .. } => panic!("the node was expected to be an occupied node"),
        }
    }

    fn value_ref(&self) -> &V {
        match self {
            Self::Occupied { value, .. } => value,
            Self::Free { .. } => panic!("the node was expected to be an occupied node"),
        }
    }

    fn set_heap_idx(&mut self, idx: usize) {
        match self {
            Self::Occupied { heap_idx, .. } => *heap_idx = idx,
            Self::Free { .. } => panic!("the node was expected to be an occupied node"),
        }
    }
}

/// A unique insertion key that can be used for key-value pair deletion.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub(crate) struct InsertKey {
    slab_idx: usize,
    epoch: u64,
}

/// The user-provided key complemented by a unique epoch.
///
/// The derived ordering is lexicographic, so `key` sorts before `epoch`.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct UniqueKey<K: Copy + Clone> {
    key: K,
    epoch: u64,
}
