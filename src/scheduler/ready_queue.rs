//! Ready-thread storage for the two scheduling disciplines.
//!
//! Under plain priority scheduling, ready threads live in a single list
//! kept sorted by descending priority (insertion point found the same
//! way the reference scheduler's `list_insert_ordered` does). Under
//! MLFQS, each of the 64 priority levels gets its own FIFO bucket and
//! the highest non-empty bucket is served first; this mirrors
//! `mlfqs_ready_queues`/`max_priority_mlfqs_queue` from the same source.
//!
//! Entries carry their priority alongside the id so lookups never need
//! to call back into the scheduler's thread table (which would deadlock,
//! since the ready queue only ever changes while that table is already
//! locked).

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::vec::Vec;

use super::thread::ThreadId;
use super::{PRI_LEVELS, PRI_MAX, PRI_MIN};

enum Discipline {
    Priority(Vec<(ThreadId, i32)>),
    Mlfqs(Box<[VecDeque<ThreadId>; PRI_LEVELS]>),
}

pub struct ReadyQueue {
    discipline: Discipline,
    len: usize,
}

impl ReadyQueue {
    pub fn new(mlfqs: bool) -> Self {
        let discipline = if mlfqs {
            let buckets: Vec<VecDeque<ThreadId>> =
                (0..PRI_LEVELS).map(|_| VecDeque::new()).collect();
            let boxed: Box<[VecDeque<ThreadId>; PRI_LEVELS]> = buckets
                .into_boxed_slice()
                .try_into()
                .unwrap_or_else(|_| panic!("bucket count mismatch"));
            Discipline::Mlfqs(boxed)
        } else {
            Discipline::Priority(Vec::new())
        };
        Self { discipline, len: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_mlfqs(&self) -> bool {
        matches!(self.discipline, Discipline::Mlfqs(_))
    }

    /// Inserts a thread at `priority`. Under the priority discipline the
    /// list stays sorted descending, ties broken FIFO (new entries land
    /// after existing equal-priority ones), matching
    /// `list_insert_ordered`'s stable behavior.
    pub fn push(&mut self, id: ThreadId, priority: i32) {
        self.len += 1;
        match &mut self.discipline {
            Discipline::Priority(list) => {
                let index = list.iter().position(|&(_, p)| p < priority);
                match index {
                    Some(i) => list.insert(i, (id, priority)),
                    None => list.push((id, priority)),
                }
            }
            Discipline::Mlfqs(buckets) => {
                buckets[bucket_index(priority)].push_back(id);
            }
        }
    }

    /// Removes and returns the highest-priority ready thread, if any.
    pub fn pop_next(&mut self) -> Option<ThreadId> {
        let result = match &mut self.discipline {
            Discipline::Priority(list) => {
                if list.is_empty() {
                    None
                } else {
                    Some(list.remove(0).0)
                }
            }
            Discipline::Mlfqs(buckets) => {
                let mut found = None;
                for level in (PRI_MIN as usize..=PRI_MAX as usize).rev() {
                    if let Some(id) = buckets[level].pop_front() {
                        found = Some(id);
                        break;
                    }
                }
                found
            }
        };
        if result.is_some() {
            self.len -= 1;
        }
        result
    }

    /// Removes a specific thread from the ready structure (used when a
    /// donation boosts a ready thread's priority and it must be
    /// reinserted at its new rank).
    pub fn remove(&mut self, id: ThreadId) -> bool {
        match &mut self.discipline {
            Discipline::Priority(list) => {
                if let Some(pos) = list.iter().position(|&(t, _)| t == id) {
                    list.remove(pos);
                    self.len -= 1;
                    true
                } else {
                    false
                }
            }
            Discipline::Mlfqs(buckets) => {
                for bucket in buckets.iter_mut() {
                    if let Some(pos) = bucket.iter().position(|&t| t == id) {
                        bucket.remove(pos);
                        self.len -= 1;
                        return true;
                    }
                }
                false
            }
        }
    }

    /// Highest priority currently waiting, or `None` if empty. Used to
    /// decide whether the running thread should give way without
    /// actually dequeuing.
    pub fn max_ready_priority(&self) -> Option<i32> {
        match &self.discipline {
            Discipline::Priority(list) => list.first().map(|&(_, p)| p),
            Discipline::Mlfqs(buckets) => {
                for level in (PRI_MIN as usize..=PRI_MAX as usize).rev() {
                    if !buckets[level].is_empty() {
                        return Some(level as i32);
                    }
                }
                None
            }
        }
    }

    /// Drains every ready thread (used by `thread_update_all_priority`'s
    /// equivalent, which must recompute every ready thread's bucket).
    pub fn drain_all(&mut self) -> Vec<ThreadId> {
        let ids = match &mut self.discipline {
            Discipline::Priority(list) => list.drain(..).map(|(id, _)| id).collect(),
            Discipline::Mlfqs(buckets) => {
                let mut ids = Vec::new();
                for bucket in buckets.iter_mut() {
                    ids.extend(bucket.drain(..));
                }
                ids
            }
        };
        self.len = 0;
        ids
    }
}

fn bucket_index(priority: i32) -> usize {
    priority.clamp(PRI_MIN, PRI_MAX) as usize
}
