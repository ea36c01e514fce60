/*
 * Memory Management
 *
 * The scheduler core only needs one service from memory management: a
 * heap to back the `Box`/`Vec` allocations a TCB, its donation/acquired-
 * lock lists, and child-info records require. Physical frame allocation,
 * paging, and the supplemental page table belong to the user-process
 * layer this crate doesn't implement (external collaborator per spec's
 * scope), so only the heap is built here.
 */

pub mod heap;

pub fn init() {
    heap::init();
}
