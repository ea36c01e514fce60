/*
 * Kernel Heap Allocator
 *
 * Backs Rust's `alloc` APIs (`Box`, `Vec`, `BTreeMap`, ...) with a
 * statically-reserved region of kernel BSS, handed to
 * `linked_list_allocator` once at boot. No paging subsystem is in scope
 * here, so there is no virtual-to-physical mapping step: the backing
 * array is already mapped identity-linearly by the kernel's own load
 * segment, same as `BSS_STACK` in `main.rs`.
 */

use linked_list_allocator::LockedHeap;

/// 8 MiB: enough for several hundred thread stacks/TCBs plus the
/// scheduler's BTreeMap and ready-queue bookkeeping.
pub const HEAP_SIZE: usize = 8 * 1024 * 1024;

#[repr(align(4096))]
struct HeapStorage([u8; HEAP_SIZE]);

static mut HEAP_STORAGE: HeapStorage = HeapStorage([0; HEAP_SIZE]);

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Initializes the kernel heap. Must run exactly once, before any code
/// that allocates (notably `scheduler::init`, whose idle-thread stack is
/// heap-allocated).
pub fn init() {
    unsafe {
        let start = core::ptr::addr_of_mut!(HEAP_STORAGE.0) as *mut u8;
        ALLOCATOR.lock().init(start, HEAP_SIZE);
    }
    log::info!("kernel heap initialized ({} KiB)", HEAP_SIZE / 1024);
}

#[alloc_error_handler]
fn alloc_error(layout: core::alloc::Layout) -> ! {
    panic!("kernel heap allocation failed: {:?}", layout);
}
