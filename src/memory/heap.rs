/*
 * Kernel Heap Allocator
 *
 * General-purpose dynamic memory for the kernel's own bookkeeping (`Box`,
 * `Vec`, `BTreeMap`, `VecDeque`): the scheduler's ready queue, sleeping
 * queue and thread registry are all built on these. Backed by
 * `linked_list_allocator` over a static array rather than a mapped,
 * page-allocator-backed region, since this kernel never sets up paging --
 * it runs identity-mapped by its bootloader.
 */

use linked_list_allocator::LockedHeap;

/// Size of the kernel heap in bytes.
pub const HEAP_SIZE: usize = 4 * 1024 * 1024;

#[repr(align(16))]
struct HeapArea([u8; HEAP_SIZE]);

static mut HEAP_AREA: HeapArea = HeapArea([0; HEAP_SIZE]);

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Initialize the kernel heap. Must be called exactly once, before any
/// `alloc`-backed collection is used.
pub fn init() {
    log::info!("Initializing kernel heap ({} KiB)...", HEAP_SIZE / 1024);
    unsafe {
        let base = (&raw mut HEAP_AREA) as *mut u8;
        ALLOCATOR.lock().init(base, HEAP_SIZE);
    }
    log::info!("Kernel heap initialized");
}

#[alloc_error_handler]
fn alloc_error(layout: core::alloc::Layout) -> ! {
    panic!("kernel heap allocation failed: {:?}", layout);
}
