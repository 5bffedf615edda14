/*
 * Memory Management
 *
 * Two independent allocators live here:
 *  - `heap`: a general-purpose `linked_list_allocator` heap backing `Box`,
 *    `Vec`, `BTreeMap` and `VecDeque` used throughout the scheduler's
 *    bookkeeping (ready queue, sleeping queue, thread registry).
 *  - `pages`: a small fixed-size pool standing in for the external
 *    `page_alloc_zeroed`/`page_free` contract the scheduling core is
 *    written against, used only for thread stacks.
 *
 * Neither paging nor a physical frame allocator is implemented: both are
 * boot-glue/platform concerns out of scope for the scheduling core, and the
 * static pools below don't need them on the flat-mapped boot environment
 * this kernel targets.
 */

pub mod heap;
pub mod pages;

/// Top-level memory initialization, called once from `kstart` before the
/// scheduler starts.
pub fn init() {
    log::info!("Initializing memory management...");
    heap::init();
    pages::init();
    log::info!("Memory management initialized");
}
