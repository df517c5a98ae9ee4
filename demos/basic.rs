//! Allocate, write, resize and free through the mapped backing store.
//!
//! Run with `RUST_LOG=debug` to watch the backing store grow.

use fitalloc::{Allocator, MmapStore, Strategy};

fn main() {
    env_logger::init();

    let mut heap = Allocator::new(MmapStore::new(), Strategy::FirstFit);

    let msg = b"hello from the arena";
    let ptr = heap.alloc(msg.len()).expect("allocation failed");
    unsafe {
        ptr.as_ptr().copy_from_nonoverlapping(msg.as_ptr(), msg.len());
        println!("wrote {} bytes at {:p}", msg.len(), ptr);
        println!("heap extent: {:p}", heap.heap_extent());

        let bigger = heap
            .realloc(ptr.as_ptr(), 4096)
            .expect("reallocation failed");
        println!("moved to {bigger:p}");

        heap.free(bigger).expect("free failed");
    }

    println!("{:#?}", heap.stats());
}
