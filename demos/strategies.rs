//! Runs the same allocation workload under each fit strategy on a bounded
//! arena and prints the resulting heap shape for comparison.

use fitalloc::{Allocator, FixedStore, Strategy, UNIT};

fn churn(strategy: Strategy) {
    let mut heap = Allocator::new(FixedStore::with_capacity(1 << 16), strategy);

    let sizes = [24usize, 180, 64, 512, 96, 48, 300, 24, 128, 700];
    let mut live = Vec::new();

    // A few rounds of mixed allocation with every other block freed, the
    // classic recipe for fragmentation.
    for round in 0..8 {
        for (i, &size) in sizes.iter().enumerate() {
            let ptr = heap.alloc(size + round * UNIT).expect("allocation failed");
            if i % 2 == 0 {
                live.push(ptr);
            } else {
                unsafe { heap.free(ptr.as_ptr()).expect("free failed") };
            }
        }
    }
    for ptr in live.drain(..) {
        unsafe { heap.free(ptr.as_ptr()).expect("free failed") };
    }

    let stats = heap.stats();
    println!("{strategy:?}:");
    println!("  granted: {} units", stats.granted_units);
    println!(
        "  primary list: {} blocks / {} units",
        stats.free_blocks, stats.free_units
    );
    println!(
        "  quick lists:  {} blocks / {} units",
        stats.quick_blocks, stats.quick_units
    );
}

fn main() {
    env_logger::init();

    for strategy in [Strategy::FirstFit, Strategy::BestFit, Strategy::QuickFit] {
        churn(strategy);
    }
}
