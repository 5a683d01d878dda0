//! Treiber stack walkthrough: single-threaded sanity, then a contended
//! throughput run.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use kilit_stack::TreiberStack;

fn main() {
    println!("Treiber stack example");
    println!("=====================\n");

    println!("Single-threaded:");
    {
        let stack = TreiberStack::new();
        stack.push(1);
        stack.push(2);
        stack.push(3);

        assert_eq!(stack.pop(), Ok(3));
        assert_eq!(stack.pop(), Ok(2));
        assert_eq!(stack.pop(), Ok(1));
        assert!(stack.pop().is_err());

        println!("push and pop work correctly.");
    }

    println!("\nMulti-threaded (8 threads, 50000 ops each):");
    {
        let stack = Arc::new(TreiberStack::new());
        let mut handles = vec![];

        let start = Instant::now();

        for thread_id in 0..8u64 {
            let stack = stack.clone();
            handles.push(thread::spawn(move || {
                for i in 0..50_000u64 {
                    if i % 3 == 0 {
                        stack.push(thread_id * 50_000 + i);
                    } else {
                        let _ = stack.pop();
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let elapsed = start.elapsed();
        let total_ops = 8 * 50_000;
        let ops_per_sec = total_ops as f64 / elapsed.as_secs_f64();

        println!("completed {} operations in {:?}", total_ops, elapsed);
        println!("throughput: {:.0} ops/sec", ops_per_sec);
    }

    println!("\nDone.");
}
