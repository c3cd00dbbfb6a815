//! Stencil-loop driver demonstrating the non-blocking façade.
//!
//! Out of scope per `spec.md` §1 (the numerics of the stencil itself are
//! an external collaborator), but a runnable illustration of how a
//! simulation loop is expected to use [`ah5rs::Instance`]: open, write the
//! live buffer, close, and keep iterating without waiting for the write to
//! land on disk.

use ah5rs::{Instance, TypeId};

const ROWS: usize = 32;
const COLS: usize = 32;
const ITERATIONS: usize = 100;
const OUTPUT_EVERY: usize = 10;

fn step(grid: &mut [f64]) {
    let mut next = grid.to_vec();
    for r in 1..ROWS - 1 {
        for c in 1..COLS - 1 {
            let i = r * COLS + c;
            next[i] = 0.25
                * (grid[i - COLS] + grid[i + COLS] + grid[i - 1] + grid[i + 1]);
        }
    }
    grid.copy_from_slice(&next);
}

fn main() -> ah5rs::Result<()> {
    let mut instance = Instance::init()?;
    let mut grid = vec![0.0f64; ROWS * COLS];
    grid[ROWS / 2 * COLS + COLS / 2] = 1.0;

    for iteration in 0..ITERATIONS {
        if iteration % OUTPUT_EVERY == 0 {
            let name = format!("stencil_{iteration:04}.h5");
            instance.open(&name)?;
            instance.write(
                grid.as_ptr().cast(),
                "temperature",
                TypeId::of::<f64>()?,
                2,
                &[ROWS, COLS],
                &[0, 0],
                &[ROWS, COLS],
            )?;
            instance.close()?;
            // `grid` may be mutated immediately: `close` has already
            // snapshotted it into the staging buffer.
        }
        step(&mut grid);
    }

    instance.finalize()?;
    Ok(())
}
