//! End-to-end scenarios S1-S6 from `spec.md` §8, plus S7/S8 covering
//! multiple `write` calls batched into one `open`/`close` cycle.

use ah5rs::{Instance, TypeId};
use pretty_assertions::assert_eq;

fn h5_path(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
    dir.path().join(name)
}

#[test]
fn s1_single_scalar() {
    let dir = tempfile::tempdir().unwrap();
    let path = h5_path(&dir, "s.h5");

    let mut instance = Instance::init().unwrap();
    let x = 3.5f64;
    instance.open(path.to_str().unwrap()).unwrap();
    instance
        .write(
            (&x as *const f64).cast(),
            "x",
            TypeId::of::<f64>().unwrap(),
            0,
            &[],
            &[],
            &[],
        )
        .unwrap();
    instance.close().unwrap();
    instance.finalize().unwrap();

    let file = hdf5::File::open(&path).unwrap();
    let dataset = file.dataset("x").unwrap();
    assert_eq!(dataset.shape(), vec![1]);
    let values: Vec<f64> = dataset.read_raw().unwrap();
    assert_eq!(values, vec![3.5]);
}

#[test]
fn s2_dense_2d_array() {
    let dir = tempfile::tempdir().unwrap();
    let path = h5_path(&dir, "dense.h5");

    let mut instance = Instance::init().unwrap();
    let values: Vec<f64> = (0..12).map(|i| i as f64).collect();

    instance.open(path.to_str().unwrap()).unwrap();
    instance
        .write(
            values.as_ptr().cast(),
            "a",
            TypeId::of::<f64>().unwrap(),
            2,
            &[4, 3],
            &[0, 0],
            &[4, 3],
        )
        .unwrap();
    instance.close().unwrap();
    instance.finalize().unwrap();

    let file = hdf5::File::open(&path).unwrap();
    let dataset = file.dataset("a").unwrap();
    assert_eq!(dataset.shape(), vec![4, 3]);
    let read: Vec<f64> = dataset.read_raw().unwrap();
    assert_eq!(read, values);
}

#[test]
fn s3_strided_slice() {
    let dir = tempfile::tempdir().unwrap();
    let path = h5_path(&dir, "strided.h5");

    let src: Vec<f64> = (0..64)
        .map(|i| {
            let r = i / 8;
            let c = i % 8;
            (10 * r + c) as f64
        })
        .collect();

    let mut instance = Instance::init().unwrap();
    instance.open(path.to_str().unwrap()).unwrap();
    instance
        .write(
            src.as_ptr().cast(),
            "slice",
            TypeId::of::<f64>().unwrap(),
            2,
            &[8, 8],
            &[2, 3],
            &[5, 6],
        )
        .unwrap();
    instance.close().unwrap();
    instance.finalize().unwrap();

    let file = hdf5::File::open(&path).unwrap();
    let dataset = file.dataset("slice").unwrap();
    assert_eq!(dataset.shape(), vec![3, 3]);
    let read: Vec<f64> = dataset.read_raw().unwrap();
    assert_eq!(read, vec![23.0, 24.0, 25.0, 33.0, 34.0, 35.0, 43.0, 44.0, 45.0]);
}

#[test]
fn s4_pipelined_stencil_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let mut instance = Instance::init().unwrap();
    let mut grid = vec![0.0f64; 16];

    let mut expected_snapshots = Vec::new();

    for iteration in 0..100 {
        if iteration % 10 == 0 {
            let path = h5_path(&dir, &format!("snap_{iteration:03}.h5"));
            instance.open(path.to_str().unwrap()).unwrap();
            instance
                .write(
                    grid.as_ptr().cast(),
                    "g",
                    TypeId::of::<f64>().unwrap(),
                    1,
                    &[16],
                    &[0],
                    &[16],
                )
                .unwrap();
            instance.close().unwrap();
            expected_snapshots.push((path, grid.clone()));
        }
        // mutate the buffer right after `close` returns, exercising the
        // producer-memory contract of `spec.md` §5.
        for v in grid.iter_mut() {
            *v += 1.0;
        }
    }

    instance.finalize().unwrap();

    assert_eq!(expected_snapshots.len(), 10);
    for (path, expected) in expected_snapshots {
        let file = hdf5::File::open(&path).unwrap();
        let dataset = file.dataset("g").unwrap();
        let read: Vec<f64> = dataset.read_raw().unwrap();
        assert_eq!(read, expected);
    }
}

#[test]
fn s5_fixed_staging_overflow_falls_back_to_synchronous_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = h5_path(&dir, "overflow.h5");

    // 1 KiB capacity, first write demands 2 KiB of f64 data.
    let mut instance = Instance::init_mem(None, 1024).unwrap();
    let big: Vec<f64> = (0..256).map(|i| i as f64).collect(); // 2048 bytes

    instance.open(path.to_str().unwrap()).unwrap();
    instance
        .write(
            big.as_ptr().cast(),
            "big",
            TypeId::of::<f64>().unwrap(),
            1,
            &[256],
            &[0],
            &[256],
        )
        .unwrap();
    instance.close().unwrap();
    instance.finalize().unwrap();

    let file = hdf5::File::open(&path).unwrap();
    let dataset = file.dataset("big").unwrap();
    let read: Vec<f64> = dataset.read_raw().unwrap();
    assert_eq!(read, big);
}

#[test]
fn s6_finalize_blocks_until_flushed() {
    let dir = tempfile::tempdir().unwrap();
    let path = h5_path(&dir, "graceful.h5");

    let mut instance = Instance::init().unwrap();
    let x = 7.0f64;
    instance.open(path.to_str().unwrap()).unwrap();
    instance
        .write(
            (&x as *const f64).cast(),
            "x",
            TypeId::of::<f64>().unwrap(),
            0,
            &[],
            &[],
            &[],
        )
        .unwrap();
    instance.close().unwrap();
    instance.finalize().unwrap();

    assert!(path.exists());
    let file = hdf5::File::open(&path).unwrap();
    assert!(file.dataset("x").is_ok());
}

#[test]
fn s7_multiple_writes_in_one_cycle_land_as_distinct_datasets() {
    // Testable Property #1: the number of datasets in the finished file
    // equals the number of `write` calls between `open` and `close`, each
    // holding the data passed to its own call.
    let dir = tempfile::tempdir().unwrap();
    let path = h5_path(&dir, "multi.h5");

    let a = [1.0f64, 2.0];
    let b = [10.0f64, 20.0, 30.0];
    let c = 99.0f64;

    let mut instance = Instance::init().unwrap();
    instance.open(path.to_str().unwrap()).unwrap();
    instance
        .write(a.as_ptr().cast(), "a", TypeId::of::<f64>().unwrap(), 1, &[2], &[0], &[2])
        .unwrap();
    instance
        .write(b.as_ptr().cast(), "b", TypeId::of::<f64>().unwrap(), 1, &[3], &[0], &[3])
        .unwrap();
    instance
        .write((&c as *const f64).cast(), "c", TypeId::of::<f64>().unwrap(), 0, &[], &[], &[])
        .unwrap();
    instance.close().unwrap();
    instance.finalize().unwrap();

    let file = hdf5::File::open(&path).unwrap();
    assert_eq!(file.member_names().unwrap().len(), 3);
    let read_a: Vec<f64> = file.dataset("a").unwrap().read_raw().unwrap();
    assert_eq!(read_a, a.to_vec());
    let read_b: Vec<f64> = file.dataset("b").unwrap().read_raw().unwrap();
    assert_eq!(read_b, b.to_vec());
    let read_c: Vec<f64> = file.dataset("c").unwrap().read_raw().unwrap();
    assert_eq!(read_c, vec![c]);
}

#[test]
fn s8_partial_capacity_forces_whole_cycle_synchronous_fallback() {
    // A fixed-capacity staging buffer that can hold the first record but
    // not the second must fall the *entire* cycle back to synchronous
    // writes, not just the overflowing record — otherwise the dataset
    // that lands during `close` (synchronous) would precede on disk the
    // one the worker drains later (staged), inverting `write` call order.
    let dir = tempfile::tempdir().unwrap();
    let path = h5_path(&dir, "partial_overflow.h5");

    let first = [1.0f64, 2.0, 3.0, 4.0]; // 32 bytes
    let second: Vec<f64> = (0..256).map(|i| i as f64).collect(); // 2048 bytes

    let mut instance = Instance::init_mem(None, 64).unwrap();
    instance.open(path.to_str().unwrap()).unwrap();
    instance
        .write(first.as_ptr().cast(), "first", TypeId::of::<f64>().unwrap(), 1, &[4], &[0], &[4])
        .unwrap();
    instance
        .write(
            second.as_ptr().cast(),
            "second",
            TypeId::of::<f64>().unwrap(),
            1,
            &[256],
            &[0],
            &[256],
        )
        .unwrap();
    instance.close().unwrap();
    instance.finalize().unwrap();

    let file = hdf5::File::open(&path).unwrap();
    let read_first: Vec<f64> = file.dataset("first").unwrap().read_raw().unwrap();
    assert_eq!(read_first, first.to_vec());
    let read_second: Vec<f64> = file.dataset("second").unwrap().read_raw().unwrap();
    assert_eq!(read_second, second);
}
