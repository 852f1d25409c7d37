use super::*;
use crate::device::DeviceMemory;
use crate::error::{DeviceError, KernelError};

const TOLERANCE: f32 = 1e-5;

/// Deterministic values in [-1, 1).
fn pseudo_random(len: usize, seed: u64) -> Vec<f32> {
    let mut state = seed.max(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state % 2000) as f32 / 1000.0 - 1.0
        })
        .collect()
}

fn naive_matmul(a: &[f32], b: &[f32], m: usize, n: usize, k: usize) -> Vec<f32> {
    let mut c = vec![0.0f32; m * n];
    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0f32;
            for p in 0..k {
                sum += a[i * k + p] * b[p * n + j];
            }
            c[i * n + j] = sum;
        }
    }
    c
}

fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (idx, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() < TOLERANCE, "mismatch at {idx}: {a} vs {e}");
    }
}

#[test]
fn test_matmul_matches_triple_loop() {
    for &(m, n, k) in &[(1, 1, 1), (1, 7, 3), (3, 4, 5), (8, 2, 16), (5, 5, 1)] {
        let a = pseudo_random(m * k, 7 + m as u64);
        let b = pseudo_random(k * n, 11 + n as u64);
        let mut c = vec![f32::NAN; m * n];

        matmul(&a, &b, &mut c, m, n, k).unwrap();

        assert_close(&c, &naive_matmul(&a, &b, m, n, k));
    }
}

#[test]
fn test_matmul_known_values() {
    // [1 2] · [[1 2 3], [4 5 6]] = [9 12 15]
    let a = [1.0, 2.0];
    let b = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let mut c = [0.0; 3];

    matmul(&a, &b, &mut c, 1, 3, 2).unwrap();

    assert_eq!(c, [9.0, 12.0, 15.0]);
}

#[test]
fn test_matmul_rejects_short_buffers() {
    let mut c = [0.0; 4];
    let err = matmul(&[1.0; 3], &[1.0; 8], &mut c, 2, 2, 2).unwrap_err();
    assert_eq!(err, KernelError::BufferTooSmall { name: "A", needed: 4, actual: 3 });

    let err = matmul(&[1.0; 4], &[1.0; 4], &mut c[..3], 2, 2, 2).unwrap_err();
    assert_eq!(err, KernelError::BufferTooSmall { name: "C", needed: 4, actual: 3 });
}

#[test]
fn test_softmax_sums_to_one_and_is_shift_invariant() {
    let values = pseudo_random(33, 3).into_iter().map(|v| v * 10.0).collect::<Vec<_>>();

    let mut probs = values.clone();
    softmax(&mut probs).unwrap();
    assert!((probs.iter().sum::<f32>() - 1.0).abs() < TOLERANCE);

    let mut shifted = values.iter().map(|v| v + 42.5).collect::<Vec<_>>();
    softmax(&mut shifted).unwrap();
    assert_close(&shifted, &probs);
}

#[test]
fn test_softmax_single_element() {
    let mut x = [-3.5];
    softmax(&mut x).unwrap();
    assert_eq!(x, [1.0]);
}

#[test]
fn test_softmax_empty_is_an_error() {
    assert_eq!(softmax(&mut []), Err(KernelError::EmptySoftmax));
}

#[test]
fn test_softmax_underflow_and_nan() {
    let mut x = [0.0, -1000.0];
    softmax(&mut x).unwrap();
    assert_eq!(x, [1.0, 0.0]);

    let mut x = [1.0, f32::NAN, 2.0];
    softmax(&mut x).unwrap();
    assert!(x.iter().all(|v| v.is_nan()));
}

#[test]
fn test_softmax_parallel_path() {
    let mut x = pseudo_random(10_000, 5);
    softmax(&mut x).unwrap();
    assert!((x.iter().sum::<f32>() - 1.0).abs() < 1e-3);
    assert!(x.iter().all(|&v| v > 0.0));
}

#[test]
fn test_argmax_picks_first_maximum() {
    assert_eq!(argmax(&[0.1, 0.7, 0.2, 0.7]), 1);
    assert_eq!(argmax(&[f32::NAN, 0.3, 0.1]), 1);
    assert_eq!(argmax(&[0.5]), 0);
}

#[test]
fn test_host_kernels_dispatch() {
    let weight = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![3, 2]).unwrap();
    let mut c = [0.0; 3];

    HostKernels.matmul(&[1.0, 2.0], &weight, &mut c, 1, 3, 2).unwrap();

    assert_eq!(c, [9.0, 12.0, 15.0]);
    assert_eq!(HostKernels.name(), "host");
}

#[test]
fn test_device_matmul_matches_host() {
    let memory = DeviceMemory::emulated();
    let kernels = DeviceKernels::new(memory.clone());
    let (m, n, k) = (2, 6, 4);

    let a = pseudo_random(m * k, 17);
    let mut weight = Tensor::new(pseudo_random(k * n, 19), vec![n, k]).unwrap();
    weight.upload(&memory).unwrap();

    let mut on_device = vec![0.0; m * n];
    kernels.matmul(&a, &weight, &mut on_device, m, n, k).unwrap();

    let mut on_host = vec![0.0; m * n];
    matmul(&a, weight.data(), &mut on_host, m, n, k).unwrap();

    assert_close(&on_device, &on_host);
    // Only the weight mirror survives the launch.
    assert_eq!(memory.stats().allocations, 1);
    assert!(memory.stats().peak_bytes > weight.total_elements() * 4);
}

#[test]
fn test_device_matmul_falls_back_without_mirror() {
    let memory = DeviceMemory::emulated();
    let kernels = DeviceKernels::new(memory.clone());
    let weight = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![3, 2]).unwrap();
    let mut c = [0.0; 3];

    kernels.matmul(&[1.0, 2.0], &weight, &mut c, 1, 3, 2).unwrap();

    assert_eq!(c, [9.0, 12.0, 15.0]);
    assert_eq!(memory.stats().peak_bytes, 0);
}

#[test]
fn test_device_matmul_rejects_foreign_buffer() {
    let kernels = DeviceKernels::new(DeviceMemory::emulated());
    let mut weight = Tensor::new(vec![1.0; 4], vec![2, 2]).unwrap();
    weight.upload(&DeviceMemory::emulated()).unwrap();
    let mut c = [0.0; 2];

    let err = kernels.matmul(&[1.0, 1.0], &weight, &mut c, 1, 2, 2).unwrap_err();

    assert!(matches!(err.downcast_ref::<DeviceError>(), Some(DeviceError::InvalidHandle(_))));
}

#[test]
fn test_device_softmax_matches_host() {
    let kernels = DeviceKernels::new(DeviceMemory::emulated());
    let values = pseudo_random(9, 23);

    let mut on_device = values.clone();
    kernels.softmax(&mut on_device).unwrap();
    let mut on_host = values;
    softmax(&mut on_host).unwrap();

    assert_close(&on_device, &on_host);
    assert!(matches!(
        kernels.softmax(&mut []).unwrap_err().downcast_ref::<KernelError>(),
        Some(KernelError::EmptySoftmax)
    ));
}
