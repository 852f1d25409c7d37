use super::*;
use crate::device::DeviceMemory;
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;
use std::sync::mpsc;
use std::time::Duration;
use tempfile::NamedTempFile;

fn identity_model(size: u32) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_u32::<LittleEndian>(1).unwrap();
    file.write_u32::<LittleEndian>(size).unwrap();
    file.write_u32::<LittleEndian>(size).unwrap();
    for i in 0..size * size {
        let value = if i / size == i % size { 1.0 } else { 0.0 };
        file.write_f32::<LittleEndian>(value).unwrap();
    }
    file.flush().unwrap();
    file
}

fn spawn_worker() -> EngineWorker {
    EngineWorker::spawn(InferenceEngine::with_device(Backend::Cpu, DeviceMemory::emulated())).unwrap()
}

#[test]
fn test_load_then_generate_through_worker() {
    let model = identity_model(3);
    let worker = spawn_worker();

    assert!(worker.submit_load(model.path()).unwrap().recv().unwrap());
    let text = worker.submit_generate("A", 5, 0.8).unwrap().recv().unwrap().unwrap();

    assert_eq!(text.len(), 6);
    assert!(text.starts_with('A'));
}

#[test]
fn test_failed_load_is_reported() {
    let worker = spawn_worker();
    assert!(!worker.submit_load("/nonexistent/model.bin").unwrap().recv().unwrap());
    assert!(worker.submit_generate("A", 1, 0.8).unwrap().recv().unwrap().is_err());
}

#[test]
fn test_callback_receives_result() {
    let model = identity_model(3);
    let worker = spawn_worker();
    worker.submit_load(model.path()).unwrap().recv().unwrap();

    let (sender, receiver) = mpsc::channel();
    worker
        .generate_with_callback("hey", 2, 0.8, move |result| {
            sender.send(result.map(|text| text.len())).unwrap();
        })
        .unwrap();

    let length = receiver.recv_timeout(Duration::from_secs(10)).unwrap().unwrap();
    assert_eq!(length, 5);
}

#[test]
fn test_requests_are_served_in_order() {
    let model = identity_model(3);
    let worker = spawn_worker();
    let loaded = worker.submit_load(model.path()).unwrap();
    let replies = (0..4).map(|n| worker.submit_generate("A", n, 0.8).unwrap()).collect::<Vec<_>>();

    assert!(loaded.recv().unwrap());
    for (n, reply) in replies.into_iter().enumerate() {
        assert_eq!(reply.recv().unwrap().unwrap().len(), 1 + n);
    }
}

#[test]
fn test_set_backend_and_device_info() {
    let worker = spawn_worker();
    assert!(worker.device_info().unwrap().starts_with("CPU"));

    worker.set_backend(Backend::GpuMetal).unwrap();
    assert!(worker.device_info().unwrap().starts_with("GPU_METAL"));
}

#[test]
fn test_shutdown_returns_engine() {
    let model = identity_model(2);
    let worker = spawn_worker();
    worker.submit_load(model.path()).unwrap().recv().unwrap();

    let engine = worker.shutdown().unwrap();
    assert_eq!(engine.layer_count(), 1);
}

#[test]
fn test_dropped_receivers_do_not_stop_worker() {
    let model = identity_model(2);
    let worker = spawn_worker();

    drop(worker.submit_load(model.path()).unwrap());
    drop(worker.submit_generate("A", 1, 0.8).unwrap());

    assert!(worker.device_info().unwrap().starts_with("CPU"));
    assert_eq!(worker.shutdown().unwrap().layer_count(), 1);
}

#[test]
fn test_worker_generate_keeps_high_bytes() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_u32::<LittleEndian>(1).unwrap();
    file.write_u32::<LittleEndian>(200).unwrap();
    file.write_u32::<LittleEndian>(1).unwrap();
    for i in 0..200 {
        file.write_f32::<LittleEndian>(if i == 199 { 5.0 } else { 0.0 }).unwrap();
    }
    file.flush().unwrap();

    let worker = spawn_worker();
    assert!(worker.submit_load(file.path()).unwrap().recv().unwrap());

    let text = worker.submit_generate("hi", 3, 0.8).unwrap().recv().unwrap().unwrap();
    assert_eq!(text, "hi\u{C7}\u{C7}\u{C7}");
}
