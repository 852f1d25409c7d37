use super::*;
use byteorder::ReadBytesExt;
use serde_json::json;
use std::io::Cursor;
use tempfile::TempDir;

/// Writes a minimal SafeTensors file holding F32 tensors.
fn write_safetensors(path: &Path, tensors: &[(&str, Vec<usize>, Vec<f32>)]) {
    let mut header = serde_json::Map::new();
    let mut data = Vec::new();

    for (name, shape, values) in tensors {
        let start = data.len();
        values.iter().for_each(|value| data.extend_from_slice(&value.to_le_bytes()));
        header.insert(name.to_string(), json!({ "dtype": "F32", "shape": shape, "data_offsets": [start, data.len()] }));
    }

    let header = serde_json::to_vec(&header).unwrap();
    let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(&data);
    std::fs::write(path, bytes).unwrap();
}

fn read_model(path: &Path) -> Vec<(u32, u32, Vec<f32>)> {
    let bytes = std::fs::read(path).unwrap();
    let mut cursor = Cursor::new(bytes);
    let count = cursor.read_u32::<LittleEndian>().unwrap();

    (0..count)
        .map(|_| {
            let rows = cursor.read_u32::<LittleEndian>().unwrap();
            let cols = cursor.read_u32::<LittleEndian>().unwrap();
            let mut data = vec![0.0; (rows * cols) as usize];
            cursor.read_f32_into::<LittleEndian>(&mut data).unwrap();
            (rows, cols, data)
        })
        .collect()
}

#[test]
fn test_layer_rejects_bad_shapes() {
    assert!(Layer::new("bias", &[4], vec![0.0; 4]).is_err());
    assert!(Layer::new("empty", &[0, 3], vec![]).is_err());
    assert!(Layer::new("short", &[2, 2], vec![1.0; 3]).is_err());

    let layer = Layer::new("fc", &[2, 3], vec![0.0; 6]).unwrap();
    assert_eq!((layer.rows, layer.cols), (2, 3));
}

#[test]
fn test_transposed_reorders_data_only() {
    // [[1, 2, 3], [4, 5, 6]]
    let layer = Layer::new("fc", &[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let transposed = layer.transposed();

    assert_eq!((transposed.rows, transposed.cols), (2, 3));
    assert_eq!(transposed.data, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
}

#[test]
fn test_write_layers_byte_layout() {
    let layers = vec![
        Layer::new("a", &[1, 2], vec![0.5, -1.0]).unwrap(),
        Layer::new("b", &[1, 1], vec![2.0]).unwrap(),
    ];

    let mut bytes = Vec::new();
    LayerFileExporter::new().write_layers(&mut bytes, &layers).unwrap();

    // count + 2 headers + 3 weights
    assert_eq!(bytes.len(), 4 + 2 * 8 + 3 * 4);
    assert_eq!(&bytes[0..4], &2u32.to_le_bytes());
    assert_eq!(&bytes[4..8], &1u32.to_le_bytes());
    assert_eq!(&bytes[8..12], &2u32.to_le_bytes());
    assert_eq!(&bytes[12..16], &0.5f32.to_le_bytes());
}

#[test]
fn test_export_without_manifest_takes_rank2_tensors_in_name_order() {
    let temp_dir = TempDir::new().unwrap();
    let model_path = temp_dir.path().join("model.safetensors");
    write_safetensors(
        &model_path,
        &[
            ("b.weight", vec![1, 2], vec![3.0, 4.0]),
            ("a.weight", vec![2, 1], vec![1.0, 2.0]),
            ("a.bias", vec![2], vec![0.0, 0.0]),
        ],
    );

    let output_path = temp_dir.path().join("model.bin");
    let count = LayerFileExporter::new().export_binary_model(&model_path, &output_path).unwrap();

    assert_eq!(count, 2);
    assert_eq!(read_model(&output_path), vec![(2, 1, vec![1.0, 2.0]), (1, 2, vec![3.0, 4.0])]);
}

#[test]
fn test_export_with_manifest_orders_and_transposes() {
    let temp_dir = TempDir::new().unwrap();
    write_safetensors(
        &temp_dir.path().join("model.safetensors"),
        &[("first", vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]), ("second", vec![1, 2], vec![5.0, 6.0])],
    );
    std::fs::write(temp_dir.path().join(MANIFEST), r#"{ "layers": ["second", "first"], "transpose": true }"#).unwrap();

    let output_path = temp_dir.path().join("model.bin");
    LayerFileExporter::new().export_binary_model(temp_dir.path(), &output_path).unwrap();

    assert_eq!(read_model(&output_path), vec![(1, 2, vec![5.0, 6.0]), (2, 2, vec![1.0, 3.0, 2.0, 4.0])]);
}

#[test]
fn test_export_reports_missing_tensor() {
    let temp_dir = TempDir::new().unwrap();
    write_safetensors(&temp_dir.path().join("model.safetensors"), &[("present", vec![1, 1], vec![1.0])]);
    std::fs::write(temp_dir.path().join(MANIFEST), r#"{ "layers": ["present", "absent"] }"#).unwrap();

    let error = LayerFileExporter::new()
        .export_binary_model(temp_dir.path(), &temp_dir.path().join("model.bin"))
        .unwrap_err();

    assert!(format!("{error:#}").contains("absent"));
}

#[test]
fn test_export_fails_without_matrices() {
    let temp_dir = TempDir::new().unwrap();
    let model_path = temp_dir.path().join("model.safetensors");
    write_safetensors(&model_path, &[("norm", vec![3], vec![1.0, 1.0, 1.0])]);

    assert!(LayerFileExporter::new().export_binary_model(&model_path, &temp_dir.path().join("out.bin")).is_err());
}

const MANIFEST: &str = crate::manifest::MANIFEST_FILE;
