//! Vector helpers: little-endian f32 blob codec and L2 normalisation.

use ndarray::{Array1, ArrayView1};

/// Encode a vector as little-endian f32 bytes. Lossless.
pub fn encode_f32(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode little-endian f32 bytes. Returns None if the length is not a multiple of 4.
pub fn decode_f32(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

/// Unit-length copy of `v`. Zero vectors stay zero.
pub fn normalized(v: ArrayView1<'_, f32>) -> Array1<f32> {
    let norm = v.dot(&v).sqrt();
    if norm < 1e-12 || !norm.is_finite() {
        Array1::zeros(v.len())
    } else {
        &v / norm
    }
}
