use uuid::Uuid;

/// Namespace for résumé point ids in the vector store.
const POINT_NAMESPACE: Uuid = Uuid::from_u128(0x5c1e_a0f2_4b7d_4e59_9d3a_61c8_2f0b_7e41);

/// Deterministic point id: re-upserting a résumé overwrites its point.
pub fn point_id(resume_id: Uuid) -> Uuid {
    Uuid::new_v5(&POINT_NAMESPACE, resume_id.as_bytes())
}

pub fn collection_name(job_id: Uuid) -> String {
    format!("job_{}", job_id.simple())
}

/// Component-wise mean of the vectors of length `dimension`; others are
/// skipped. `None` when nothing usable remains.
pub fn average(vectors: &[Vec<f32>], dimension: usize) -> Option<Vec<f32>> {
    let usable: Vec<&Vec<f32>> = vectors.iter().filter(|v| v.len() == dimension).collect();
    if usable.is_empty() || dimension == 0 {
        return None;
    }
    let mut sum = vec![0f64; dimension];
    for vector in &usable {
        for (acc, x) in sum.iter_mut().zip(vector.iter()) {
            *acc += f64::from(*x);
        }
    }
    let n = usable.len() as f64;
    Some(sum.into_iter().map(|s| (s / n) as f32).collect())
}

/// Zeroes NaN and infinite components.
pub fn sanitize(mut vector: Vec<f32>) -> Vec<f32> {
    for x in vector.iter_mut().filter(|x| !x.is_finite()) {
        *x = 0.0;
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_is_stable_and_distinct() {
        let a = Uuid::parse_str("9b2f6a4e-1c3d-4f5a-8b7c-0d1e2f3a4b5c").unwrap();
        let b = Uuid::parse_str("0a1b2c3d-4e5f-4a6b-8c7d-9e0f1a2b3c4d").unwrap();
        assert_eq!(point_id(a), point_id(a));
        assert_ne!(point_id(a), point_id(b));
        assert_eq!(point_id(a).get_version_num(), 5);
    }

    #[test]
    fn test_average_skips_wrong_length() {
        let vectors = vec![vec![1.0, 3.0], vec![3.0, 5.0], vec![100.0, 100.0, 100.0]];
        assert_eq!(average(&vectors, 2), Some(vec![2.0, 4.0]));
        assert_eq!(average(&vectors, 4), None);
        assert_eq!(average(&[], 2), None);
    }

    #[test]
    fn test_sanitize_zeroes_non_finite() {
        let v = sanitize(vec![1.0, f32::NAN, f32::INFINITY, -2.5, f32::NEG_INFINITY]);
        assert_eq!(v, vec![1.0, 0.0, 0.0, -2.5, 0.0]);
    }

    #[test]
    fn test_collection_name_uses_simple_uuid() {
        let job = Uuid::parse_str("9b2f6a4e-1c3d-4f5a-8b7c-0d1e2f3a4b5c").unwrap();
        assert_eq!(collection_name(job), "job_9b2f6a4e1c3d4f5a8b7c0d1e2f3a4b5c");
    }
}
